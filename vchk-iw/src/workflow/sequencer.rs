//! Step sequencer
//!
//! Holds the fixed, ordered step catalogue for a session and enforces the
//! navigation rules: free review of finished work, no skipping ahead of
//! incomplete required steps. Cursor movement has no side effects; all
//! data mutation happens in the upload/analysis pipelines.

use serde::{Deserialize, Serialize};

use crate::models::step::{PhotoStep, StepKind};
use crate::workflow::WorkflowError;

/// Ordered step catalogue with cursor tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSequencer {
    steps: Vec<PhotoStep>,
    cursor: usize,
    /// Highest index the operator has reached; jump targets beyond it are
    /// only allowed when the target step is already complete
    highest_reached: usize,
}

impl StepSequencer {
    pub fn new(steps: Vec<PhotoStep>) -> Self {
        Self {
            steps,
            cursor: 0,
            highest_reached: 0,
        }
    }

    /// Rebuild from persisted parts (resume path)
    pub fn from_parts(steps: Vec<PhotoStep>, cursor: usize, highest_reached: usize) -> Self {
        let last = steps.len().saturating_sub(1);
        Self {
            steps,
            cursor: cursor.min(last),
            highest_reached: highest_reached.min(last),
        }
    }

    pub fn steps(&self) -> &[PhotoStep] {
        &self.steps
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn highest_reached(&self) -> usize {
        self.highest_reached
    }

    /// The step at the cursor
    pub fn current_step(&self) -> &PhotoStep {
        &self.steps[self.cursor]
    }

    /// Find a step by kind
    pub fn step(&self, kind: StepKind) -> Option<&PhotoStep> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    /// Mutable access to a step by kind
    pub fn step_mut(&mut self, kind: StepKind) -> Option<&mut PhotoStep> {
        self.steps.iter_mut().find(|s| s.kind == kind)
    }

    /// Index of a step by kind
    pub fn index_of(&self, kind: StepKind) -> Option<usize> {
        self.steps.iter().position(|s| s.kind == kind)
    }

    /// Move the cursor forward one position
    ///
    /// No-op at the last step unless required work is still missing, in
    /// which case the missing step kinds are reported so the operator
    /// knows what blocks the signature phase.
    pub fn advance(&mut self) -> Result<usize, WorkflowError> {
        if self.cursor + 1 >= self.steps.len() {
            let missing = self.missing_required();
            if !missing.is_empty() {
                return Err(WorkflowError::StepsIncomplete { missing });
            }
            return Ok(self.cursor);
        }
        self.cursor += 1;
        self.highest_reached = self.highest_reached.max(self.cursor);
        Ok(self.cursor)
    }

    /// Move the cursor back one position; no-op at the first step
    pub fn retreat(&mut self) -> usize {
        self.cursor = self.cursor.saturating_sub(1);
        self.cursor
    }

    /// Jump to a step by index
    ///
    /// Allowed to any index already reached, or to any completed step.
    /// Jumping ahead of incomplete required work is rejected.
    pub fn jump_to(&mut self, index: usize) -> Result<usize, WorkflowError> {
        if index >= self.steps.len() {
            return Err(WorkflowError::InvalidNavigation(format!(
                "step index {} out of range ({} steps)",
                index,
                self.steps.len()
            )));
        }
        if index > self.highest_reached && !self.steps[index].is_complete() {
            return Err(WorkflowError::InvalidNavigation(format!(
                "cannot skip ahead to step {} ({})",
                index, self.steps[index].kind
            )));
        }
        self.cursor = index;
        self.highest_reached = self.highest_reached.max(index);
        Ok(self.cursor)
    }

    /// Position the cursor on the step being captured
    ///
    /// Capturing a step implies the operator has reached it.
    pub fn reach(&mut self, kind: StepKind) -> Result<usize, WorkflowError> {
        let index = self
            .index_of(kind)
            .ok_or_else(|| WorkflowError::UnknownStep(kind.as_str().to_string()))?;
        self.cursor = index;
        self.highest_reached = self.highest_reached.max(index);
        Ok(index)
    }

    /// Required step kinds that are not yet complete
    pub fn missing_required(&self) -> Vec<StepKind> {
        self.steps
            .iter()
            .filter(|s| s.required && !s.is_complete())
            .map(|s| s.kind)
            .collect()
    }

    /// True iff every required step is complete (optional steps may stay empty)
    pub fn is_ready_for_signatures(&self) -> bool {
        self.missing_required().is_empty()
    }
}
