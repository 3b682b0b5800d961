//! Inspection session aggregate
//!
//! A session progresses through four forward-only states:
//! draft → in_progress → awaiting_signatures → locked
//!
//! No state is ever revisited. Once locked, the record is immutable and
//! retained permanently as an audit record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::signature::Signature;
use crate::workflow::sequencer::StepSequencer;
use crate::workflow::WorkflowError;

/// Inspection kind for one subject (vehicle/mission)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionKind {
    Departure,
    Arrival,
}

impl InspectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionKind::Departure => "departure",
            InspectionKind::Arrival => "arrival",
        }
    }
}

impl std::fmt::Display for InspectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, no photo captured yet
    Draft,
    /// Capture sequence underway
    InProgress,
    /// All required steps complete, collecting signatures
    AwaitingSignatures,
    /// Terminal: immutable audit record
    Locked,
}

impl SessionState {
    /// Position in the forward-only lifecycle
    fn ordinal(&self) -> u8 {
        match self {
            SessionState::Draft => 0,
            SessionState::InProgress => 1,
            SessionState::AwaitingSignatures => 2,
            SessionState::Locked => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Draft => "draft",
            SessionState::InProgress => "in_progress",
            SessionState::AwaitingSignatures => "awaiting_signatures",
            SessionState::Locked => "locked",
        }
    }
}

/// Overall vehicle condition recorded by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionRating {
    Poor,
    Fair,
    Good,
    Excellent,
}

/// Geolocation captured at session start; absence never blocks `start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub address: Option<String>,
}

/// State transition record, emitted alongside SessionStateChanged events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// Partial metadata update (condition / fuel / odometer / notes)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataUpdate {
    pub condition: Option<ConditionRating>,
    pub fuel_level: Option<u8>,
    pub odometer_km: Option<u64>,
    pub notes: Option<String>,
}

/// Inspection session (aggregate root)
///
/// Exclusively owns its photo steps (via the sequencer) and signatures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectionSession {
    pub session_id: Uuid,

    /// The vehicle/mission being inspected
    pub subject_id: Uuid,

    pub kind: InspectionKind,

    pub state: SessionState,

    pub condition: Option<ConditionRating>,

    /// Fuel level 0-100
    pub fuel_level: Option<u8>,

    /// Odometer reading, kilometers
    pub odometer_km: Option<u64>,

    pub notes: Option<String>,

    pub geolocation: Option<Geolocation>,

    /// Ordered capture steps plus cursor position
    pub sequencer: StepSequencer,

    pub operator_signature: Option<Signature>,

    pub counterparty_signature: Option<Signature>,

    pub started_at: DateTime<Utc>,

    pub locked_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl InspectionSession {
    /// Create a new draft session with the step catalogue for `kind`
    pub fn new(subject_id: Uuid, kind: InspectionKind, geolocation: Option<Geolocation>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            subject_id,
            kind,
            state: SessionState::Draft,
            condition: None,
            fuel_level: None,
            odometer_km: None,
            notes: None,
            geolocation,
            sequencer: StepSequencer::new(crate::models::step::catalogue_for(kind)),
            operator_signature: None,
            counterparty_signature: None,
            started_at: now,
            locked_at: None,
            updated_at: now,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state == SessionState::Locked
    }

    /// Every mutating operation checks this first
    pub fn ensure_mutable(&self) -> Result<(), WorkflowError> {
        if self.is_locked() {
            Err(WorkflowError::SessionLocked)
        } else {
            Ok(())
        }
    }

    /// Forward-only state transition
    ///
    /// Rejects any move that does not strictly advance the lifecycle.
    pub fn advance_to(&mut self, new_state: SessionState) -> Result<StateTransition, WorkflowError> {
        if new_state.ordinal() <= self.state.ordinal() {
            return Err(WorkflowError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;
        self.updated_at = transition.transitioned_at;

        if new_state == SessionState::Locked {
            self.locked_at = Some(transition.transitioned_at);
        }

        Ok(transition)
    }

    /// Move a draft session into progress; no-op once underway
    pub fn mark_in_progress(&mut self) -> Option<StateTransition> {
        if self.state == SessionState::Draft {
            self.advance_to(SessionState::InProgress).ok()
        } else {
            None
        }
    }

    /// Apply a partial metadata update
    pub fn update_metadata(&mut self, update: MetadataUpdate) -> Result<(), WorkflowError> {
        self.ensure_mutable()?;

        if let Some(fuel) = update.fuel_level {
            if fuel > 100 {
                return Err(WorkflowError::InvalidInput(format!(
                    "fuel level must be 0-100, got {}",
                    fuel
                )));
            }
            self.fuel_level = Some(fuel);
        }
        if let Some(condition) = update.condition {
            self.condition = Some(condition);
        }
        if let Some(odometer) = update.odometer_km {
            self.odometer_km = Some(odometer);
        }
        if let Some(notes) = update.notes {
            self.notes = Some(notes);
        }
        self.touch();
        Ok(())
    }

    /// Bump the updated timestamp after any mutation
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
