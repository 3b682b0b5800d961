//! Inspection workflow engine
//!
//! Components, leaves first:
//! - `sequencer`: ordered step catalogue, cursor, navigation rules
//! - `upload`: optimistic photo capture with background upload + rollback
//! - `analysis`: concurrent AI description + damage detection per photo
//! - `signature`: two-phase signature gate (operator, then counterparty)
//! - `lock`: terminal, irreversible lock transition
//!
//! Data flows capture → upload → analysis → step completion → signatures
//! → lock → report trigger. All failure modes are explicit `WorkflowError`
//! values; nothing here fires alerts or owns presentation.

pub mod analysis;
pub mod lock;
pub mod sequencer;
pub mod signature;
pub mod upload;

use thiserror::Error;
use uuid::Uuid;

use crate::models::session::SessionState;
use crate::models::step::StepKind;

/// Workflow failure taxonomy
///
/// `UploadFailed` and `AnalysisUnavailable` are recovered locally (retake
/// prompt / sentinel description) and never abort a session. The rest are
/// rejected operations surfaced to the caller.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Upload failed terminally; the operator must recapture
    #[error("upload failed for step {step}: {cause}")]
    UploadFailed { step: StepKind, cause: String },

    /// Both analysis capabilities unavailable (non-fatal, degrades to sentinel)
    #[error("analysis unavailable for step {step}")]
    AnalysisUnavailable { step: StepKind },

    /// Required steps missing; blocks the signature phase
    #[error("required steps incomplete: {}", missing_list(.missing))]
    StepsIncomplete { missing: Vec<StepKind> },

    /// Signature recorded out of order (counterparty before operator, or duplicate)
    #[error("signature order violation")]
    SignatureOrderViolation,

    /// Any mutation attempted on a locked session
    #[error("session is locked")]
    SessionLocked,

    /// `start` found an existing non-locked session for the subject+kind
    #[error("open session already exists: {existing}")]
    DuplicateOpenSession { existing: Uuid },

    /// Step kind not present in this session's catalogue
    #[error("unknown step: {0}")]
    UnknownStep(String),

    /// Cursor movement violating the navigation rules
    #[error("invalid navigation: {0}")]
    InvalidNavigation(String),

    /// Lifecycle transition that does not move forward
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// Session id not found
    #[error("inspection session not found: {0}")]
    NotFound(Uuid),

    /// Request validation failure
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Shared infrastructure error (database, IO)
    #[error(transparent)]
    Common(#[from] vchk_common::Error),
}

fn missing_list(missing: &[StepKind]) -> String {
    missing
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<sqlx::Error> for WorkflowError {
    fn from(err: sqlx::Error) -> Self {
        WorkflowError::Common(vchk_common::Error::Database(err))
    }
}
