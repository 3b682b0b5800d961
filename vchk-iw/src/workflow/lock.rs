//! Lock manager
//!
//! The lock is the terminal, irreversible transition. The durability
//! write happens first; only once it succeeds does the in-memory state
//! change and the `SessionLocked` event fire, so a half-locked state is
//! never observable. Report generation consumes the event downstream and
//! is never awaited here; its failure cannot un-lock the session.

use sqlx::SqlitePool;
use vchk_common::events::{EventBus, InspectionEvent};

use crate::models::session::{InspectionSession, SessionState, StateTransition};
use crate::workflow::signature::{self, SignaturePhase};
use crate::workflow::WorkflowError;

/// Lock a session whose signature gate is satisfied
///
/// Permitted exactly once. A repeat call fails with `SessionLocked` and
/// produces no state change and no duplicate event. If the persistence
/// write fails, the session stays in `awaiting_signatures` and the error
/// is surfaced for retry.
pub async fn lock_session(
    db: &SqlitePool,
    event_bus: &EventBus,
    session: &mut InspectionSession,
) -> Result<StateTransition, WorkflowError> {
    if session.is_locked() {
        return Err(WorkflowError::SessionLocked);
    }

    match signature::phase(session) {
        SignaturePhase::Satisfied => {}
        SignaturePhase::AwaitingOperator => {
            let missing = session.sequencer.missing_required();
            if !missing.is_empty() {
                return Err(WorkflowError::StepsIncomplete { missing });
            }
            return Err(WorkflowError::SignatureOrderViolation);
        }
        SignaturePhase::AwaitingCounterparty => {
            return Err(WorkflowError::SignatureOrderViolation);
        }
    }

    // Durable write first. The in-memory transition happens only after
    // the database confirms the lock.
    let locked_at = chrono::Utc::now();
    let transitioned = crate::db::sessions::set_locked(db, session.session_id, locked_at)
        .await
        .map_err(WorkflowError::Common)?;

    if !transitioned {
        // The stored record was already locked (e.g. resumed stale state)
        return Err(WorkflowError::SessionLocked);
    }

    let transition = StateTransition {
        session_id: session.session_id,
        old_state: session.state,
        new_state: SessionState::Locked,
        transitioned_at: locked_at,
    };
    session.state = SessionState::Locked;
    session.locked_at = Some(locked_at);
    session.updated_at = locked_at;

    tracing::info!(
        session_id = %session.session_id,
        kind = %session.kind,
        "Inspection session locked"
    );

    event_bus.emit_lossy(InspectionEvent::SessionStateChanged {
        session_id: session.session_id,
        old_state: transition.old_state.as_str().to_string(),
        new_state: transition.new_state.as_str().to_string(),
        timestamp: locked_at,
    });
    event_bus.emit_lossy(InspectionEvent::SessionLocked {
        session_id: session.session_id,
        kind: session.kind.as_str().to_string(),
        timestamp: locked_at,
    });

    Ok(transition)
}
