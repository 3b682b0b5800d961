//! Signature gate
//!
//! Two-phase signature capture: the operator signs once every required
//! step is complete, then the counterparty. `Satisfied` is the
//! precondition for locking, not itself a session state.

use serde::Serialize;

use crate::models::session::{InspectionSession, SessionState};
use crate::models::signature::{Signature, SignerRole};
use crate::workflow::WorkflowError;

/// Gate phase, derived from the session's signature slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignaturePhase {
    AwaitingOperator,
    AwaitingCounterparty,
    Satisfied,
}

/// Current gate phase for a session
pub fn phase(session: &InspectionSession) -> SignaturePhase {
    match (
        &session.operator_signature,
        &session.counterparty_signature,
    ) {
        (None, _) => SignaturePhase::AwaitingOperator,
        (Some(_), None) => SignaturePhase::AwaitingCounterparty,
        (Some(_), Some(_)) => SignaturePhase::Satisfied,
    }
}

/// Record a signature, enforcing gate order
///
/// The operator signature requires every required step to be complete and
/// moves the session into `awaiting_signatures`. The counterparty
/// signature is valid only once the operator has signed. Out-of-order or
/// duplicate recording fails with `SignatureOrderViolation`.
pub fn record(
    session: &mut InspectionSession,
    role: SignerRole,
    data: String,
) -> Result<(), WorkflowError> {
    session.ensure_mutable()?;

    match (role, phase(session)) {
        (SignerRole::Operator, SignaturePhase::AwaitingOperator) => {
            let missing = session.sequencer.missing_required();
            if !missing.is_empty() {
                return Err(WorkflowError::StepsIncomplete { missing });
            }
            session.operator_signature = Some(Signature::new(role, data));
            if session.state != SessionState::AwaitingSignatures {
                session.advance_to(SessionState::AwaitingSignatures)?;
            }
            Ok(())
        }
        (SignerRole::Counterparty, SignaturePhase::AwaitingCounterparty) => {
            session.counterparty_signature = Some(Signature::new(role, data));
            session.touch();
            Ok(())
        }
        // Counterparty before operator, or a duplicate of either
        _ => Err(WorkflowError::SignatureOrderViolation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::InspectionKind;
    use crate::models::step::StepKind;
    use uuid::Uuid;

    fn session_with_required_done() -> InspectionSession {
        let mut session =
            InspectionSession::new(Uuid::new_v4(), InspectionKind::Departure, None);
        session.mark_in_progress();
        for kind in [StepKind::Front, StepKind::Back, StepKind::Left, StepKind::Right] {
            let step = session.sequencer.step_mut(kind).unwrap();
            step.begin_capture(format!("spool/{}.jpg", kind));
            step.remote_url = Some(format!("https://storage/{}.jpg", kind));
        }
        session
    }

    #[test]
    fn counterparty_before_operator_is_rejected() {
        let mut session = session_with_required_done();
        let err = record(&mut session, SignerRole::Counterparty, "c2ln".to_string()).unwrap_err();
        assert!(matches!(err, WorkflowError::SignatureOrderViolation));
    }

    #[test]
    fn operator_requires_completed_steps() {
        let mut session =
            InspectionSession::new(Uuid::new_v4(), InspectionKind::Departure, None);
        let err = record(&mut session, SignerRole::Operator, "c2ln".to_string()).unwrap_err();
        assert!(matches!(err, WorkflowError::StepsIncomplete { .. }));
    }

    #[test]
    fn full_gate_sequence_reaches_satisfied() {
        let mut session = session_with_required_done();
        assert_eq!(phase(&session), SignaturePhase::AwaitingOperator);

        record(&mut session, SignerRole::Operator, "b3A=".to_string()).unwrap();
        assert_eq!(phase(&session), SignaturePhase::AwaitingCounterparty);
        assert_eq!(session.state, SessionState::AwaitingSignatures);

        record(&mut session, SignerRole::Counterparty, "Y3A=".to_string()).unwrap();
        assert_eq!(phase(&session), SignaturePhase::Satisfied);
    }

    #[test]
    fn duplicate_operator_signature_is_rejected() {
        let mut session = session_with_required_done();
        record(&mut session, SignerRole::Operator, "b3A=".to_string()).unwrap();
        let err = record(&mut session, SignerRole::Operator, "b3B4".to_string()).unwrap_err();
        assert!(matches!(err, WorkflowError::SignatureOrderViolation));
    }
}
