//! Analysis coordinator
//!
//! Runs once a step's upload has succeeded. Description generation and
//! damage detection are dispatched concurrently against the same capture;
//! either side may degrade independently. Total unavailability stores the
//! sentinel description and the step stays complete. Results carrying a
//! stale capture token are discarded.

use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;
use vchk_common::events::{EventBus, InspectionEvent};

use crate::models::step::{DamageVerdict, StepKind, ANALYSIS_UNAVAILABLE_SENTINEL};
use crate::services::vision_client::{AnalysisOutcome, DamageDetection, DescriptionCapability};

/// Concurrent AI analysis dispatch for uploaded photos
pub struct AnalysisCoordinator {
    db: SqlitePool,
    event_bus: EventBus,
    describer: Arc<dyn DescriptionCapability>,
    detector: Arc<dyn DamageDetection>,
}

impl AnalysisCoordinator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        describer: Arc<dyn DescriptionCapability>,
        detector: Arc<dyn DamageDetection>,
    ) -> Self {
        Self {
            db,
            event_bus,
            describer,
            detector,
        }
    }

    /// Analyze one uploaded capture and store whatever the capabilities
    /// produced. Never fails the step: capability errors degrade to the
    /// unavailable path.
    pub async fn analyze_step(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
        capture_token: Uuid,
        image: &[u8],
    ) {
        let label = step_kind.label();

        let (description_result, verdict_result) = tokio::join!(
            self.describer.describe(image, label),
            self.detector.analyze(image, label)
        );

        let description = match description_result {
            Ok(AnalysisOutcome::Available(text)) => Some(text),
            Ok(AnalysisOutcome::Unavailable) => None,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    step = %step_kind,
                    error = %e,
                    "Description capability failed"
                );
                None
            }
        };

        let verdict = match verdict_result {
            Ok(AnalysisOutcome::Available(verdict)) => Some(verdict),
            Ok(AnalysisOutcome::Unavailable) => None,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    step = %step_kind,
                    error = %e,
                    "Damage detection failed"
                );
                None
            }
        };

        if let Err(e) = self
            .apply(session_id, step_kind, capture_token, description, verdict)
            .await
        {
            tracing::error!(
                session_id = %session_id,
                step = %step_kind,
                error = %e,
                "Failed to record analysis results"
            );
        }
    }

    async fn apply(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
        token: Uuid,
        description: Option<String>,
        verdict: Option<DamageVerdict>,
    ) -> vchk_common::Result<()> {
        let mut session = match crate::db::sessions::load_session(&self.db, session_id).await? {
            Some(session) => session,
            None => return Ok(()),
        };

        if session.is_locked() {
            return Ok(());
        }

        let total_failure = description.is_none() && verdict.is_none();
        let has_description = description.is_some();
        let has_verdict = verdict.is_some();
        let damage_detected = verdict.as_ref().map(|v| v.has_damage).unwrap_or(false);

        {
            let step = match session.sequencer.step_mut(step_kind) {
                Some(step) => step,
                None => return Ok(()),
            };
            if !step.token_is_current(token) {
                tracing::info!(
                    session_id = %session_id,
                    step = %step_kind,
                    "Analysis result for a superseded capture, discarded"
                );
                return Ok(());
            }

            if total_failure {
                step.ai_description = Some(ANALYSIS_UNAVAILABLE_SENTINEL.to_string());
            } else {
                step.ai_description = description;
                step.verdict = verdict;
            }
            // Fresh results always start unapproved
            step.description_approved = false;
        }
        session.touch();

        crate::db::sessions::save_session(&self.db, &session).await?;

        let timestamp = chrono::Utc::now();
        if total_failure {
            tracing::warn!(
                session_id = %session_id,
                step = %step_kind,
                "Analysis unavailable, sentinel description stored"
            );
            self.event_bus.emit_lossy(InspectionEvent::AnalysisUnavailable {
                session_id,
                step: step_kind.as_str().to_string(),
                timestamp,
            });
        } else {
            tracing::info!(
                session_id = %session_id,
                step = %step_kind,
                has_description,
                has_verdict,
                damage_detected,
                "Analysis results stored"
            );
            self.event_bus.emit_lossy(InspectionEvent::AnalysisCompleted {
                session_id,
                step: step_kind.as_str().to_string(),
                has_description,
                has_verdict,
                damage_detected,
                timestamp,
            });
        }

        Ok(())
    }
}
