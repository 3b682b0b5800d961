//! Upload pipeline
//!
//! Capture is optimistic: the local asset is recorded and persisted
//! immediately, then the upload runs as a background task with at least
//! one automatic retry on transient failure. Terminal failure rolls the
//! local asset back and the operator recaptures. A step never reports
//! complete while its upload is outstanding or failed; completion is
//! solely a function of the remote URL.
//!
//! Last-capture-wins: every capture rotates the step's capture token, and
//! upload outcomes are applied only if their token is still current.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use vchk_common::events::{EventBus, InspectionEvent};

use crate::models::step::StepKind;
use crate::services::storage_client::{object_path, ObjectStorage};
use crate::workflow::analysis::AnalysisCoordinator;

/// Delay between transient-failure retries
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Background photo upload pipeline
#[derive(Clone)]
pub struct UploadPipeline {
    db: SqlitePool,
    event_bus: EventBus,
    storage: Arc<dyn ObjectStorage>,
    analysis: Arc<AnalysisCoordinator>,
    max_attempts: u32,
}

impl UploadPipeline {
    /// `retries` is the number of automatic retries after the first
    /// attempt, floored at one.
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        storage: Arc<dyn ObjectStorage>,
        analysis: Arc<AnalysisCoordinator>,
        retries: u32,
    ) -> Self {
        Self {
            db,
            event_bus,
            storage,
            analysis,
            max_attempts: retries.max(1) + 1,
        }
    }

    /// Spawn the background upload for a capture that has already been
    /// recorded and persisted optimistically. Returns immediately.
    pub fn spawn_upload(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
        capture_token: Uuid,
        bytes: Vec<u8>,
    ) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline
                .run_upload(session_id, step_kind, capture_token, bytes)
                .await;
        });
    }

    async fn run_upload(&self, session_id: Uuid, step_kind: StepKind, token: Uuid, bytes: Vec<u8>) {
        let path = object_path(session_id, step_kind.as_str(), &bytes);

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match self.storage.put_object(&bytes, &path).await {
                Ok(url) => break Ok(url),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        session_id = %session_id,
                        step = %step_kind,
                        attempt,
                        error = %e,
                        "Transient upload failure, retrying"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => break Err(e),
            }
        };

        match outcome {
            Ok(url) => {
                match self.apply_success(session_id, step_kind, token, &url).await {
                    Ok(true) => {
                        // Upload-completion strictly precedes analysis
                        // dispatch for this step; other steps' pipelines
                        // run in their own tasks, fully in parallel.
                        self.analysis
                            .analyze_step(session_id, step_kind, token, &bytes)
                            .await;
                    }
                    Ok(false) => {
                        tracing::info!(
                            session_id = %session_id,
                            step = %step_kind,
                            "Upload result superseded by a newer capture, discarded"
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            session_id = %session_id,
                            step = %step_kind,
                            error = %e,
                            "Failed to record upload success"
                        );
                    }
                }
            }
            Err(e) => {
                if let Err(apply_err) = self
                    .apply_failure(session_id, step_kind, token, &e.to_string())
                    .await
                {
                    tracing::error!(
                        session_id = %session_id,
                        step = %step_kind,
                        error = %apply_err,
                        "Failed to record upload failure"
                    );
                }
            }
        }
    }

    /// Record a successful upload; returns false when the result was
    /// stale (superseded capture or locked session) and was discarded.
    async fn apply_success(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
        token: Uuid,
        url: &str,
    ) -> vchk_common::Result<bool> {
        let mut session = match crate::db::sessions::load_session(&self.db, session_id).await? {
            Some(session) => session,
            None => return Ok(false),
        };

        if session.is_locked() {
            return Ok(false);
        }

        {
            let step = match session.sequencer.step_mut(step_kind) {
                Some(step) => step,
                None => return Ok(false),
            };
            if !step.token_is_current(token) {
                return Ok(false);
            }
            step.remote_url = Some(url.to_string());
        }
        session.touch();

        crate::db::sessions::save_session(&self.db, &session).await?;

        tracing::info!(
            session_id = %session_id,
            step = %step_kind,
            url = %url,
            "Photo uploaded, step complete"
        );
        self.event_bus.emit_lossy(InspectionEvent::PhotoUploaded {
            session_id,
            step: step_kind.as_str().to_string(),
            remote_url: url.to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(true)
    }

    /// Roll back a terminally failed upload so the operator recaptures
    async fn apply_failure(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
        token: Uuid,
        cause: &str,
    ) -> vchk_common::Result<()> {
        let mut session = match crate::db::sessions::load_session(&self.db, session_id).await? {
            Some(session) => session,
            None => return Ok(()),
        };

        if session.is_locked() {
            return Ok(());
        }

        {
            let step = match session.sequencer.step_mut(step_kind) {
                Some(step) => step,
                None => return Ok(()),
            };
            if !step.token_is_current(token) {
                // A newer capture owns this step now
                return Ok(());
            }
            step.rollback_capture();
        }
        session.touch();

        crate::db::sessions::save_session(&self.db, &session).await?;

        tracing::warn!(
            session_id = %session_id,
            step = %step_kind,
            cause = %cause,
            "Upload failed terminally, local asset rolled back"
        );
        self.event_bus.emit_lossy(InspectionEvent::PhotoUploadFailed {
            session_id,
            step: step_kind.as_str().to_string(),
            cause: cause.to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(())
    }
}
