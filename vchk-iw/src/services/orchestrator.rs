//! Inspection orchestrator
//!
//! The aggregate-root service behind the HTTP API. Owns the database
//! pool, the event bus, and the collaborator seams; every operation
//! loads the persisted session (the source of truth), applies the
//! workflow rules, persists, and emits events. Mutations against a
//! locked session are rejected before anything else happens.

use serde::Deserialize;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;
use vchk_common::events::{EventBus, InspectionEvent};

use crate::models::session::{
    Geolocation, InspectionKind, InspectionSession, MetadataUpdate, SessionState,
};
use crate::models::signature::SignerRole;
use crate::models::step::StepKind;
use crate::services::geolocation::GeolocationProvider;
use crate::services::storage_client::ObjectStorage;
use crate::services::vision_client::{DamageDetection, DescriptionCapability};
use crate::workflow::analysis::AnalysisCoordinator;
use crate::workflow::upload::UploadPipeline;
use crate::workflow::{lock, signature, WorkflowError};

/// Operator review of an AI description
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReviewAction {
    /// Accept the AI description as-is
    Accept,
    /// Edit the text before accepting
    Edit { text: String },
    /// Discard the description entirely
    Discard,
}

/// Cursor movement request
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavigateAction {
    Advance,
    Retreat,
    Jump { index: usize },
}

/// Aggregate-root service for inspection sessions
pub struct InspectionOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    upload: UploadPipeline,
    geolocator: Arc<dyn GeolocationProvider>,
    spool_dir: PathBuf,
}

impl InspectionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        storage: Arc<dyn ObjectStorage>,
        describer: Arc<dyn DescriptionCapability>,
        detector: Arc<dyn DamageDetection>,
        geolocator: Arc<dyn GeolocationProvider>,
        spool_dir: PathBuf,
        upload_retries: u32,
    ) -> Self {
        let analysis = Arc::new(AnalysisCoordinator::new(
            db.clone(),
            event_bus.clone(),
            describer,
            detector,
        ));
        let upload = UploadPipeline::new(
            db.clone(),
            event_bus.clone(),
            storage,
            analysis,
            upload_retries,
        );
        Self {
            db,
            event_bus,
            upload,
            geolocator,
            spool_dir,
        }
    }

    /// Start an inspection for a subject+kind pair
    ///
    /// At most one non-locked session may exist per pair; a duplicate
    /// `start` reports the open session's id so the caller resumes it.
    /// Geolocation is best-effort and never blocks.
    pub async fn start(
        &self,
        subject_id: Uuid,
        kind: InspectionKind,
        geolocation: Option<Geolocation>,
    ) -> Result<InspectionSession, WorkflowError> {
        if let Some(open) = crate::db::sessions::find_open_session(&self.db, subject_id, kind).await?
        {
            return Err(WorkflowError::DuplicateOpenSession {
                existing: open.session_id,
            });
        }

        let geolocation = match geolocation {
            Some(geo) => Some(geo),
            None => self.geolocator.locate().await,
        };

        let session = InspectionSession::new(subject_id, kind, geolocation);
        crate::db::sessions::save_session(&self.db, &session).await?;

        tracing::info!(
            session_id = %session.session_id,
            subject_id = %subject_id,
            kind = %kind,
            "Inspection session started"
        );
        self.event_bus.emit_lossy(InspectionEvent::SessionStarted {
            session_id: session.session_id,
            subject_id,
            kind: kind.as_str().to_string(),
            timestamp: session.started_at,
        });

        Ok(session)
    }

    /// Load a session (resume path included)
    pub async fn get(&self, session_id: Uuid) -> Result<InspectionSession, WorkflowError> {
        crate::db::sessions::load_session(&self.db, session_id)
            .await?
            .ok_or(WorkflowError::NotFound(session_id))
    }

    /// List sessions, optionally by subject, newest first
    pub async fn list(
        &self,
        subject_id: Option<Uuid>,
    ) -> Result<Vec<InspectionSession>, WorkflowError> {
        Ok(crate::db::sessions::list_sessions(&self.db, subject_id).await?)
    }

    /// Capture a photo for a step
    ///
    /// The local asset is spooled and persisted immediately (optimistic
    /// display); the upload continues in the background and its outcome
    /// arrives as `PhotoUploaded` / `PhotoUploadFailed` events. Returns
    /// the capture token identifying this capture.
    pub async fn capture_photo(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
        bytes: Vec<u8>,
    ) -> Result<Uuid, WorkflowError> {
        if bytes.is_empty() {
            return Err(WorkflowError::InvalidInput("empty photo payload".to_string()));
        }

        let mut session = self.get(session_id).await?;
        session.ensure_mutable()?;

        session.sequencer.reach(step_kind)?;

        let local_asset = self.spool_capture(session_id, step_kind, &bytes).await?;
        let token = match session.sequencer.step_mut(step_kind) {
            Some(step) => step.begin_capture(local_asset),
            None => return Err(WorkflowError::UnknownStep(step_kind.as_str().to_string())),
        };

        let transition = session.mark_in_progress();
        crate::db::sessions::save_session(&self.db, &session).await?;

        if let Some(transition) = transition {
            self.emit_state_change(&transition.session_id, transition.old_state, transition.new_state);
        }
        self.event_bus.emit_lossy(InspectionEvent::PhotoCaptured {
            session_id,
            step: step_kind.as_str().to_string(),
            capture_token: token,
            timestamp: chrono::Utc::now(),
        });

        self.upload.spawn_upload(session_id, step_kind, token, bytes);

        Ok(token)
    }

    /// Retake a step: discard the current capture and its artifacts
    ///
    /// Returns the step to incomplete; any in-flight upload or analysis
    /// for the prior capture is superseded and its late results ignored.
    pub async fn retake_photo(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
    ) -> Result<(), WorkflowError> {
        let mut session = self.get(session_id).await?;
        session.ensure_mutable()?;

        let step = session
            .sequencer
            .step_mut(step_kind)
            .ok_or_else(|| WorkflowError::UnknownStep(step_kind.as_str().to_string()))?;
        step.reset();
        session.touch();

        crate::db::sessions::save_session(&self.db, &session).await?;

        tracing::info!(session_id = %session_id, step = %step_kind, "Step reset for retake");
        Ok(())
    }

    /// Review the AI description for a step
    pub async fn review_description(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
        action: ReviewAction,
    ) -> Result<(), WorkflowError> {
        let mut session = self.get(session_id).await?;
        session.ensure_mutable()?;

        let approved;
        {
            let step = session
                .sequencer
                .step_mut(step_kind)
                .ok_or_else(|| WorkflowError::UnknownStep(step_kind.as_str().to_string()))?;

            match action {
                ReviewAction::Accept => {
                    if step.ai_description.is_none() {
                        return Err(WorkflowError::InvalidInput(
                            "no description to accept".to_string(),
                        ));
                    }
                    step.description_approved = true;
                }
                ReviewAction::Edit { text } => {
                    if text.trim().is_empty() {
                        return Err(WorkflowError::InvalidInput(
                            "edited description is empty".to_string(),
                        ));
                    }
                    step.ai_description = Some(text);
                    step.description_approved = true;
                }
                ReviewAction::Discard => {
                    step.ai_description = None;
                    step.description_approved = false;
                }
            }
            approved = step.description_approved;
        }
        session.touch();

        crate::db::sessions::save_session(&self.db, &session).await?;

        self.event_bus.emit_lossy(InspectionEvent::DescriptionReviewed {
            session_id,
            step: step_kind.as_str().to_string(),
            approved,
            timestamp: chrono::Utc::now(),
        });

        Ok(())
    }

    /// Update condition / fuel / odometer / notes
    pub async fn update_metadata(
        &self,
        session_id: Uuid,
        update: MetadataUpdate,
    ) -> Result<InspectionSession, WorkflowError> {
        let mut session = self.get(session_id).await?;
        session.update_metadata(update)?;

        crate::db::sessions::save_session(&self.db, &session).await?;

        self.event_bus.emit_lossy(InspectionEvent::MetadataUpdated {
            session_id,
            timestamp: chrono::Utc::now(),
        });

        Ok(session)
    }

    /// Move the step cursor
    pub async fn navigate(
        &self,
        session_id: Uuid,
        action: NavigateAction,
    ) -> Result<usize, WorkflowError> {
        let mut session = self.get(session_id).await?;
        // Covers the "retreat disallowed once locked" rule along with
        // every other cursor movement
        session.ensure_mutable()?;

        let cursor = match action {
            NavigateAction::Advance => session.sequencer.advance()?,
            NavigateAction::Retreat => session.sequencer.retreat(),
            NavigateAction::Jump { index } => session.sequencer.jump_to(index)?,
        };
        session.touch();

        crate::db::sessions::save_session(&self.db, &session).await?;
        Ok(cursor)
    }

    /// Record a signature (operator first, then counterparty)
    pub async fn record_signature(
        &self,
        session_id: Uuid,
        role: SignerRole,
        data: String,
    ) -> Result<InspectionSession, WorkflowError> {
        use base64::Engine;
        if base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .is_err()
        {
            return Err(WorkflowError::InvalidInput(
                "signature data is not valid base64".to_string(),
            ));
        }

        let mut session = self.get(session_id).await?;
        let state_before = session.state;

        signature::record(&mut session, role, data)?;

        crate::db::sessions::save_session(&self.db, &session).await?;

        if session.state != state_before {
            self.emit_state_change(&session.session_id, state_before, session.state);
        }
        self.event_bus.emit_lossy(InspectionEvent::SignatureRecorded {
            session_id,
            role: role.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(session)
    }

    /// Lock the session (terminal, irreversible)
    pub async fn lock(&self, session_id: Uuid) -> Result<InspectionSession, WorkflowError> {
        let mut session = self.get(session_id).await?;
        lock::lock_session(&self.db, &self.event_bus, &mut session).await?;
        Ok(session)
    }

    /// Write the captured bytes to the local spool, returning the asset path
    async fn spool_capture(
        &self,
        session_id: Uuid,
        step_kind: StepKind,
        bytes: &[u8],
    ) -> Result<String, WorkflowError> {
        use sha2::{Digest, Sha256};

        let digest = Sha256::digest(bytes);
        let short = digest
            .iter()
            .take(8)
            .map(|b| format!("{:02x}", b))
            .collect::<String>();

        let dir = self.spool_dir.join(session_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WorkflowError::Common(vchk_common::Error::Io(e)))?;

        let path = dir.join(format!("{}-{}.jpg", step_kind, short));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| WorkflowError::Common(vchk_common::Error::Io(e)))?;

        Ok(path.to_string_lossy().to_string())
    }

    fn emit_state_change(&self, session_id: &Uuid, old: SessionState, new: SessionState) {
        self.event_bus.emit_lossy(InspectionEvent::SessionStateChanged {
            session_id: *session_id,
            old_state: old.as_str().to_string(),
            new_state: new.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}
