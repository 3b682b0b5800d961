//! Inspection workflow API handlers
//!
//! The single external surface of the workflow engine. Handlers stay
//! thin: decode the request, call the orchestrator, shape the response.
//! Failure modes arrive as typed `WorkflowError` rejections and map to
//! HTTP statuses in `crate::error`.

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::session::{
    ConditionRating, Geolocation, InspectionKind, InspectionSession, MetadataUpdate, SessionState,
};
use crate::models::signature::SignerRole;
use crate::models::step::{DamageVerdict, StepKind};
use crate::services::orchestrator::{NavigateAction, ReviewAction};
use crate::workflow::signature::{self, SignaturePhase};
use crate::workflow::WorkflowError;
use crate::AppState;

/// POST /inspections request
#[derive(Debug, Deserialize)]
pub struct StartInspectionRequest {
    pub subject_id: Uuid,
    pub kind: InspectionKind,
    /// Client-supplied geolocation; the server-side provider is consulted
    /// when absent, and absence of both never blocks the start
    #[serde(default)]
    pub geolocation: Option<Geolocation>,
}

/// POST /inspections/{id}/photos request
#[derive(Debug, Deserialize)]
pub struct CapturePhotoRequest {
    pub step: StepKind,
    /// Base64-encoded image bytes
    pub image_base64: String,
}

/// POST /inspections/{id}/photos response
#[derive(Debug, Serialize)]
pub struct CapturePhotoResponse {
    pub session_id: Uuid,
    pub step: StepKind,
    /// Pending handle for this capture; upload/analysis outcomes carry it
    pub capture_token: Uuid,
}

/// POST /inspections/{id}/signatures request
#[derive(Debug, Deserialize)]
pub struct RecordSignatureRequest {
    pub role: SignerRole,
    /// Base64-encoded signature stroke/image data
    pub data: String,
}

/// POST /inspections/{id}/navigate response
#[derive(Debug, Serialize)]
pub struct NavigateResponse {
    pub cursor: usize,
    pub step: StepKind,
}

/// GET /inspections query parameters
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub subject_id: Option<Uuid>,
}

/// Step view in session responses
#[derive(Debug, Serialize)]
pub struct StepView {
    pub kind: StepKind,
    pub required: bool,
    pub complete: bool,
    pub local_asset: Option<String>,
    pub remote_url: Option<String>,
    pub ai_description: Option<String>,
    pub description_approved: bool,
    pub verdict: Option<DamageVerdict>,
    pub captured_at: Option<DateTime<Utc>>,
}

/// Session view returned by every session-shaped endpoint
///
/// Signature stroke data is deliberately omitted; only timestamps are
/// exposed.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub subject_id: Uuid,
    pub kind: InspectionKind,
    pub state: SessionState,
    pub condition: Option<ConditionRating>,
    pub fuel_level: Option<u8>,
    pub odometer_km: Option<u64>,
    pub notes: Option<String>,
    pub geolocation: Option<Geolocation>,
    pub cursor: usize,
    pub current_step: StepKind,
    pub ready_for_signatures: bool,
    pub signature_phase: SignaturePhase,
    pub steps: Vec<StepView>,
    pub operator_signed_at: Option<DateTime<Utc>>,
    pub counterparty_signed_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&InspectionSession> for SessionView {
    fn from(session: &InspectionSession) -> Self {
        let steps = session
            .sequencer
            .steps()
            .iter()
            .map(|step| StepView {
                kind: step.kind,
                required: step.required,
                complete: step.is_complete(),
                local_asset: step.local_asset.clone(),
                remote_url: step.remote_url.clone(),
                ai_description: step.ai_description.clone(),
                description_approved: step.description_approved,
                verdict: step.verdict.clone(),
                captured_at: step.captured_at,
            })
            .collect();

        SessionView {
            session_id: session.session_id,
            subject_id: session.subject_id,
            kind: session.kind,
            state: session.state,
            condition: session.condition,
            fuel_level: session.fuel_level,
            odometer_km: session.odometer_km,
            notes: session.notes.clone(),
            geolocation: session.geolocation.clone(),
            cursor: session.sequencer.cursor(),
            current_step: session.sequencer.current_step().kind,
            ready_for_signatures: session.sequencer.is_ready_for_signatures(),
            signature_phase: signature::phase(session),
            steps,
            operator_signed_at: session.operator_signature.as_ref().map(|s| s.signed_at),
            counterparty_signed_at: session
                .counterparty_signature
                .as_ref()
                .map(|s| s.signed_at),
            started_at: session.started_at,
            locked_at: session.locked_at,
            updated_at: session.updated_at,
        }
    }
}

/// POST /inspections
///
/// Start an inspection, or reject with 409 DUPLICATE_OPEN_SESSION naming
/// the session to resume.
pub async fn start_inspection(
    State(state): State<AppState>,
    Json(request): Json<StartInspectionRequest>,
) -> ApiResult<Json<SessionView>> {
    let session = state
        .orchestrator
        .start(request.subject_id, request.kind, request.geolocation)
        .await?;
    Ok(Json(SessionView::from(&session)))
}

/// GET /inspections
pub async fn list_inspections(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<SessionView>>> {
    let sessions = state.orchestrator.list(query.subject_id).await?;
    Ok(Json(sessions.iter().map(SessionView::from).collect()))
}

/// GET /inspections/{id}
///
/// Also the resume path: the persisted record is authoritative, so a
/// session locked elsewhere shows as locked here.
pub async fn get_inspection(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = state.orchestrator.get(session_id).await?;
    Ok(Json(SessionView::from(&session)))
}

/// GET /inspections/{id}/steps
pub async fn list_steps(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Vec<StepView>>> {
    let session = state.orchestrator.get(session_id).await?;
    Ok(Json(SessionView::from(&session).steps))
}

/// POST /inspections/{id}/photos
///
/// Returns as soon as the capture is recorded locally; upload and
/// analysis continue in the background and surface via SSE.
pub async fn capture_photo(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CapturePhotoRequest>,
) -> ApiResult<Json<CapturePhotoResponse>> {
    use base64::Engine;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(request.image_base64.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("image_base64 is not valid base64: {}", e)))?;

    let capture_token = state
        .orchestrator
        .capture_photo(session_id, request.step, bytes)
        .await?;

    Ok(Json(CapturePhotoResponse {
        session_id,
        step: request.step,
        capture_token,
    }))
}

/// POST /inspections/{id}/steps/{step}/retake
pub async fn retake_photo(
    State(state): State<AppState>,
    Path((session_id, step)): Path<(Uuid, String)>,
) -> ApiResult<Json<SessionView>> {
    let step = parse_step(&step)?;
    state.orchestrator.retake_photo(session_id, step).await?;
    let session = state.orchestrator.get(session_id).await?;
    Ok(Json(SessionView::from(&session)))
}

/// POST /inspections/{id}/steps/{step}/review
///
/// Body is the tagged review action: accept, edit (with text), discard.
pub async fn review_description(
    State(state): State<AppState>,
    Path((session_id, step)): Path<(Uuid, String)>,
    Json(action): Json<ReviewAction>,
) -> ApiResult<Json<SessionView>> {
    let step = parse_step(&step)?;
    state
        .orchestrator
        .review_description(session_id, step, action)
        .await?;
    let session = state.orchestrator.get(session_id).await?;
    Ok(Json(SessionView::from(&session)))
}

/// PATCH /inspections/{id}/metadata
pub async fn update_metadata(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(update): Json<MetadataUpdate>,
) -> ApiResult<Json<SessionView>> {
    let session = state.orchestrator.update_metadata(session_id, update).await?;
    Ok(Json(SessionView::from(&session)))
}

/// POST /inspections/{id}/navigate
pub async fn navigate(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(action): Json<NavigateAction>,
) -> ApiResult<Json<NavigateResponse>> {
    let cursor = state.orchestrator.navigate(session_id, action).await?;
    let session = state.orchestrator.get(session_id).await?;
    Ok(Json(NavigateResponse {
        cursor,
        step: session.sequencer.current_step().kind,
    }))
}

/// POST /inspections/{id}/signatures
pub async fn record_signature(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RecordSignatureRequest>,
) -> ApiResult<Json<SessionView>> {
    let session = state
        .orchestrator
        .record_signature(session_id, request.role, request.data)
        .await?;
    Ok(Json(SessionView::from(&session)))
}

/// POST /inspections/{id}/lock
pub async fn lock_inspection(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionView>> {
    let session = state.orchestrator.lock(session_id).await?;
    Ok(Json(SessionView::from(&session)))
}

fn parse_step(raw: &str) -> Result<StepKind, ApiError> {
    raw.parse::<StepKind>()
        .map_err(|_| ApiError::Workflow(WorkflowError::UnknownStep(raw.to_string())))
}

/// Build inspection workflow routes
pub fn inspection_routes() -> Router<AppState> {
    Router::new()
        .route("/inspections", post(start_inspection).get(list_inspections))
        .route("/inspections/:id", get(get_inspection))
        .route("/inspections/:id/steps", get(list_steps))
        .route("/inspections/:id/photos", post(capture_photo))
        .route("/inspections/:id/steps/:step/retake", post(retake_photo))
        .route("/inspections/:id/steps/:step/review", post(review_description))
        .route("/inspections/:id/metadata", patch(update_metadata))
        .route("/inspections/:id/navigate", post(navigate))
        .route("/inspections/:id/signatures", post(record_signature))
        .route("/inspections/:id/lock", post(lock_inspection))
}
