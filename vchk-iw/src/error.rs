//! Error types for vchk-iw
//!
//! Workflow failures map to typed HTTP rejections; recovery guidance
//! (retake prompts, sentinel descriptions) lives in the event stream,
//! not here.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::workflow::WorkflowError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Workflow rule rejection (status depends on the rule)
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// vchk-common error
    #[error("Common error: {0}")]
    Common(#[from] vchk_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, detail) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Workflow(err) => return workflow_response(err),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None)
            }
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
                None,
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
                None,
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
                None,
            ),
        };

        error_body(status, error_code, &message, detail)
    }
}

/// Map workflow rejections to HTTP statuses and machine-readable codes
fn workflow_response(err: WorkflowError) -> Response {
    match err {
        WorkflowError::SessionLocked => error_body(
            StatusCode::CONFLICT,
            "SESSION_LOCKED",
            "session is already validated and can no longer be modified",
            None,
        ),
        WorkflowError::DuplicateOpenSession { existing } => error_body(
            StatusCode::CONFLICT,
            "DUPLICATE_OPEN_SESSION",
            "an open session already exists for this subject and kind",
            Some(json!({ "existing_session_id": existing })),
        ),
        WorkflowError::StepsIncomplete { ref missing } => {
            let names: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
            error_body(
                StatusCode::UNPROCESSABLE_ENTITY,
                "STEPS_INCOMPLETE",
                &err.to_string(),
                Some(json!({ "missing_steps": names })),
            )
        }
        WorkflowError::SignatureOrderViolation => error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            "SIGNATURE_ORDER_VIOLATION",
            "signatures must be recorded operator first, then counterparty",
            None,
        ),
        WorkflowError::InvalidNavigation(msg) => error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_NAVIGATION",
            &msg,
            None,
        ),
        WorkflowError::InvalidTransition { .. } => error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_TRANSITION",
            &err.to_string(),
            None,
        ),
        WorkflowError::UnknownStep(ref step) => error_body(
            StatusCode::NOT_FOUND,
            "UNKNOWN_STEP",
            &format!("unknown step: {}", step),
            None,
        ),
        WorkflowError::NotFound(id) => error_body(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("inspection session not found: {}", id),
            None,
        ),
        WorkflowError::InvalidInput(msg) => {
            error_body(StatusCode::BAD_REQUEST, "BAD_REQUEST", &msg, None)
        }
        WorkflowError::UploadFailed { .. } | WorkflowError::AnalysisUnavailable { .. } => {
            // Recovered locally by the pipelines; reaching the API layer
            // means something is wired wrong
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                &err.to_string(),
                None,
            )
        }
        WorkflowError::Common(ref inner) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "COMMON_ERROR",
            &inner.to_string(),
            None,
        ),
    }
}

fn error_body(
    status: StatusCode,
    error_code: &str,
    message: &str,
    detail: Option<serde_json::Value>,
) -> Response {
    let mut error = json!({
        "code": error_code,
        "message": message,
    });
    if let Some(detail) = detail {
        if let (Some(map), Some(extra)) = (error.as_object_mut(), detail.as_object()) {
            for (k, v) in extra {
                map.insert(k.clone(), v.clone());
            }
        }
    }

    let body = Json(json!({ "error": error }));
    (status, body).into_response()
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
