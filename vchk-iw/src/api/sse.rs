//! Server-Sent Events for inspection progress streaming
//!
//! Upload and analysis outcomes arrive here rather than as blocking API
//! responses: the capture endpoint returns immediately and the UI
//! follows the per-session stream.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// GET /events - service-level connection status stream
pub async fn event_stream(
    State(_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    vchk_common::sse::create_heartbeat_sse_stream("vchk-iw")
}

/// GET /inspections/{id}/events - per-session event stream
///
/// Streams every `InspectionEvent` for the session: PhotoCaptured,
/// PhotoUploaded, PhotoUploadFailed, AnalysisCompleted,
/// AnalysisUnavailable, DescriptionReviewed, MetadataUpdated,
/// SignatureRecorded, SessionStateChanged, SessionLocked.
pub async fn session_event_stream(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(session_id = %session_id, "New SSE client connected to session events");

    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::select! {
                // Heartbeat every 15 seconds
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                // Broadcast events, filtered to this session
                result = rx.recv() => {
                    match result {
                        Ok(event) if event.session_id() == session_id => {
                            let event_type = event.event_type();
                            match serde_json::to_string(&event) {
                                Ok(event_json) => {
                                    debug!("SSE: Broadcasting event: {}", event_type);
                                    yield Ok(Event::default()
                                        .event(event_type)
                                        .data(event_json));
                                }
                                Err(e) => {
                                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                                }
                            }
                        }
                        Ok(_) => {
                            // Another session's event
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "SSE client lagged, events dropped");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
