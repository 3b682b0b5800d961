//! Event types for the VCHK event system
//!
//! Provides the shared `InspectionEvent` enum and the `EventBus` used by
//! the inspection workflow service. Events are broadcast via the bus and
//! can be serialized for SSE transmission; background consumers (report
//! notifier) subscribe to the same bus.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// VCHK inspection events
///
/// All workflow progress is announced through this central enum for type
/// safety and exhaustive matching. Step kinds are carried as their wire
/// names (e.g. "front", "odometer_panel") so the event layer stays
/// decoupled from the service crate's model types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InspectionEvent {
    /// A new inspection session was created
    SessionStarted {
        session_id: Uuid,
        subject_id: Uuid,
        /// "departure" or "arrival"
        kind: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session state moved forward (draft → in_progress → awaiting_signatures → locked)
    SessionStateChanged {
        session_id: Uuid,
        old_state: String,
        new_state: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A photo was captured locally and queued for upload
    PhotoCaptured {
        session_id: Uuid,
        step: String,
        capture_token: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Upload finished; the step is now complete
    PhotoUploaded {
        session_id: Uuid,
        step: String,
        remote_url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Upload failed terminally; the local asset was rolled back
    PhotoUploadFailed {
        session_id: Uuid,
        step: String,
        cause: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// AI analysis finished for a step (either capability may have degraded)
    AnalysisCompleted {
        session_id: Uuid,
        step: String,
        has_description: bool,
        has_verdict: bool,
        damage_detected: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Both analysis capabilities were unavailable; sentinel description stored
    AnalysisUnavailable {
        session_id: Uuid,
        step: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Operator reviewed an AI description (accepted, edited, or discarded)
    DescriptionReviewed {
        session_id: Uuid,
        step: String,
        approved: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Condition / fuel / odometer / notes were updated
    MetadataUpdated {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A signature was recorded
    SignatureRecorded {
        session_id: Uuid,
        /// "operator" or "counterparty"
        role: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The session was locked; consumed by the report generator
    SessionLocked {
        session_id: Uuid,
        /// "departure" or "arrival"
        kind: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl InspectionEvent {
    /// Event type name used as the SSE event field
    pub fn event_type(&self) -> &'static str {
        match self {
            InspectionEvent::SessionStarted { .. } => "SessionStarted",
            InspectionEvent::SessionStateChanged { .. } => "SessionStateChanged",
            InspectionEvent::PhotoCaptured { .. } => "PhotoCaptured",
            InspectionEvent::PhotoUploaded { .. } => "PhotoUploaded",
            InspectionEvent::PhotoUploadFailed { .. } => "PhotoUploadFailed",
            InspectionEvent::AnalysisCompleted { .. } => "AnalysisCompleted",
            InspectionEvent::AnalysisUnavailable { .. } => "AnalysisUnavailable",
            InspectionEvent::DescriptionReviewed { .. } => "DescriptionReviewed",
            InspectionEvent::MetadataUpdated { .. } => "MetadataUpdated",
            InspectionEvent::SignatureRecorded { .. } => "SignatureRecorded",
            InspectionEvent::SessionLocked { .. } => "SessionLocked",
        }
    }

    /// Session this event belongs to, for per-session SSE filtering
    pub fn session_id(&self) -> Uuid {
        match self {
            InspectionEvent::SessionStarted { session_id, .. }
            | InspectionEvent::SessionStateChanged { session_id, .. }
            | InspectionEvent::PhotoCaptured { session_id, .. }
            | InspectionEvent::PhotoUploaded { session_id, .. }
            | InspectionEvent::PhotoUploadFailed { session_id, .. }
            | InspectionEvent::AnalysisCompleted { session_id, .. }
            | InspectionEvent::AnalysisUnavailable { session_id, .. }
            | InspectionEvent::DescriptionReviewed { session_id, .. }
            | InspectionEvent::MetadataUpdated { session_id, .. }
            | InspectionEvent::SignatureRecorded { session_id, .. }
            | InspectionEvent::SessionLocked { session_id, .. } => *session_id,
        }
    }
}

/// Event bus for broadcasting inspection events
///
/// Wraps a tokio broadcast channel. Slow subscribers may miss events once
/// the channel buffer wraps; SSE clients recover by re-reading session
/// state, so lossy delivery is acceptable here.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InspectionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<InspectionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if none are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: InspectionEvent,
    ) -> Result<usize, broadcast::error::SendError<InspectionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Workflow progress events are emitted unconditionally; a session
    /// with no connected SSE client simply drops them.
    pub fn emit_lossy(&self, event: InspectionEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_reaches_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let session_id = Uuid::new_v4();
        bus.emit_lossy(InspectionEvent::MetadataUpdated {
            session_id,
            timestamp: chrono::Utc::now(),
        });

        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.session_id(), session_id);
    }

    #[test]
    fn emit_without_subscribers_is_err() {
        let bus = EventBus::new(16);
        let result = bus.emit(InspectionEvent::MetadataUpdated {
            session_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = InspectionEvent::SessionLocked {
            session_id: Uuid::new_v4(),
            kind: "departure".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "SessionLocked");
        assert_eq!(json["kind"], "departure");
    }
}
