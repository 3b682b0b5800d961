//! Report generator notifier
//!
//! Background task subscribed to the event bus. When a session locks,
//! the report generator is notified with the session id and kind.
//! Strictly fire-and-forget from the workflow's perspective: delivery is
//! retried a few times, then given up with a log line. Nothing here ever
//! mutates a session.

use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;
use vchk_common::events::{EventBus, InspectionEvent};

const NOTIFY_ATTEMPTS: u32 = 3;
const NOTIFY_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
struct ReportRequest {
    session_id: Uuid,
    kind: String,
}

/// Spawn the notifier task; returns its handle
///
/// With no report endpoint configured, locked events are logged and
/// dropped.
pub fn spawn(event_bus: &EventBus, base_url: Option<String>) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    let base_url = base_url.map(|u| u.trim_end_matches('/').to_string());
    let http_client = reqwest::Client::new();

    tokio::spawn(async move {
        tracing::info!(configured = base_url.is_some(), "Report notifier started");

        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Report notifier lagged behind event bus");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            let (session_id, kind) = match event {
                InspectionEvent::SessionLocked {
                    session_id, kind, ..
                } => (session_id, kind),
                _ => continue,
            };

            let Some(url) = base_url.as_ref().map(|b| format!("{}/reports", b)) else {
                tracing::debug!(
                    session_id = %session_id,
                    "No report endpoint configured, skipping notification"
                );
                continue;
            };

            notify(&http_client, &url, session_id, kind).await;
        }

        tracing::info!("Report notifier stopped");
    })
}

async fn notify(client: &reqwest::Client, url: &str, session_id: Uuid, kind: String) {
    let request = ReportRequest {
        session_id,
        kind: kind.clone(),
    };

    for attempt in 1..=NOTIFY_ATTEMPTS {
        match client.post(url).json(&request).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    session_id = %session_id,
                    kind = %kind,
                    "Report generation triggered"
                );
                return;
            }
            Ok(response) => {
                tracing::warn!(
                    session_id = %session_id,
                    attempt,
                    status = %response.status(),
                    "Report generator rejected notification"
                );
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    attempt,
                    error = %e,
                    "Report generator unreachable"
                );
            }
        }

        if attempt < NOTIFY_ATTEMPTS {
            tokio::time::sleep(NOTIFY_RETRY_DELAY).await;
        }
    }

    // The session stays locked regardless; the report can be regenerated
    // later from the audit record.
    tracing::error!(
        session_id = %session_id,
        "Report notification failed after {} attempts",
        NOTIFY_ATTEMPTS
    );
}
