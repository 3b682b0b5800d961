//! Vision analysis capabilities
//!
//! Two idempotent, side-effect-free analyses run against each uploaded
//! photo: description generation and damage detection. Offline operation
//! is a first-class outcome, not an error: the client maps connection
//! failures, timeouts, 503s, and the capability's own "unavailable"
//! response field to `AnalysisOutcome::Unavailable`, and the coordinator
//! degrades to a sentinel description. No substring matching on
//! generated text is involved anywhere.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::models::step::{DamageVerdict, Severity};

/// Result of invoking an analysis capability
#[derive(Debug, Clone)]
pub enum AnalysisOutcome<T> {
    /// The capability produced a result
    Available(T),
    /// The capability reported itself offline/unreachable (non-fatal)
    Unavailable,
}

/// Description-generation seam
#[async_trait]
pub trait DescriptionCapability: Send + Sync {
    async fn describe(
        &self,
        image: &[u8],
        step_label: &str,
    ) -> vchk_common::Result<AnalysisOutcome<String>>;
}

/// Damage-detection seam
#[async_trait]
pub trait DamageDetection: Send + Sync {
    async fn analyze(
        &self,
        image: &[u8],
        step_label: &str,
    ) -> vchk_common::Result<AnalysisOutcome<DamageVerdict>>;
}

/// Minimum interval between requests to the vision endpoint
const DEFAULT_MIN_INTERVAL_MS: u64 = 250;

/// Rate limiter for the shared vision endpoint
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with the rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// HTTP client for the vision analysis service
pub struct HttpVisionClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

#[derive(Debug, Serialize)]
struct AnalysisRequest<'a> {
    image_base64: String,
    step_label: &'a str,
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    /// Set by the capability when its model backend is offline
    #[serde(default)]
    unavailable: bool,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    unavailable: bool,
    #[serde(default)]
    has_damage: bool,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    suggestions: Vec<String>,
}

impl HttpVisionClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> vchk_common::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| vchk_common::Error::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rate_limiter: Arc::new(RateLimiter::new(DEFAULT_MIN_INTERVAL_MS)),
        })
    }

    /// POST a request, classifying connectivity failures as Unavailable
    async fn post(
        &self,
        endpoint: &str,
        image: &[u8],
        step_label: &str,
    ) -> vchk_common::Result<AnalysisOutcome<reqwest::Response>> {
        use base64::Engine;

        self.rate_limiter.wait().await;

        let url = format!("{}/{}", self.base_url, endpoint);
        let body = AnalysisRequest {
            image_base64: base64::engine::general_purpose::STANDARD.encode(image),
            step_label,
        };

        let mut request = self.http_client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() => {
                tracing::warn!(url = %url, error = %e, "Vision endpoint unreachable");
                return Ok(AnalysisOutcome::Unavailable);
            }
            Err(e) => {
                return Err(vchk_common::Error::Internal(format!(
                    "vision request failed: {}",
                    e
                )))
            }
        };

        let status = response.status();
        if status.as_u16() == 503 {
            tracing::warn!(url = %url, "Vision endpoint reported unavailable (503)");
            return Ok(AnalysisOutcome::Unavailable);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(vchk_common::Error::Internal(format!(
                "vision API error {}: {}",
                status, body
            )));
        }

        Ok(AnalysisOutcome::Available(response))
    }
}

#[async_trait]
impl DescriptionCapability for HttpVisionClient {
    async fn describe(
        &self,
        image: &[u8],
        step_label: &str,
    ) -> vchk_common::Result<AnalysisOutcome<String>> {
        let response = match self.post("describe", image, step_label).await? {
            AnalysisOutcome::Available(r) => r,
            AnalysisOutcome::Unavailable => return Ok(AnalysisOutcome::Unavailable),
        };

        let parsed: DescribeResponse = response
            .json()
            .await
            .map_err(|e| vchk_common::Error::Internal(format!("describe parse error: {}", e)))?;

        if parsed.unavailable {
            return Ok(AnalysisOutcome::Unavailable);
        }

        match parsed.text {
            Some(text) => Ok(AnalysisOutcome::Available(text)),
            None => Err(vchk_common::Error::Internal(
                "describe response missing text".to_string(),
            )),
        }
    }
}

#[async_trait]
impl DamageDetection for HttpVisionClient {
    async fn analyze(
        &self,
        image: &[u8],
        step_label: &str,
    ) -> vchk_common::Result<AnalysisOutcome<DamageVerdict>> {
        let response = match self.post("analyze", image, step_label).await? {
            AnalysisOutcome::Available(r) => r,
            AnalysisOutcome::Unavailable => return Ok(AnalysisOutcome::Unavailable),
        };

        let parsed: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| vchk_common::Error::Internal(format!("analyze parse error: {}", e)))?;

        if parsed.unavailable {
            return Ok(AnalysisOutcome::Unavailable);
        }

        Ok(AnalysisOutcome::Available(DamageVerdict {
            has_damage: parsed.has_damage,
            severity: parsed.severity,
            description: parsed.description.unwrap_or_default(),
            location: parsed.location,
            suggestions: parsed.suggestions,
        }))
    }
}
