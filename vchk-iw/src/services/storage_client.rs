//! Object storage client
//!
//! Uploads captured photos to remote storage. Failures are classified
//! transient (worth an automatic retry) or terminal (the operator must
//! recapture); the upload pipeline keys its retry decision off this
//! classification.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Storage failure classification
#[derive(Debug, Error)]
pub enum StorageError {
    /// Worth retrying automatically (timeouts, 5xx, connection loss)
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Retrying will not help (rejected payload, bad credentials)
    #[error("terminal storage failure: {0}")]
    Terminal(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

/// Remote object storage seam
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `path`, returning the public remote URL.
    ///
    /// Paths are content-addressed by the caller, so repeating the same
    /// logical call is idempotent on the storage side.
    async fn put_object(&self, bytes: &[u8], path: &str) -> Result<String, StorageError>;
}

/// HTTP object storage implementation
pub struct HttpObjectStorage {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpObjectStorage {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, StorageError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Terminal(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put_object(&self, bytes: &[u8], path: &str) -> Result<String, StorageError> {
        let url = format!("{}/{}", self.base_url, path);

        tracing::debug!(url = %url, size = bytes.len(), "Uploading object");

        let response = self
            .http_client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| {
                // Connection failures and timeouts are worth a retry
                if e.is_timeout() || e.is_connect() {
                    StorageError::Transient(e.to_string())
                } else {
                    StorageError::Terminal(e.to_string())
                }
            })?;

        let status = response.status();

        if status.is_success() {
            tracing::info!(url = %url, "Object uploaded");
            return Ok(url);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status.as_u16() == 429 {
            Err(StorageError::Transient(format!("{}: {}", status, body)))
        } else {
            Err(StorageError::Terminal(format!("{}: {}", status, body)))
        }
    }
}

/// Content-addressed storage path for a capture
///
/// Hashing the bytes keeps collaborator retries idempotent: re-putting
/// the same capture lands on the same path.
pub fn object_path(session_id: uuid::Uuid, step: &str, bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(bytes);
    let short = digest
        .iter()
        .take(8)
        .map(|b| format!("{:02x}", b))
        .collect::<String>();
    format!("inspections/{}/{}-{}.jpg", session_id, step, short)
}
