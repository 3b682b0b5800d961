//! Geolocation provider
//!
//! Supplies latitude/longitude/address at session start. Strictly
//! best-effort: any failure yields `None` and never blocks `start`.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::models::session::Geolocation;

/// Geolocation seam
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn locate(&self) -> Option<Geolocation>;
}

/// Used when no geolocation endpoint is configured
pub struct NoGeolocation;

#[async_trait]
impl GeolocationProvider for NoGeolocation {
    async fn locate(&self) -> Option<Geolocation> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct LocateResponse {
    latitude: f64,
    longitude: f64,
    address: Option<String>,
}

/// HTTP geolocation provider
pub struct HttpGeolocationProvider {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpGeolocationProvider {
    pub fn new(base_url: String, timeout: Duration) -> Option<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build().ok()?;
        Some(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeolocationProvider for HttpGeolocationProvider {
    async fn locate(&self) -> Option<Geolocation> {
        let url = format!("{}/locate", self.base_url);

        let response = match self.http_client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(url = %url, status = %r.status(), "Geolocation lookup failed");
                return None;
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Geolocation lookup failed");
                return None;
            }
        };

        let parsed: LocateResponse = response.json().await.ok()?;
        Some(Geolocation {
            latitude: parsed.latitude,
            longitude: parsed.longitude,
            address: parsed.address,
        })
    }
}
