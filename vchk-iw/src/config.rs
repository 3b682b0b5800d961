//! Configuration resolution for vchk-iw
//!
//! TOML file (`vchk.toml` in the root folder) with environment variable
//! overrides. Collaborator endpoints, API keys, and timeouts all resolve
//! here and are injected into the clients at construction; nothing in
//! the workflow core reads the environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use vchk_common::{Error, Result};

pub const DEFAULT_PORT: u16 = 5741;

/// Object storage collaborator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9400/storage".to_string(),
            timeout_seconds: 30,
        }
    }
}

/// Vision analysis collaborator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9410/vision".to_string(),
            api_key: None,
            timeout_seconds: 45,
        }
    }
}

/// Report generator collaborator settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Unset disables report notifications
    pub base_url: Option<String>,
}

/// Geolocation collaborator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Unset disables server-side geolocation lookup
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_seconds: 5,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub port: u16,
    /// Database file name, relative to the root folder
    pub database_file: String,
    /// Capture spool directory, relative to the root folder
    pub spool_dir: String,
    /// Automatic retries after the first upload attempt (floor 1)
    pub upload_retries: u32,
    pub storage: StorageConfig,
    pub vision: VisionConfig,
    pub report: ReportConfig,
    pub geolocation: GeolocationConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_file: "vchk.db".to_string(),
            spool_dir: "spool".to_string(),
            upload_retries: 1,
            storage: StorageConfig::default(),
            vision: VisionConfig::default(),
            report: ReportConfig::default(),
            geolocation: GeolocationConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `<root>/vchk.toml`, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(root_folder: &Path) -> Result<Self> {
        let config_path = root_folder.join("vchk.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let parsed: ServiceConfig = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse {:?}: {}", config_path, e)))?;
            info!("Configuration loaded from {:?}", config_path);
            parsed
        } else {
            info!("No config file at {:?}, using defaults", config_path);
            ServiceConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables override the file for deployment tweaks
    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("VCHK_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!("Ignoring invalid VCHK_PORT: {}", port),
            }
        }
        if let Ok(url) = std::env::var("VCHK_STORAGE_URL") {
            self.storage.base_url = url;
        }
        if let Ok(url) = std::env::var("VCHK_VISION_URL") {
            self.vision.base_url = url;
        }
        if let Ok(key) = std::env::var("VCHK_VISION_API_KEY") {
            self.vision.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("VCHK_REPORT_URL") {
            self.report.base_url = Some(url);
        }
        if let Ok(url) = std::env::var("VCHK_GEOLOCATION_URL") {
            self.geolocation.base_url = Some(url);
        }
    }

    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.database_file)
    }

    pub fn spool_path(&self, root_folder: &Path) -> PathBuf {
        root_folder.join(&self.spool_dir)
    }
}
