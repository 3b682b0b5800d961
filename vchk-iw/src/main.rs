//! vchk-iw - Inspection Workflow Microservice
//!
//! Governs the vehicle condition inspection workflow: step-sequenced
//! photo capture with background upload and AI analysis, operator and
//! counterparty signatures, and the terminal lock that triggers report
//! generation. Integrates with its UI via HTTP REST + SSE.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vchk_common::events::EventBus;

use vchk_iw::config::ServiceConfig;
use vchk_iw::services::geolocation::{GeolocationProvider, HttpGeolocationProvider, NoGeolocation};
use vchk_iw::services::vision_client::{DamageDetection, DescriptionCapability};
use vchk_iw::services::{report_client, HttpObjectStorage, HttpVisionClient, InspectionOrchestrator, ObjectStorage};
use vchk_iw::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting vchk-iw (Inspection Workflow) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve root folder and ensure it exists
    let root_folder = vchk_common::config::resolve_root_folder(None, "VCHK_ROOT_FOLDER")
        .map_err(|e| anyhow::anyhow!("Failed to resolve root folder: {}", e))?;
    vchk_common::config::ensure_root_folder(&root_folder)
        .map_err(|e| anyhow::anyhow!("Failed to initialize root folder: {}", e))?;
    info!("Root folder: {}", root_folder.display());

    // Load service configuration
    let config = ServiceConfig::load(&root_folder)
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Open or create database
    let db_path = config.database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let db_pool = vchk_iw::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    // Roll back uploads interrupted by the previous run
    let recovered = vchk_iw::db::steps::recover_interrupted_uploads(&db_pool).await?;
    if recovered > 0 {
        info!(
            recovered,
            "Cleared interrupted upload markers from previous run"
        );
    }

    // Event bus for SSE broadcasting and the report notifier
    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    // Collaborator clients, configured explicitly
    let storage: Arc<dyn ObjectStorage> = Arc::new(
        HttpObjectStorage::new(
            config.storage.base_url.clone(),
            Duration::from_secs(config.storage.timeout_seconds),
        )
        .map_err(|e| anyhow::anyhow!("Failed to create storage client: {}", e))?,
    );
    let vision = Arc::new(
        HttpVisionClient::new(
            config.vision.base_url.clone(),
            config.vision.api_key.clone(),
            Duration::from_secs(config.vision.timeout_seconds),
        )
        .map_err(|e| anyhow::anyhow!("Failed to create vision client: {}", e))?,
    );
    let describer: Arc<dyn DescriptionCapability> = vision.clone();
    let detector: Arc<dyn DamageDetection> = vision;
    let geolocator: Arc<dyn GeolocationProvider> = match &config.geolocation.base_url {
        Some(base_url) => match HttpGeolocationProvider::new(
            base_url.clone(),
            Duration::from_secs(config.geolocation.timeout_seconds),
        ) {
            Some(provider) => Arc::new(provider),
            None => Arc::new(NoGeolocation),
        },
        None => Arc::new(NoGeolocation),
    };

    // Report notifier consumes SessionLocked events in the background
    report_client::spawn(&event_bus, config.report.base_url.clone());

    let orchestrator = InspectionOrchestrator::new(
        db_pool.clone(),
        event_bus.clone(),
        storage,
        describer,
        detector,
        geolocator,
        config.spool_path(&root_folder),
        config.upload_retries,
    );

    // Create application state and serve
    let state = AppState::new(db_pool, event_bus, orchestrator);
    let app = vchk_iw::build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!("Listening on http://127.0.0.1:{}", config.port);
    info!("Health check: http://127.0.0.1:{}/health", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
