//! Shared test fixtures: in-memory database, scripted collaborators,
//! and orchestrator construction.

#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use vchk_common::events::EventBus;

use vchk_iw::models::step::{DamageVerdict, Severity};
use vchk_iw::services::geolocation::NoGeolocation;
use vchk_iw::services::storage_client::{ObjectStorage, StorageError};
use vchk_iw::services::vision_client::{
    AnalysisOutcome, DamageDetection, DescriptionCapability,
};
use vchk_iw::services::InspectionOrchestrator;
use vchk_iw::AppState;

/// Single-connection in-memory pool so background tasks and the test
/// body see the same database
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    vchk_iw::db::init_tables(&pool).await.unwrap();
    pool
}

/// Scripted outcome for one `put_object` call
pub enum UploadScript {
    Ok,
    Transient,
    Terminal,
}

/// Storage mock replaying a script of outcomes; once the script is
/// exhausted every call succeeds
pub struct ScriptedStorage {
    script: Mutex<VecDeque<UploadScript>>,
    pub calls: AtomicUsize,
}

impl ScriptedStorage {
    pub fn new(script: Vec<UploadScript>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_ok() -> Self {
        Self::new(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStorage for ScriptedStorage {
    async fn put_object(&self, _bytes: &[u8], path: &str) -> Result<String, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().await.pop_front();
        match next {
            Some(UploadScript::Transient) => {
                Err(StorageError::Transient("storage timeout".to_string()))
            }
            Some(UploadScript::Terminal) => {
                Err(StorageError::Terminal("payload rejected".to_string()))
            }
            Some(UploadScript::Ok) | None => Ok(format!("https://storage.test/{}", path)),
        }
    }
}

/// Vision mock behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionMode {
    /// Description and a no-damage verdict
    Normal,
    /// Description and a severe-damage verdict
    SevereDamage,
    /// Both capabilities report offline
    Offline,
    /// Only description succeeds; detection is offline
    DescribeOnly,
}

pub struct ScriptedVision {
    pub mode: std::sync::Mutex<VisionMode>,
}

impl ScriptedVision {
    pub fn new(mode: VisionMode) -> Self {
        Self {
            mode: std::sync::Mutex::new(mode),
        }
    }

    pub fn set_mode(&self, mode: VisionMode) {
        *self.mode.lock().unwrap() = mode;
    }

    fn current(&self) -> VisionMode {
        *self.mode.lock().unwrap()
    }
}

#[async_trait]
impl DescriptionCapability for ScriptedVision {
    async fn describe(
        &self,
        _image: &[u8],
        step_label: &str,
    ) -> vchk_common::Result<AnalysisOutcome<String>> {
        match self.current() {
            VisionMode::Offline => Ok(AnalysisOutcome::Unavailable),
            _ => Ok(AnalysisOutcome::Available(format!(
                "Photo of the {} in good focus",
                step_label
            ))),
        }
    }
}

#[async_trait]
impl DamageDetection for ScriptedVision {
    async fn analyze(
        &self,
        _image: &[u8],
        _step_label: &str,
    ) -> vchk_common::Result<AnalysisOutcome<DamageVerdict>> {
        match self.current() {
            VisionMode::Offline | VisionMode::DescribeOnly => Ok(AnalysisOutcome::Unavailable),
            VisionMode::Normal => Ok(AnalysisOutcome::Available(DamageVerdict {
                has_damage: false,
                severity: None,
                description: "No visible damage".to_string(),
                location: None,
                suggestions: Vec::new(),
            })),
            VisionMode::SevereDamage => Ok(AnalysisOutcome::Available(DamageVerdict {
                has_damage: true,
                severity: Some(Severity::Severe),
                description: "Deep crease across the panel".to_string(),
                location: Some("driver side door".to_string()),
                suggestions: vec!["schedule body shop assessment".to_string()],
            })),
        }
    }
}

/// Everything a test needs to drive the workflow
pub struct TestHarness {
    pub pool: SqlitePool,
    pub event_bus: EventBus,
    pub storage: Arc<ScriptedStorage>,
    pub vision: Arc<ScriptedVision>,
    pub orchestrator: Arc<InspectionOrchestrator>,
    pub spool: tempfile::TempDir,
}

impl TestHarness {
    pub async fn new(storage: ScriptedStorage, vision_mode: VisionMode) -> Self {
        let pool = memory_pool().await;
        let event_bus = EventBus::new(100);
        let storage = Arc::new(storage);
        let vision = Arc::new(ScriptedVision::new(vision_mode));
        let spool = tempfile::tempdir().unwrap();

        let orchestrator = Arc::new(InspectionOrchestrator::new(
            pool.clone(),
            event_bus.clone(),
            storage.clone(),
            vision.clone(),
            vision.clone(),
            Arc::new(NoGeolocation),
            spool.path().to_path_buf(),
            1,
        ));

        Self {
            pool,
            event_bus,
            storage,
            vision,
            orchestrator,
            spool,
        }
    }

    pub async fn default() -> Self {
        Self::new(ScriptedStorage::always_ok(), VisionMode::Normal).await
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            db: self.pool.clone(),
            event_bus: self.event_bus.clone(),
            orchestrator: self.orchestrator.clone(),
            startup_time: chrono::Utc::now(),
            last_error: Arc::new(tokio::sync::RwLock::new(None)),
        }
    }
}

/// Poll until `check` returns true or the timeout elapses
///
/// Background upload/analysis outcomes land asynchronously; tests wait
/// on observable state instead of sleeping fixed amounts.
pub async fn wait_until<F, Fut>(mut check: F, timeout: Duration) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Fixed image payload for captures
pub fn photo_bytes(tag: &str) -> Vec<u8> {
    format!("jpeg-bytes-{}", tag).into_bytes()
}
