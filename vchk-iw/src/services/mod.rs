//! External collaborators and the session orchestrator
//!
//! Collaborator seams are traits with reqwest-based production
//! implementations. Endpoints, API keys, and timeouts are injected at
//! construction from the service config so the workflow stays testable
//! without network access.

pub mod geolocation;
pub mod orchestrator;
pub mod report_client;
pub mod storage_client;
pub mod vision_client;

pub use orchestrator::InspectionOrchestrator;
pub use storage_client::{HttpObjectStorage, ObjectStorage, StorageError};
pub use vision_client::{AnalysisOutcome, DamageDetection, DescriptionCapability, HttpVisionClient};
