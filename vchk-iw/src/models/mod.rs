//! Domain models for the inspection workflow

pub mod session;
pub mod signature;
pub mod step;

pub use session::{ConditionRating, Geolocation, InspectionKind, InspectionSession, SessionState};
pub use signature::{Signature, SignerRole};
pub use step::{DamageVerdict, PhotoStep, Severity, StepKind, ANALYSIS_UNAVAILABLE_SENTINEL};
