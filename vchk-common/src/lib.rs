//! Shared types for the VCHK services
//!
//! Provides the common error taxonomy, the inspection event bus used for
//! SSE broadcasting and background consumers, SSE stream helpers, and
//! configuration resolution.

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
