//! HTTP API handlers for vchk-iw

pub mod health;
pub mod inspection;
pub mod sse;

pub use health::health_routes;
pub use inspection::inspection_routes;
pub use sse::{event_stream, session_event_stream};
