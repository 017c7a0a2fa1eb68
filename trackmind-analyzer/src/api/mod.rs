//! HTTP API handlers for trackmind-analyzer
//!
//! REST + SSE surface over the analysis pipeline.

pub mod analyze;
pub mod health;

pub use analyze::analyze_routes;
pub use health::health_routes;
