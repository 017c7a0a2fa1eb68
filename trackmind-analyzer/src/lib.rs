//! trackmind-analyzer library interface
//!
//! Audio analysis pipeline: native feature extraction, chord tracking,
//! optional creative commentary, progress streaming. Exposed as a library
//! for the binary and for integration testing.

pub mod api;
pub mod config;
pub mod dsp;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, PipelineError};

use axum::Router;
use chrono::{DateTime, Utc};
use dsp::EngineProvider;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use workflow::PipelineOrchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    /// Shared feature engine, also reported by `/health`
    pub engines: Arc<EngineProvider>,
    /// Per-run progress ring size
    pub progress_capacity: usize,
    /// Parent of every run's cancellation token
    pub shutdown: CancellationToken,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, engines: Arc<EngineProvider>, progress_capacity: usize) -> Self {
        Self {
            orchestrator,
            engines,
            progress_capacity,
            shutdown: CancellationToken::new(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::analyze_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
