//! Error types for trackmind-analyzer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Fatal pipeline errors
///
/// Only these end a run in `Failed`; every other failure is soft.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input could not be decoded to a mono signal
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// Feature engine could not be initialised
    #[error("Feature engine unavailable: {0}")]
    Engine(String),

    /// Run cancelled by the caller
    #[error("Analysis cancelled")]
    Cancelled,

    /// Blocking analysis task panicked or was aborted
    #[error("Analysis task failed: {0}")]
    Task(String),

    /// Stage sequencing violated
    #[error("Internal pipeline error: {0}")]
    Internal(String),

    /// Staging in-memory input failed
    #[error("Input error: {0}")]
    Input(#[from] trackmind_common::Error),
}

impl From<crate::models::InvalidTransition> for PipelineError {
    fn from(err: crate::models::InvalidTransition) -> Self {
        Self::Internal(err.to_string())
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// trackmind-common error
    #[error("Common error: {0}")]
    Common(#[from] trackmind_common::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Common(trackmind_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
            }
            ApiError::Common(ref err) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR", err.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
