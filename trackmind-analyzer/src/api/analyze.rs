//! Analysis endpoints
//!
//! Each request owns one pipeline run. The response is an SSE stream of
//! `progress` events followed by a single `result` event carrying the
//! serialized `AnalysisResult`. Dropping the connection cancels the run.

use crate::error::{ApiError, ApiResult};
use crate::models::AudioSource;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use trackmind_common::ProgressEmitter;

/// Largest accepted raw upload
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// POST /analyze request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    /// Absolute path on the server's filesystem
    pub file_path: String,
    pub file_name: Option<String>,
}

/// POST /analyze/bytes query
#[derive(Debug, Deserialize)]
pub struct BytesQuery {
    pub name: Option<String>,
}

enum Input {
    File(AudioSource),
    Bytes(Bytes, Option<String>),
}

/// POST /analyze
pub async fn analyze_file(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let source = AudioSource::new(request.file_path, request.file_name)?;
    info!(path = %source.path().display(), "Analysis requested");
    Ok(analysis_stream(state, Input::File(source)))
}

/// POST /analyze/bytes?name=...
pub async fn analyze_bytes(
    State(state): State<AppState>,
    Query(query): Query<BytesQuery>,
    body: Bytes,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("request body is empty".to_string()));
    }
    info!(size = body.len(), name = ?query.name, "Analysis of uploaded bytes requested");
    Ok(analysis_stream(state, Input::Bytes(body, query.name)))
}

fn analysis_stream(state: AppState, input: Input) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let emitter = ProgressEmitter::new(state.progress_capacity);
    let mut rx = emitter.subscribe();
    let cancel = state.shutdown.child_token();
    let guard = cancel.clone().drop_guard();
    let orchestrator = Arc::clone(&state.orchestrator);

    // The emitter lives inside the task; the receiver closes when it ends
    let task = tokio::spawn(async move {
        match input {
            Input::File(source) => orchestrator.run(source, &emitter, &cancel).await,
            Input::Bytes(bytes, name) => orchestrator.run_bytes(&bytes, name, &emitter, &cancel).await,
        }
    });

    let stream = async_stream::stream! {
        // Client disconnect drops this stream, and the guard cancels the run
        let guard = guard;

        while let Some(event) = rx.recv().await {
            if event.is_terminal() {
                continue;
            }
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok(Event::default().event("progress").data(json)),
                Err(e) => warn!(error = %e, "Failed to serialize progress event"),
            }
        }

        match task.await {
            Ok(result) => match serde_json::to_string(&result) {
                Ok(json) => {
                    debug!(run_id = %result.run_id, status = ?result.status, "Sending result");
                    yield Ok(Event::default().event("result").data(json));
                }
                Err(e) => warn!(error = %e, "Failed to serialize analysis result"),
            },
            Err(e) => warn!(error = %e, "Analysis task ended abnormally"),
        }

        guard.disarm();
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

/// Build analysis routes
pub fn analyze_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze", post(analyze_file))
        .route(
            "/analyze/bytes",
            post(analyze_bytes).layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
}
