//! HTTP Server & Routing Integration Tests

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use helpers::{generate_clip, orchestrator, ClipConfig};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use trackmind_analyzer::dsp::EngineProvider;
use trackmind_analyzer::{build_router, AppState};

fn test_app() -> Router {
    let state = AppState::new(Arc::new(orchestrator(None, None)), Arc::new(EngineProvider::native()), 64);
    build_router(state)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Data payloads of every SSE event named `name`
fn sse_data(body: &str, name: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter(|block| block.lines().any(|l| l == format!("event: {}", name)))
        .filter_map(|block| {
            let data: Vec<&str> = block
                .lines()
                .filter_map(|l| l.strip_prefix("data: ").or_else(|| l.strip_prefix("data:")))
                .collect();
            serde_json::from_str(&data.join("\n")).ok()
        })
        .collect()
}

/// TC-HTTP-001: health reports status and build identity
#[tokio::test]
async fn tc_http_001_health_check() {
    let response = test_app()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "trackmind-analyzer");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert!(json["uptime_seconds"].is_u64());
    assert!(json["engine_ready"].is_boolean());
}

/// TC-HTTP-002: relative paths are rejected before any run starts
#[tokio::test]
async fn tc_http_002_relative_path_rejected() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"filePath":"music/track.wav"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(json["error"]["code"], "BAD_REQUEST");
}

/// TC-HTTP-003: a file analysis streams progress then one result
#[tokio::test]
async fn tc_http_003_analyze_file_streams_progress_and_result() {
    let dir = TempDir::new().unwrap();
    let path = generate_clip(&dir.path().join("stream.wav"), &ClipConfig::default()).unwrap();
    let request_body = serde_json::json!({
        "filePath": path.to_string_lossy(),
        "fileName": "Stream Test",
    });

    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(request_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap().to_str().unwrap();
    assert!(content_type.contains("text/event-stream"));

    let body = body_text(response).await;
    let progress = sse_data(&body, "progress");
    let results = sse_data(&body, "result");

    assert!(!progress.is_empty());
    assert_eq!(progress[0]["stepName"], "prepare-audio");
    assert!(progress.iter().all(|e| e["type"] == "progress"));

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result["status"], "success");
    assert_eq!(result["fileName"], "Stream Test");
    assert!(result["technical"]["bpm"].is_number());
    assert_eq!(result["finalMessage"], "Audio analysis complete!");
    assert!(body.rfind("event: result").unwrap() > body.rfind("event: progress").unwrap());
}

/// TC-HTTP-004: an empty upload body is a client error
#[tokio::test]
async fn tc_http_004_empty_bytes_rejected() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze/bytes?name=empty.wav")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// TC-HTTP-005: undecodable bytes still produce a result event
#[tokio::test]
async fn tc_http_005_garbage_bytes_stream_failure_result() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/analyze/bytes?name=noise.bin")
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from(helpers::garbage_bytes()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    let results = sse_data(&body, "result");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "failure");
    assert_eq!(results[0]["fileName"], "noise.bin");
    assert!(results[0]["technical"].is_null());
}

/// TC-HTTP-006: unknown routes are 404
#[tokio::test]
async fn tc_http_006_unknown_route() {
    let response = test_app()
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
