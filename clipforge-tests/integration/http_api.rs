//! HTTP surface end to end over scripted external tools.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use clipforge_core::artifacts::{ArtifactStore, DiskArtifactStore};
use clipforge_core::config::ClipforgeConfig;
use clipforge_core::tools::test_runners::{ToolBehavior, ToolScriptRunner};
use clipforge_web::{AnalyticsClient, AppState, router};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestServer {
    app: Router,
    store: Arc<DiskArtifactStore>,
    _dir: tempfile::TempDir,
}

fn server_with(runner: ToolScriptRunner, retention: Duration) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DiskArtifactStore::new(dir.path()).unwrap());

    let mut config = ClipforgeConfig::for_testing();
    config.storage.retention = retention;

    let state = AppState::build(
        Arc::new(runner),
        &config,
        store.clone(),
        AnalyticsClient::disabled(),
    );

    TestServer {
        app: router(state),
        store,
        _dir: dir,
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_answers_ok() {
    let server = server_with(ToolScriptRunner::succeeding(), Duration::from_secs(300));

    let response = server.app.clone().oneshot(get("/api/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_download_then_serve_once_then_gone() {
    let server = server_with(ToolScriptRunner::succeeding(), Duration::from_secs(300));

    let response = server
        .app
        .clone()
        .oneshot(post_json(
            "/api/download",
            json!({ "videoId": "abc123", "format": "mp3", "quality": "320kbps" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], json!(true));
    let url = body["downloadUrl"].as_str().unwrap().to_string();
    assert!(url.starts_with("/api/file/abc123_"));
    assert!(url.ends_with(".mp3"));

    // First fetch succeeds with the audio media type
    let response = server.app.clone().oneshot(get(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/mpeg"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"scripted media bytes");

    // One-shot: the second fetch is a 404 and the file is gone
    let response = server.app.clone().oneshot(get(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    tokio::time::sleep(Duration::from_millis(50)).await; // post-serve delete is async
    assert!(server.store.list_by_prefix("abc123").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_video_download_serves_mp4() {
    let server = server_with(ToolScriptRunner::succeeding(), Duration::from_secs(300));

    let response = server
        .app
        .clone()
        .oneshot(post_json(
            "/api/download",
            json!({ "videoId": "abc123", "format": "mp4", "quality": "720p" }),
        ))
        .await
        .unwrap();
    let body = json_body(response).await;
    let url = body["downloadUrl"].as_str().unwrap().to_string();
    assert!(url.ends_with(".mp4"));

    let response = server.app.clone().oneshot(get(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "video/mp4"
    );
}

#[tokio::test]
async fn test_unknown_quality_still_succeeds() {
    let server = server_with(ToolScriptRunner::succeeding(), Duration::from_secs(300));

    let response = server
        .app
        .clone()
        .oneshot(post_json(
            "/api/download",
            json!({ "videoId": "abc123", "format": "mp3", "quality": "9999kbps" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], json!(true));
}

#[tokio::test]
async fn test_unsupported_format_is_rejected() {
    let server = server_with(ToolScriptRunner::succeeding(), Duration::from_secs(300));

    let response = server
        .app
        .clone()
        .oneshot(post_json(
            "/api/download",
            json!({ "videoId": "abc123", "format": "wav", "quality": "320kbps" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_fetch_failure_maps_to_500_and_cleans_up() {
    let server = server_with(
        ToolScriptRunner::succeeding().with_fetch(ToolBehavior::FailExit),
        Duration::from_secs(300),
    );

    let response = server
        .app
        .clone()
        .oneshot(post_json(
            "/api/download",
            json!({ "videoId": "abc123", "format": "mp3", "quality": "320kbps" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["detail"].as_str().unwrap().contains("Fetch failed"));
    assert!(server.store.list_by_prefix("abc123").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_artifact_serves_404() {
    let server = server_with(ToolScriptRunner::succeeding(), Duration::from_millis(40));

    let response = server
        .app
        .clone()
        .oneshot(post_json(
            "/api/download",
            json!({ "videoId": "abc123", "format": "mp3", "quality": "192kbps" }),
        ))
        .await
        .unwrap();
    let url = json_body(response).await["downloadUrl"]
        .as_str()
        .unwrap()
        .to_string();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let response = server.app.clone().oneshot(get(&url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(server.store.list_by_prefix("abc123").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_formats_endpoint_returns_catalog() {
    let metadata = r#"{
        "title": "Test Clip",
        "duration": 120,
        "thumbnail": "https://example.com/t.jpg",
        "formats": [
            {"vcodec": "avc1", "acodec": "none", "height": 720},
            {"vcodec": "none", "acodec": "opus", "abr": 128.0}
        ]
    }"#;
    let server = server_with(
        ToolScriptRunner::succeeding().with_metadata_json(metadata),
        Duration::from_secs(300),
    );

    let response = server
        .app
        .clone()
        .oneshot(get("/api/formats/abc123"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["title"], json!("Test Clip"));
    assert_eq!(body["video"], json!(["720p"]));
    assert_eq!(body["audio"], json!(["128kbps"]));
}

#[tokio::test]
async fn test_formats_endpoint_maps_upstream_failure_to_500() {
    // Default metadata script exits non-zero
    let server = server_with(ToolScriptRunner::succeeding(), Duration::from_secs(300));

    let response = server
        .app
        .clone()
        .oneshot(get("/api/formats/abc123"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_analytics_endpoints_fail_open_without_datastore() {
    let server = server_with(ToolScriptRunner::succeeding(), Duration::from_secs(300));

    let response = server
        .app
        .clone()
        .oneshot(post_json(
            "/api/track",
            json!({
                "fingerprint": "fp-1",
                "videoId": "abc123",
                "format": "mp3",
                "quality": "320kbps"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], json!(true));

    let response = server
        .app
        .clone()
        .oneshot(get("/api/rate-limit/fp-1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["remaining"], json!(5));
    assert!(body["resetAt"].is_null());
}
