//! API handlers for format queries, pipeline runs, and analytics proxying.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use clipforge_core::artifacts::MediaKind;
use clipforge_core::formats::FormatCatalog;
use clipforge_core::pipeline::DownloadRequest;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::analytics::{DownloadRecord, RateLimitStatus};
use crate::server::AppState;

/// Body of `POST /api/download`, in wire field names.
#[derive(Debug, Deserialize)]
pub struct DownloadBody {
    #[serde(rename = "videoId")]
    pub video_id: String,
    /// Output container: "mp3" or "mp4"
    pub format: String,
    pub quality: String,
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
}

/// Body of `POST /api/track`, in wire field names.
#[derive(Debug, Deserialize)]
pub struct TrackBody {
    pub fingerprint: String,
    #[serde(rename = "videoId")]
    pub video_id: String,
    #[serde(rename = "videoTitle")]
    pub video_title: Option<String>,
    pub format: String,
    pub quality: String,
}

type ApiError = (StatusCode, Json<Value>);

fn internal_error(detail: String) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": detail })),
    )
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn formats(
    State(state): State<AppState>,
    Path(source_id): Path<String>,
) -> Result<Json<FormatCatalog>, ApiError> {
    match state.resolver.resolve(&source_id).await {
        Ok(catalog) => Ok(Json(catalog)),
        Err(e) => {
            tracing::warn!(source_id, "format query failed: {e}");
            Err(internal_error(e.to_string()))
        }
    }
}

pub async fn download(
    State(state): State<AppState>,
    Json(body): Json<DownloadBody>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let output = match body.format.as_str() {
        "mp3" => MediaKind::Audio,
        "mp4" => MediaKind::Video,
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "detail": format!("unsupported format: {other}") })),
            ));
        }
    };

    let request = DownloadRequest {
        source_id: body.video_id,
        output,
        quality: body.quality,
    };

    match state.pipeline.run(&request).await {
        Ok(handle) => Ok(Json(DownloadResponse {
            success: true,
            download_url: format!("/api/file/{}", handle.file_name),
        })),
        Err(e) => Err(internal_error(e.to_string())),
    }
}

pub async fn track_download(
    State(state): State<AppState>,
    Json(body): Json<TrackBody>,
) -> Json<Value> {
    let record = DownloadRecord {
        fingerprint: body.fingerprint,
        video_id: body.video_id,
        video_title: body.video_title,
        format: body.format,
        quality: body.quality,
    };

    // Fail open: whatever the datastore did, tracking never blocks a client
    use crate::analytics::SoftOutcome;
    match state.analytics.record_download(&record).await {
        SoftOutcome::Value(()) => Json(json!({ "success": true })),
        SoftOutcome::Disabled => Json(json!({ "success": true, "message": "Analytics disabled" })),
        SoftOutcome::Errored => Json(json!({ "success": true, "message": "Analytics unavailable" })),
    }
}

pub async fn check_rate_limit(
    State(state): State<AppState>,
    Path(fingerprint): Path<String>,
) -> Json<RateLimitStatus> {
    Json(state.analytics.rate_limit(&fingerprint).await)
}
