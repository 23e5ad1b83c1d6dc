//! One-shot artifact serving.
//!
//! `GET /api/file/{name}` claims the artifact from the lifecycle scheduler
//! (which aborts the expiry timer), streams the bytes, and deletes the file
//! once delivery finishes or the client goes away. A second request for the
//! same name always sees 404.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use clipforge_core::artifacts::ArtifactStore;
use clipforge_core::artifacts::store::ArtifactReader;

use crate::server::AppState;

const CHUNK_SIZE: usize = 64 * 1024;

/// Deletes the claimed file when the response body is done with it.
///
/// Dropped on full delivery, on a mid-stream read error, and when the client
/// disconnects, so a claimed artifact never outlives its one serve. Deletion
/// is idempotent, so racing the (already aborted) expiry timer is harmless.
struct DeleteOnDrop {
    store: Arc<dyn ArtifactStore>,
    file_name: String,
}

impl Drop for DeleteOnDrop {
    fn drop(&mut self) {
        let store = Arc::clone(&self.store);
        let file_name = std::mem::take(&mut self.file_name);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = store.remove(&file_name).await {
                    tracing::warn!(artifact = %file_name, "post-serve delete failed: {e}");
                } else {
                    tracing::debug!(artifact = %file_name, "artifact deleted after serve");
                }
            });
        }
    }
}

struct BodyState {
    reader: ArtifactReader,
    guard: Option<DeleteOnDrop>,
    failed: bool,
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({ "detail": "File not found or expired" })),
    )
        .into_response()
}

pub async fn fetch_artifact(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> Response {
    // Artifact names never contain path structure
    if file_name.contains('/') || file_name.contains("..") {
        return not_found();
    }

    let served = match state.lifecycle.consume(&file_name) {
        Ok(served) => served,
        Err(e) => {
            tracing::debug!(artifact = %file_name, "serve refused: {e}");
            return not_found();
        }
    };

    // From here on the file is ours to delete, whatever happens
    let guard = DeleteOnDrop {
        store: Arc::clone(&state.store),
        file_name: served.file_name.clone(),
    };

    let size = state.store.size(&served.file_name).await.ok();
    let reader = match state.store.open(&served.file_name).await {
        Ok(reader) => reader,
        Err(e) => {
            tracing::warn!(artifact = %file_name, "claimed artifact unreadable: {e}");
            drop(guard);
            return not_found();
        }
    };

    let body_state = BodyState {
        reader,
        guard: Some(guard),
        failed: false,
    };

    let stream = futures::stream::unfold(body_state, |mut state| async move {
        if state.failed {
            return None;
        }

        let mut buf = vec![0u8; CHUNK_SIZE];
        match tokio::io::AsyncReadExt::read(&mut state.reader, &mut buf).await {
            Ok(0) => {
                // Fully delivered; the guard deletes the file now
                state.guard.take();
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), state))
            }
            Err(e) => {
                state.guard.take();
                state.failed = true;
                Some((Err(e), state))
            }
        }
    });

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, served.media.mime_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", served.file_name),
        );
    if let Some(size) = size {
        response = response.header(header::CONTENT_LENGTH, size.to_string());
    }

    response
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
