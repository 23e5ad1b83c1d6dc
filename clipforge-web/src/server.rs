//! HTTP server assembly and lifecycle.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use clipforge_core::artifacts::{ArtifactStore, DiskArtifactStore};
use clipforge_core::config::ClipforgeConfig;
use clipforge_core::formats::FormatResolver;
use clipforge_core::pipeline::DownloadPipeline;
use clipforge_core::tools::{Fetcher, ProcessRunner, TokioProcessRunner, Transcoder};
use clipforge_core::LifecycleScheduler;
use tower_http::cors::CorsLayer;

use crate::analytics::{AnalyticsClient, DatastoreConfig};
use crate::handlers::{check_rate_limit, download, fetch_artifact, formats, health, track_download};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<FormatResolver>,
    pub pipeline: Arc<DownloadPipeline>,
    pub lifecycle: Arc<LifecycleScheduler>,
    pub store: Arc<dyn ArtifactStore>,
    pub analytics: Arc<AnalyticsClient>,
}

impl AppState {
    /// Assembles the full component graph over a process runner and store.
    ///
    /// Tests inject a scripted runner and a tempdir or in-memory store here;
    /// production uses [`run_server`].
    pub fn build(
        runner: Arc<dyn ProcessRunner>,
        config: &ClipforgeConfig,
        store: Arc<dyn ArtifactStore>,
        analytics: AnalyticsClient,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleScheduler::new(
            Arc::clone(&store),
            config.storage.retention,
        ));
        let resolver = Arc::new(FormatResolver::new(Fetcher::new(
            Arc::clone(&runner),
            config.tools.clone(),
        )));
        let pipeline = Arc::new(DownloadPipeline::new(
            runner,
            config,
            Arc::clone(&store),
            Arc::clone(&lifecycle),
        ));

        Self {
            resolver,
            pipeline,
            lifecycle,
            store,
            analytics: Arc::new(analytics),
        }
    }
}

/// Builds the API router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/formats/{source_id}", get(formats))
        .route("/api/download", post(download))
        .route("/api/file/{file_name}", get(fetch_artifact))
        .route("/api/track", post(track_download))
        .route("/api/rate-limit/{fingerprint}", get(check_rate_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the server until a shutdown signal arrives.
///
/// Sweeps the scratch directory on the way up (recovering from a prior
/// unclean shutdown) and again, best effort, on the way down.
pub async fn run_server(config: ClipforgeConfig) -> Result<(), Box<dyn std::error::Error>> {
    let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let store: Arc<dyn ArtifactStore> =
        Arc::new(DiskArtifactStore::new(&config.storage.scratch_dir)?);

    let analytics = AnalyticsClient::new(DatastoreConfig::from_env());

    // Startup banner: tool availability is a warning, not a boot failure
    let fetcher = Fetcher::new(Arc::clone(&runner), config.tools.clone());
    let transcoder = Transcoder::new(Arc::clone(&runner), config.tools.clone());
    report_tool(&config.tools.fetch_bin, fetcher.probe().await);
    report_tool(&config.tools.transcode_bin, transcoder.probe().await);
    tracing::info!(
        datastore = if analytics.is_enabled() { "connected" } else { "not configured" },
        scratch_dir = %config.storage.scratch_dir.display(),
        "clipforge backend starting"
    );

    let state = AppState::build(runner, &config, store, analytics);
    state.lifecycle.startup_sweep().await?;

    let lifecycle = Arc::clone(&state.lifecycle);
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    lifecycle.shutdown_sweep().await;
    Ok(())
}

fn report_tool(bin: &str, available: bool) {
    if available {
        tracing::info!(tool = bin, "external tool available");
    } else {
        tracing::warn!(tool = bin, "external tool NOT FOUND, requests needing it will fail");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("could not install shutdown handler: {e}");
        return;
    }
    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clipforge_core::tools::test_runners::ToolScriptRunner;
    use tower::ServiceExt;

    use super::*;

    fn test_router() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(DiskArtifactStore::new(dir.path()).unwrap());
        let state = AppState::build(
            Arc::new(ToolScriptRunner::succeeding()),
            &ClipforgeConfig::for_testing(),
            store,
            AnalyticsClient::disabled(),
        );
        (router(state), dir)
    }

    #[tokio::test]
    async fn test_router_serves_health() {
        let (app, _dir) = test_router();

        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_artifact_name_is_404() {
        let (app, _dir) = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/file/never_armed.mp3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unrouted_path_is_404() {
        let (app, _dir) = test_router();

        let response = app
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
