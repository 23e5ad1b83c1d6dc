//! Pipeline + lifecycle integration over a real scratch directory.

use std::sync::Arc;
use std::time::Duration;

use clipforge_core::artifacts::{DiskArtifactStore, MediaKind};
use clipforge_core::config::ClipforgeConfig;
use clipforge_core::pipeline::{DownloadPipeline, DownloadRequest};
use clipforge_core::tools::test_runners::{ToolBehavior, ToolScriptRunner};
use clipforge_core::{ArtifactStore, LifecycleScheduler, PipelineError};

struct Rig {
    pipeline: DownloadPipeline,
    lifecycle: Arc<LifecycleScheduler>,
    store: Arc<DiskArtifactStore>,
    _dir: tempfile::TempDir,
}

fn rig(runner: ToolScriptRunner, retention: Duration) -> Rig {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(DiskArtifactStore::new(dir.path()).unwrap());
    let lifecycle = Arc::new(LifecycleScheduler::new(store.clone(), retention));
    let pipeline = DownloadPipeline::new(
        Arc::new(runner),
        &ClipforgeConfig::for_testing(),
        store.clone(),
        lifecycle.clone(),
    );
    Rig {
        pipeline,
        lifecycle,
        store,
        _dir: dir,
    }
}

fn audio_request() -> DownloadRequest {
    DownloadRequest {
        source_id: "abc123".to_string(),
        output: MediaKind::Audio,
        quality: "320kbps".to_string(),
    }
}

#[tokio::test]
async fn test_successful_run_is_armed_and_consumable_once() {
    let rig = rig(ToolScriptRunner::succeeding(), Duration::from_secs(300));

    let handle = rig.pipeline.run(&audio_request()).await.unwrap();
    assert_eq!(rig.lifecycle.armed_count(), 1);

    let served = rig.lifecycle.consume(&handle.file_name).unwrap();
    assert_eq!(served.media, MediaKind::Audio);

    // The serving layer deletes after delivery; simulate that here
    rig.store.remove(&served.file_name).await.unwrap();

    assert!(matches!(
        rig.lifecycle.consume(&handle.file_name),
        Err(PipelineError::NotFoundOrExpired { .. })
    ));
}

#[tokio::test]
async fn test_unclaimed_artifact_expires_and_disappears() {
    let rig = rig(ToolScriptRunner::succeeding(), Duration::from_millis(40));

    let handle = rig.pipeline.run(&audio_request()).await.unwrap();
    assert!(rig.store.exists(&handle.file_name).await);

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(rig.lifecycle.armed_count(), 0);
    assert!(!rig.store.exists(&handle.file_name).await);
    assert!(matches!(
        rig.lifecycle.consume(&handle.file_name),
        Err(PipelineError::NotFoundOrExpired { .. })
    ));
}

#[tokio::test]
async fn test_failed_run_arms_nothing_and_leaves_nothing() {
    let rig = rig(
        ToolScriptRunner::succeeding().with_transcode(ToolBehavior::FailExit),
        Duration::from_secs(300),
    );

    let result = rig.pipeline.run(&audio_request()).await;

    assert!(matches!(result, Err(PipelineError::TranscodeFailed { .. })));
    assert_eq!(rig.lifecycle.armed_count(), 0);
    assert!(rig.store.list_by_prefix("abc123").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_same_source_runs_serve_independently() {
    let rig = rig(ToolScriptRunner::succeeding(), Duration::from_secs(300));
    let request = audio_request();

    let (a, b) = tokio::join!(rig.pipeline.run(&request), rig.pipeline.run(&request));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a.file_name, b.file_name);
    assert_eq!(rig.lifecycle.armed_count(), 2);

    // Consuming one leaves the other servable
    rig.lifecycle.consume(&a.file_name).unwrap();
    assert!(rig.lifecycle.consume(&b.file_name).is_ok());
}
