//! Download pipeline: fetch, optional transcode, artifact registration.
//!
//! One pipeline run per inbound request. External tool invocations are the
//! suspension points; concurrent runs share no mutable state beyond the
//! scratch directory, and collisions are avoided structurally by unique run
//! ids rather than locking. On any failure the run's partial files are
//! removed before the error propagates; there are no automatic retries.

use std::sync::Arc;

use rand::Rng;
use rand::distr::Alphanumeric;

use crate::artifacts::{ArtifactHandle, ArtifactStore, MediaKind};
use crate::config::ClipforgeConfig;
use crate::tools::{Fetcher, ProcessRunner, Transcoder};
use crate::{LifecycleScheduler, PipelineError, Result};

/// Length of the random run id suffix.
const RUN_SUFFIX_LEN: usize = 8;

/// Container extension of the intermediate audio fetch.
const INTERMEDIATE_EXT: &str = "m4a";

/// One client request for a media asset. Immutable, created per call, never
/// persisted.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Opaque external identifier for the requested media
    pub source_id: String,
    pub output: MediaKind,
    /// Quality label from the resolver's vocabulary; unknown labels fall back
    /// to best-available defaults instead of failing
    pub quality: String,
}

/// Drives a request through fetch, optional transcode, and registration.
pub struct DownloadPipeline {
    fetcher: Fetcher,
    transcoder: Transcoder,
    store: Arc<dyn ArtifactStore>,
    lifecycle: Arc<LifecycleScheduler>,
}

impl DownloadPipeline {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        config: &ClipforgeConfig,
        store: Arc<dyn ArtifactStore>,
        lifecycle: Arc<LifecycleScheduler>,
    ) -> Self {
        Self {
            fetcher: Fetcher::new(Arc::clone(&runner), config.tools.clone()),
            transcoder: Transcoder::new(runner, config.tools.clone()),
            store,
            lifecycle,
        }
    }

    /// Runs the pipeline to a terminal state.
    ///
    /// On success the artifact is armed with its retention timer and the
    /// returned handle is servable exactly once. On failure every file under
    /// this run's id has already been removed.
    ///
    /// # Errors
    ///
    /// - `PipelineError::FetchFailed` - Fetch tool failed or timed out
    /// - `PipelineError::TranscodeFailed` - Transcode tool failed or timed out
    /// - `PipelineError::OutputMissing` - Tool reported success but wrote nothing
    pub async fn run(&self, request: &DownloadRequest) -> Result<ArtifactHandle> {
        let run_id = generate_run_id(&request.source_id);
        tracing::info!(
            source_id = %request.source_id,
            run_id = %run_id,
            output = ?request.output,
            quality = %request.quality,
            "pipeline run starting"
        );

        match self.execute(&run_id, request).await {
            Ok(handle) => {
                self.lifecycle.arm(&handle);
                tracing::info!(run_id = %run_id, artifact = %handle.file_name, "pipeline run complete");
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, "pipeline run failed: {e}");
                self.discard_run(&run_id).await;
                Err(e)
            }
        }
    }

    async fn execute(&self, run_id: &str, request: &DownloadRequest) -> Result<ArtifactHandle> {
        let file_name = format!("{run_id}.{}", request.output.extension());

        match request.output {
            MediaKind::Audio => {
                let intermediate = format!("{run_id}.{INTERMEDIATE_EXT}");
                self.fetcher
                    .fetch_audio(
                        &request.source_id,
                        &request.quality,
                        &self.store.locate(&intermediate),
                    )
                    .await?;
                self.transcoder
                    .to_mp3(
                        &self.store.locate(&intermediate),
                        &self.store.locate(&file_name),
                        &request.quality,
                    )
                    .await?;
                // The intermediate container is never servable; drop it as
                // soon as the transcode has landed.
                self.store.remove(&intermediate).await?;
            }
            MediaKind::Video => {
                self.fetcher
                    .fetch_video(
                        &request.source_id,
                        &request.quality,
                        &self.store.locate(&file_name),
                    )
                    .await?;
            }
        }

        // A tool can report success without producing output; that is a
        // distinct failure from a tool-reported error.
        if !self.store.exists(&file_name).await {
            return Err(PipelineError::OutputMissing {
                path: self.store.locate(&file_name).to_string_lossy().into_owned(),
            });
        }

        Ok(ArtifactHandle {
            id: run_id.to_string(),
            path: self.store.locate(&file_name),
            file_name,
            media: request.output,
        })
    }

    /// Removes every file this run may have partially written, whatever
    /// extension it got to. Best-effort: cleanup failures are logged, not
    /// propagated over the original pipeline error.
    async fn discard_run(&self, run_id: &str) {
        let names = match self.store.list_by_prefix(run_id).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(run_id, "could not enumerate failed run files: {e}");
                return;
            }
        };

        for name in names {
            if let Err(e) = self.store.remove(&name).await {
                tracing::warn!(run_id, file = %name, "could not remove failed run file: {e}");
            }
        }
    }
}

/// Fresh artifact id for one run: source id plus a random suffix.
///
/// Ids are never reused across runs, even for the same source, so concurrent
/// requests never collide on a path.
fn generate_run_id(source_id: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(RUN_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{source_id}_{}", suffix.to_lowercase())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::artifacts::DiskArtifactStore;
    use crate::tools::test_runners::{ToolBehavior, ToolScriptRunner};

    struct Harness {
        pipeline: DownloadPipeline,
        store: Arc<DiskArtifactStore>,
        runner: Arc<ToolScriptRunner>,
        _dir: tempfile::TempDir,
    }

    fn harness(runner: ToolScriptRunner) -> Harness {
        let dir = tempdir().unwrap();
        let store = Arc::new(DiskArtifactStore::new(dir.path()).unwrap());
        let lifecycle = Arc::new(LifecycleScheduler::new(
            store.clone(),
            Duration::from_secs(300),
        ));
        let runner = Arc::new(runner);
        let pipeline = DownloadPipeline::new(
            runner.clone(),
            &ClipforgeConfig::default(),
            store.clone(),
            lifecycle,
        );
        Harness {
            pipeline,
            store,
            runner,
            _dir: dir,
        }
    }

    fn audio_request(quality: &str) -> DownloadRequest {
        DownloadRequest {
            source_id: "abc123".to_string(),
            output: MediaKind::Audio,
            quality: quality.to_string(),
        }
    }

    #[tokio::test]
    async fn test_audio_run_leaves_only_the_final_mp3() {
        let h = harness(ToolScriptRunner::succeeding());

        let handle = h.pipeline.run(&audio_request("320kbps")).await.unwrap();

        assert_eq!(handle.media, MediaKind::Audio);
        assert!(handle.file_name.ends_with(".mp3"));
        assert!(handle.id.starts_with("abc123_"));

        // Exactly the compressed file remains; the intermediate is gone
        let mut remaining = h.store.list_by_prefix("abc123").await.unwrap();
        remaining.sort();
        assert_eq!(remaining, vec![handle.file_name.clone()]);
    }

    #[tokio::test]
    async fn test_audio_run_sequences_fetch_then_transcode() {
        let h = harness(ToolScriptRunner::succeeding());

        h.pipeline.run(&audio_request("320kbps")).await.unwrap();

        let invocations = h.runner.invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].0, "yt-dlp");
        assert_eq!(invocations[1].0, "ffmpeg");

        // Fetch selects the audio ladder entry
        let fetch_args = &invocations[0].1;
        let selector_pos = fetch_args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(fetch_args[selector_pos + 1], "bestaudio[abr>=256]/bestaudio/best");
        assert!(fetch_args[0].ends_with("watch?v=abc123"));

        // Transcode gets the fixed preset parameters
        let transcode_args = &invocations[1].1;
        let bitrate_pos = transcode_args.iter().position(|a| a == "-ab").unwrap();
        assert_eq!(transcode_args[bitrate_pos + 1], "320k");
        assert!(transcode_args.contains(&"44100".to_string()));
        assert!(transcode_args.contains(&"2".to_string()));
        assert!(transcode_args.contains(&"libmp3lame".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_quality_falls_back_and_still_succeeds() {
        let h = harness(ToolScriptRunner::succeeding());

        let handle = h.pipeline.run(&audio_request("9999kbps")).await.unwrap();
        assert!(h.store.exists(&handle.file_name).await);

        let invocations = h.runner.invocations();
        let fetch_args = &invocations[0].1;
        let selector_pos = fetch_args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(fetch_args[selector_pos + 1], "best");

        let transcode_args = &invocations[1].1;
        let bitrate_pos = transcode_args.iter().position(|a| a == "-ab").unwrap();
        assert_eq!(transcode_args[bitrate_pos + 1], "192k");
    }

    #[tokio::test]
    async fn test_video_run_requests_muxed_mp4() {
        let h = harness(ToolScriptRunner::succeeding());
        let request = DownloadRequest {
            source_id: "abc123".to_string(),
            output: MediaKind::Video,
            quality: "720p".to_string(),
        };

        let handle = h.pipeline.run(&request).await.unwrap();

        assert!(handle.file_name.ends_with(".mp4"));
        let invocations = h.runner.invocations();
        assert_eq!(invocations.len(), 1);

        let args = &invocations[0].1;
        let selector_pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(
            args[selector_pos + 1],
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
        let merge_pos = args.iter().position(|a| a == "--merge-output-format").unwrap();
        assert_eq!(args[merge_pos + 1], "mp4");
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_no_files() {
        let h = harness(ToolScriptRunner::succeeding().with_fetch(ToolBehavior::FailExit));

        let result = h.pipeline.run(&audio_request("320kbps")).await;

        assert!(matches!(result, Err(PipelineError::FetchFailed { .. })));
        assert!(h.store.list_by_prefix("abc123").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transcode_failure_cleans_up_intermediate() {
        let h = harness(ToolScriptRunner::succeeding().with_transcode(ToolBehavior::FailExit));

        let result = h.pipeline.run(&audio_request("320kbps")).await;

        assert!(matches!(result, Err(PipelineError::TranscodeFailed { .. })));
        // The fetched intermediate was on disk when the transcode failed; the
        // error path must have removed it
        assert!(h.store.list_by_prefix("abc123").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_stage_failure_with_cleanup() {
        let h = harness(ToolScriptRunner::succeeding().with_fetch(ToolBehavior::TimeOut));

        let result = h.pipeline.run(&audio_request("320kbps")).await;

        assert!(matches!(result, Err(PipelineError::FetchFailed { .. })));
        assert!(h.store.list_by_prefix("abc123").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_silent_tool_success_is_output_missing() {
        let h = harness(
            ToolScriptRunner::succeeding().with_fetch(ToolBehavior::SucceedWithoutOutput),
        );
        let request = DownloadRequest {
            source_id: "abc123".to_string(),
            output: MediaKind::Video,
            quality: "720p".to_string(),
        };

        let result = h.pipeline.run(&request).await;

        assert!(matches!(result, Err(PipelineError::OutputMissing { .. })));
        assert!(h.store.list_by_prefix("abc123").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_for_same_source_never_collide() {
        let h = harness(ToolScriptRunner::succeeding());
        let request = audio_request("192kbps");

        let (a, b) = tokio::join!(h.pipeline.run(&request), h.pipeline.run(&request));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.id, b.id);
        assert_ne!(a.path, b.path);
        assert!(h.store.exists(&a.file_name).await);
        assert!(h.store.exists(&b.file_name).await);
    }

    #[test]
    fn test_run_ids_are_unique_per_run() {
        let ids: HashSet<String> = (0..64).map(|_| generate_run_id("abc123")).collect();
        assert_eq!(ids.len(), 64);
        assert!(ids.iter().all(|id| id.starts_with("abc123_")));
    }
}
