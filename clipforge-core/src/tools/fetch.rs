//! Fetch tool wrapper: stream selection and materialization of remote media.

use std::path::Path;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::{PipelineError, Result};

use super::process::{ProcessRunner, diagnostic_tail};

/// Video quality ladder, label to fetch-tool selector expression.
///
/// Selectors prefer the best stream at or below the labelled height and fall
/// back to the overall best mux when nothing matches. This is data, not logic:
/// swapping the fetch tool means swapping this table.
const VIDEO_SELECTORS: &[(&str, &str)] = &[
    ("2160p", "bestvideo[height<=2160]+bestaudio/best[height<=2160]"),
    ("1440p", "bestvideo[height<=1440]+bestaudio/best[height<=1440]"),
    ("1080p", "bestvideo[height<=1080]+bestaudio/best[height<=1080]"),
    ("720p", "bestvideo[height<=720]+bestaudio/best[height<=720]"),
    ("480p", "bestvideo[height<=480]+bestaudio/best[height<=480]"),
    ("360p", "bestvideo[height<=360]+bestaudio/best[height<=360]"),
];

/// Audio quality ladder, label to fetch-tool selector expression.
const AUDIO_SELECTORS: &[(&str, &str)] = &[
    ("320kbps", "bestaudio[abr>=256]/bestaudio/best"),
    ("256kbps", "bestaudio[abr>=192]/bestaudio/best"),
    ("192kbps", "bestaudio[abr>=128]/bestaudio/best"),
    ("128kbps", "bestaudio[abr<=128]/bestaudio/best"),
];

/// Fallback selector for quality labels outside either ladder.
///
/// Unknown labels are a leniency policy, not an error path: the caller gets
/// the best available stream instead of a rejection.
const BEST_SELECTOR: &str = "best";

/// Resolves a video quality label to a selector expression.
pub fn video_selector(quality: &str) -> &'static str {
    VIDEO_SELECTORS
        .iter()
        .find(|(label, _)| *label == quality)
        .map_or(BEST_SELECTOR, |(_, selector)| selector)
}

/// Resolves an audio quality label to a selector expression.
pub fn audio_selector(quality: &str) -> &'static str {
    AUDIO_SELECTORS
        .iter()
        .find(|(label, _)| *label == quality)
        .map_or(BEST_SELECTOR, |(_, selector)| selector)
}

/// Wrapper around the external fetch tool.
///
/// Read-only metadata queries and stream downloads share the same binary; the
/// wrapper owns argument construction and error mapping.
pub struct Fetcher {
    runner: Arc<dyn ProcessRunner>,
    config: ToolsConfig,
}

impl Fetcher {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: ToolsConfig) -> Self {
        Self { runner, config }
    }

    fn watch_url(&self, source_id: &str) -> String {
        format!("{}{source_id}", self.config.watch_url_base)
    }

    fn base_args(&self, source_id: &str, selector: &str, output: &Path) -> Vec<String> {
        vec![
            self.watch_url(source_id),
            "-f".to_string(),
            selector.to_string(),
            "-o".to_string(),
            output.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--prefer-free-formats".to_string(),
            "--add-header".to_string(),
            self.config.referer_header.clone(),
            "--add-header".to_string(),
            self.config.user_agent_header.clone(),
        ]
    }

    /// Materializes the selected audio stream into `output`.
    ///
    /// # Errors
    ///
    /// - `PipelineError::FetchFailed` - Tool exited non-zero, timed out, or
    ///   could not be spawned
    pub async fn fetch_audio(&self, source_id: &str, quality: &str, output: &Path) -> Result<()> {
        let selector = audio_selector(quality);
        tracing::debug!(source_id, quality, selector, "fetching audio stream");
        self.invoke(self.base_args(source_id, selector, output))
            .await
    }

    /// Materializes a muxed video+audio stream into `output`, normalized to
    /// one fixed container format.
    ///
    /// # Errors
    ///
    /// - `PipelineError::FetchFailed` - Tool exited non-zero, timed out, or
    ///   could not be spawned
    pub async fn fetch_video(&self, source_id: &str, quality: &str, output: &Path) -> Result<()> {
        let selector = video_selector(quality);
        tracing::debug!(source_id, quality, selector, "fetching video stream");

        let mut args = self.base_args(source_id, selector, output);
        args.push("--merge-output-format".to_string());
        args.push("mp4".to_string());
        self.invoke(args).await
    }

    async fn invoke(&self, args: Vec<String>) -> Result<()> {
        let output = self
            .runner
            .run(&self.config.fetch_bin, &args, self.config.fetch_timeout)
            .await
            .map_err(|e| PipelineError::FetchFailed {
                detail: e.to_string(),
            })?;

        if !output.success() {
            return Err(PipelineError::FetchFailed {
                detail: diagnostic_tail(&output.stderr),
            });
        }

        Ok(())
    }

    /// Dumps the structured metadata document for a source.
    ///
    /// Never cached; catalogs can change between calls.
    ///
    /// # Errors
    ///
    /// - `PipelineError::UpstreamUnavailable` - Tool exited non-zero, timed
    ///   out, or could not be spawned
    pub async fn dump_metadata(&self, source_id: &str) -> Result<String> {
        let args = vec![
            "-J".to_string(),
            "--no-playlist".to_string(),
            self.watch_url(source_id),
        ];

        let output = self
            .runner
            .run(&self.config.fetch_bin, &args, self.config.metadata_timeout)
            .await
            .map_err(|e| PipelineError::UpstreamUnavailable {
                detail: e.to_string(),
            })?;

        if !output.success() {
            return Err(PipelineError::UpstreamUnavailable {
                detail: diagnostic_tail(&output.stderr),
            });
        }

        Ok(output.stdout)
    }

    /// Whether the fetch binary answers a version probe. Used for the startup
    /// banner only; an unavailable tool is a warning, not a boot failure.
    pub async fn probe(&self) -> bool {
        self.runner
            .run(
                &self.config.fetch_bin,
                &["--version".to_string()],
                self.config.metadata_timeout,
            )
            .await
            .map(|output| output.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_ladder_lookup() {
        assert_eq!(
            video_selector("720p"),
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
        assert_eq!(
            video_selector("2160p"),
            "bestvideo[height<=2160]+bestaudio/best[height<=2160]"
        );
    }

    #[test]
    fn test_audio_ladder_lookup() {
        assert_eq!(audio_selector("320kbps"), "bestaudio[abr>=256]/bestaudio/best");
        assert_eq!(audio_selector("128kbps"), "bestaudio[abr<=128]/bestaudio/best");
    }

    #[test]
    fn test_unknown_quality_falls_back_to_best() {
        assert_eq!(video_selector("9999p"), "best");
        assert_eq!(audio_selector("9999kbps"), "best");
        assert_eq!(audio_selector(""), "best");
        // Ladders are kind-specific: a video label is unknown to the audio ladder
        assert_eq!(audio_selector("720p"), "best");
    }
}
