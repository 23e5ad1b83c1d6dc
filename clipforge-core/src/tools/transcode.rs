//! Transcode tool wrapper: compressed audio output at a fixed bitrate preset.

use std::path::Path;
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::{PipelineError, Result};

use super::process::{ProcessRunner, diagnostic_tail};

/// Quality label to target bitrate preset.
const BITRATE_PRESETS: &[(&str, &str)] = &[
    ("320kbps", "320k"),
    ("256kbps", "256k"),
    ("192kbps", "192k"),
    ("128kbps", "128k"),
];

/// Preset used for quality labels outside the table.
const DEFAULT_BITRATE: &str = "192k";

/// Fixed output sample rate in Hz.
const SAMPLE_RATE: &str = "44100";

/// Fixed output channel count.
const CHANNELS: &str = "2";

/// Resolves a quality label to a bitrate preset, falling back to the default.
pub fn bitrate_preset(quality: &str) -> &'static str {
    BITRATE_PRESETS
        .iter()
        .find(|(label, _)| *label == quality)
        .map_or(DEFAULT_BITRATE, |(_, bitrate)| bitrate)
}

/// Wrapper around the external transcode tool.
pub struct Transcoder {
    runner: Arc<dyn ProcessRunner>,
    config: ToolsConfig,
}

impl Transcoder {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: ToolsConfig) -> Self {
        Self { runner, config }
    }

    /// Re-encodes `input` as compressed MP3 audio at `output`.
    ///
    /// Codec, sample rate, and channel layout are fixed; only the bitrate
    /// varies with the requested quality.
    ///
    /// # Errors
    ///
    /// - `PipelineError::TranscodeFailed` - Tool exited non-zero, timed out,
    ///   or could not be spawned
    pub async fn to_mp3(&self, input: &Path, output: &Path, quality: &str) -> Result<()> {
        let bitrate = bitrate_preset(quality);
        tracing::debug!(input = %input.display(), bitrate, "transcoding to mp3");

        let args = vec![
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-vn".to_string(),
            "-acodec".to_string(),
            "libmp3lame".to_string(),
            "-ab".to_string(),
            bitrate.to_string(),
            "-ar".to_string(),
            SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            CHANNELS.to_string(),
            "-y".to_string(),
            output.to_string_lossy().into_owned(),
        ];

        let result = self
            .runner
            .run(&self.config.transcode_bin, &args, self.config.transcode_timeout)
            .await
            .map_err(|e| PipelineError::TranscodeFailed {
                detail: e.to_string(),
            })?;

        if !result.success() {
            return Err(PipelineError::TranscodeFailed {
                detail: diagnostic_tail(&result.stderr),
            });
        }

        Ok(())
    }

    /// Whether the transcode binary answers a version probe.
    pub async fn probe(&self) -> bool {
        self.runner
            .run(
                &self.config.transcode_bin,
                &["-version".to_string()],
                self.config.transcode_timeout,
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
    fn test_bitrate_preset_lookup() {
        assert_eq!(bitrate_preset("320kbps"), "320k");
        assert_eq!(bitrate_preset("128kbps"), "128k");
    }

    #[test]
    fn test_unknown_quality_uses_default_preset() {
        assert_eq!(bitrate_preset("9999kbps"), "192k");
        assert_eq!(bitrate_preset("720p"), "192k");
        assert_eq!(bitrate_preset(""), "192k");
    }
}
