//! Format resolution: available stream qualities for a source.
//!
//! Queries the fetch tool's structured metadata dump and collapses the raw
//! stream descriptors into a small closed vocabulary of discrete video
//! resolutions and audio bitrates. Read-only and side-effect free; safe to run
//! with unbounded concurrency.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::tools::Fetcher;
use crate::{PipelineError, Result};

/// Available qualities and display metadata for one source.
///
/// Derived fresh per query, never cached, never mutated. Field names follow
/// the wire format consumed by clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatCatalog {
    pub title: Option<String>,
    /// Duration in seconds
    #[serde(rename = "duration")]
    pub duration_seconds: Option<f64>,
    #[serde(rename = "thumbnail")]
    pub thumbnail_url: Option<String>,
    /// Distinct video quality labels, best first
    pub video: Vec<String>,
    /// Distinct audio quality labels, best first
    pub audio: Vec<String>,
}

/// Metadata document shape emitted by the fetch tool. Only the fields the
/// catalog needs are modelled; everything else is ignored.
#[derive(Debug, Deserialize)]
struct RawMetadata {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawStream>,
}

#[derive(Debug, Deserialize)]
struct RawStream {
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
}

impl RawStream {
    fn has_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|c| c != "none")
    }

    fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|c| c != "none")
    }
}

/// Resolves a source id to its [`FormatCatalog`].
pub struct FormatResolver {
    fetcher: Fetcher,
}

impl FormatResolver {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    /// Queries the fetch tool and normalizes its stream descriptors.
    ///
    /// # Errors
    ///
    /// - `PipelineError::UpstreamUnavailable` - Tool exited non-zero or the
    ///   document did not parse
    pub async fn resolve(&self, source_id: &str) -> Result<FormatCatalog> {
        let document = self.fetcher.dump_metadata(source_id).await?;

        let metadata: RawMetadata =
            serde_json::from_str(&document).map_err(|e| PipelineError::UpstreamUnavailable {
                detail: format!("unparseable metadata document: {e}"),
            })?;

        tracing::debug!(
            source_id,
            streams = metadata.formats.len(),
            "resolved format catalog"
        );

        Ok(catalog_from_metadata(metadata))
    }
}

/// Collapses raw streams into the catalog vocabulary.
///
/// Video: distinct heights of any stream carrying a video codec. Audio:
/// distinct rounded bitrates of pure-audio streams only. Ties collapse to one
/// entry; both lists are sorted descending.
fn catalog_from_metadata(metadata: RawMetadata) -> FormatCatalog {
    let heights: BTreeSet<u32> = metadata
        .formats
        .iter()
        .filter(|s| s.has_video())
        .filter_map(|s| s.height)
        .collect();

    let bitrates: BTreeSet<u32> = metadata
        .formats
        .iter()
        .filter(|s| s.has_audio() && !s.has_video())
        .filter_map(|s| s.abr)
        .map(|abr| abr.round() as u32)
        .collect();

    FormatCatalog {
        title: metadata.title,
        duration_seconds: metadata.duration,
        thumbnail_url: metadata.thumbnail,
        video: heights.iter().rev().map(|h| format!("{h}p")).collect(),
        audio: bitrates.iter().rev().map(|b| format!("{b}kbps")).collect(),
    }
}
