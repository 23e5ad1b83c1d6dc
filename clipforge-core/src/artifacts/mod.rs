//! Ephemeral artifact management.
//!
//! An artifact is a file produced by the pipeline and made available for
//! exactly one download. The store abstracts the single shared scratch
//! directory; the lifecycle scheduler owns timed expiry and the serve-once
//! deletion path.

pub mod lifecycle;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

use std::path::PathBuf;

pub use lifecycle::{LifecycleScheduler, ServedArtifact};
pub use store::{ArtifactStore, DiskArtifactStore};

/// Kind of media an artifact holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    /// File extension of the final artifact.
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Audio => "mp3",
            MediaKind::Video => "mp4",
        }
    }

    /// Media type served to clients.
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaKind::Audio => "audio/mpeg",
            MediaKind::Video => "video/mp4",
        }
    }
}

/// Handle to one pipeline run's output file.
///
/// Only servable artifacts get a handle; an artifact's further lifecycle
/// (served, expired) is tracked by its membership in the scheduler registry,
/// not on the handle itself.
///
/// The id is unique per run, not per source: concurrent requests for the same
/// source never collide, and a path is never reused across runs. Owned by the
/// pipeline until armed, then co-owned with the lifecycle scheduler; either
/// may trigger deletion, which is idempotent and safe to race.
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    /// Run id: source id plus a random suffix
    pub id: String,
    /// File name within the store, `{id}.{extension}`
    pub file_name: String,
    /// Location in the artifact store
    pub path: PathBuf,
    pub media: MediaKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_extensions_and_mime_types() {
        assert_eq!(MediaKind::Audio.extension(), "mp3");
        assert_eq!(MediaKind::Audio.mime_type(), "audio/mpeg");
        assert_eq!(MediaKind::Video.extension(), "mp4");
        assert_eq!(MediaKind::Video.mime_type(), "video/mp4");
    }
}
