//! Clipforge Core - download-and-convert orchestration for remote media
//!
//! This crate provides the building blocks for fetching a remote media asset,
//! optionally transcoding it to compressed audio, and managing the resulting
//! ephemeral artifact: external tool invocation, format resolution, artifact
//! storage, lifecycle scheduling, and configuration management.

pub mod artifacts;
pub mod config;
pub mod formats;
pub mod pipeline;
pub mod tools;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use artifacts::{ArtifactHandle, ArtifactStore, DiskArtifactStore, MediaKind};
pub use artifacts::lifecycle::LifecycleScheduler;
pub use config::ClipforgeConfig;
pub use formats::{FormatCatalog, FormatResolver};
pub use pipeline::{DownloadPipeline, DownloadRequest};
pub use tools::{ProcessRunner, TokioProcessRunner};

/// Failures that can surface from the download-and-convert pipeline.
///
/// Every pipeline-stage failure funnels through the same artifact cleanup
/// routine before it is returned, so no partial file outlives a failed run.
/// Embedded tool diagnostics are truncated to a bounded tail before they are
/// stored in a variant.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Metadata query against the fetch tool failed or produced garbage
    #[error("Upstream metadata unavailable: {detail}")]
    UpstreamUnavailable {
        /// Truncated diagnostic text from the tool
        detail: String,
    },

    /// Fetch tool exited non-zero or exceeded its time limit
    #[error("Fetch failed: {detail}")]
    FetchFailed {
        /// Truncated diagnostic text from the tool
        detail: String,
    },

    /// Transcode tool exited non-zero or exceeded its time limit
    #[error("Transcode failed: {detail}")]
    TranscodeFailed {
        /// Truncated diagnostic text from the tool
        detail: String,
    },

    /// A tool reported success but the expected output file is absent
    #[error("Output missing after reported success: {path}")]
    OutputMissing {
        /// Path that should have been written
        path: String,
    },

    /// Artifact id is unknown to the store, already served, or expired
    #[error("File not found or expired: {id}")]
    NotFoundOrExpired {
        /// Artifact id the caller asked for
        id: String,
    },

    /// I/O error at the artifact store boundary
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
