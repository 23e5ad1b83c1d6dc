//! Clipforge Web - HTTP surface for the download-and-convert pipeline.
//!
//! Thin request/response mapping over `clipforge-core`: format queries,
//! pipeline runs, one-shot artifact serving, and soft-dependency analytics
//! proxying.

pub mod analytics;
pub mod handlers;
pub mod server;

pub use analytics::{AnalyticsClient, DatastoreConfig, SoftOutcome};
pub use server::{AppState, router, run_server};
