//! HTTP request handlers.

pub mod api;
pub mod serving;

pub use api::{check_rate_limit, download, formats, health, track_download};
pub use serving::fetch_artifact;
