//! Integration tests for Clipforge.
//!
//! These cover the interactions the unit tests cannot: the pipeline driving
//! the lifecycle scheduler over a real scratch directory, and the HTTP
//! surface end to end over scripted external tools.

#[path = "integration/pipeline_lifecycle.rs"]
mod pipeline_lifecycle;

#[path = "integration/http_api.rs"]
mod http_api;
