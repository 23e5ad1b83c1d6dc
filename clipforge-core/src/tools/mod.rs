//! External media tool integration.
//!
//! Both the fetch tool and the transcode tool are isolated child processes;
//! their exit status, stdout, and stderr are the only interface. Invocation
//! goes through the narrow [`ProcessRunner`] capability so pipeline logic is
//! testable without touching the real binaries.

pub mod fetch;
pub mod process;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_runners;
pub mod transcode;

pub use fetch::{Fetcher, audio_selector, video_selector};
pub use process::{ProcessError, ProcessOutput, ProcessRunner, TokioProcessRunner, diagnostic_tail};
pub use transcode::{Transcoder, bitrate_preset};
