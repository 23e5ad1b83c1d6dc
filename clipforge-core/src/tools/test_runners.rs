//! Scripted stand-ins for the external tools.
//!
//! Lets pipeline and resolver tests run without yt-dlp or ffmpeg installed:
//! the runner inspects the argument list the same way the real binary would,
//! writes (or deliberately fails to write) the named output file, and records
//! every invocation for assertions.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::process::{ProcessError, ProcessOutput, ProcessRunner};

/// How a scripted tool stage behaves when invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolBehavior {
    /// Write the named output file and exit zero
    Succeed,
    /// Exit zero without writing any output file
    SucceedWithoutOutput,
    /// Exit non-zero with diagnostic text on stderr
    FailExit,
    /// Report a wall-clock timeout
    TimeOut,
}

/// What a scripted metadata query returns.
#[derive(Debug, Clone)]
pub enum MetadataScript {
    /// Exit zero with this document on stdout
    Json(String),
    /// Exit non-zero
    FailExit,
}

/// A recorded tool invocation: program plus full argument list.
pub type Invocation = (String, Vec<String>);

/// Scripted [`ProcessRunner`] covering both tools.
pub struct ToolScriptRunner {
    fetch_bin: String,
    transcode_bin: String,
    fetch: ToolBehavior,
    transcode: ToolBehavior,
    metadata: MetadataScript,
    invocations: Mutex<Vec<Invocation>>,
}

impl ToolScriptRunner {
    /// Runner where every stage succeeds and writes its output file.
    pub fn succeeding() -> Self {
        Self {
            fetch_bin: "yt-dlp".to_string(),
            transcode_bin: "ffmpeg".to_string(),
            fetch: ToolBehavior::Succeed,
            transcode: ToolBehavior::Succeed,
            metadata: MetadataScript::FailExit,
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fetch(mut self, behavior: ToolBehavior) -> Self {
        self.fetch = behavior;
        self
    }

    pub fn with_transcode(mut self, behavior: ToolBehavior) -> Self {
        self.transcode = behavior;
        self
    }

    pub fn with_metadata_json(mut self, json: impl Into<String>) -> Self {
        self.metadata = MetadataScript::Json(json.into());
        self
    }

    /// Every invocation seen so far, oldest first.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    fn fetch_output_path(args: &[String]) -> Option<PathBuf> {
        args.iter()
            .position(|a| a == "-o")
            .and_then(|i| args.get(i + 1))
            .map(PathBuf::from)
    }

    fn transcode_output_path(args: &[String]) -> Option<PathBuf> {
        args.last().map(PathBuf::from)
    }

    fn apply(behavior: ToolBehavior, program: &str, output: Option<PathBuf>)
    -> Result<ProcessOutput, ProcessError> {
        match behavior {
            ToolBehavior::Succeed => {
                if let Some(path) = output {
                    std::fs::write(&path, b"scripted media bytes").expect("write scripted output");
                }
                Ok(ProcessOutput {
                    exit_code: Some(0),
                    stdout: String::new(),
                    stderr: String::new(),
                })
            }
            ToolBehavior::SucceedWithoutOutput => Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }),
            ToolBehavior::FailExit => Ok(ProcessOutput {
                exit_code: Some(1),
                stdout: String::new(),
                stderr: format!("scripted failure: {program}"),
            }),
            ToolBehavior::TimeOut => Err(ProcessError::TimedOut {
                program: program.to_string(),
                timeout: Duration::from_secs(0),
            }),
        }
    }
}

#[async_trait]
impl ProcessRunner for ToolScriptRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        self.invocations
            .lock()
            .push((program.to_string(), args.to_vec()));

        // Version probes always answer
        if args.iter().any(|a| a == "--version" || a == "-version") {
            return Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: "scripted 0.0.0\n".to_string(),
                stderr: String::new(),
            });
        }

        if program == self.transcode_bin {
            return Self::apply(
                self.transcode,
                program,
                Self::transcode_output_path(args),
            );
        }

        // Metadata dump is a fetch-tool mode of its own
        if args.iter().any(|a| a == "-J") {
            return match &self.metadata {
                MetadataScript::Json(json) => Ok(ProcessOutput {
                    exit_code: Some(0),
                    stdout: json.clone(),
                    stderr: String::new(),
                }),
                MetadataScript::FailExit => Ok(ProcessOutput {
                    exit_code: Some(1),
                    stdout: String::new(),
                    stderr: "scripted metadata failure".to_string(),
                }),
            };
        }

        Self::apply(self.fetch, program, Self::fetch_output_path(args))
    }
}
