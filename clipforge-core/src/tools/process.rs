//! Process invocation abstraction shared by both external tools.

use std::time::Duration;

use async_trait::async_trait;

/// Maximum diagnostic bytes carried into an error variant.
///
/// Tool stderr can run to megabytes on a misbehaving stream; callers only ever
/// see a bounded tail of it.
pub const MAX_DIAGNOSTIC_BYTES: usize = 512;

/// Captured result of a finished child process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Exit code, if the process terminated normally
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Errors raised by the runner itself, as opposed to a tool-reported failure.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Binary could not be spawned at all
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Process exceeded its wall-clock budget and was killed
    #[error("{program} exceeded its {timeout:?} time limit")]
    TimedOut {
        /// Program that was killed
        program: String,
        /// Budget that was exceeded
        timeout: Duration,
    },
}

/// Narrow capability for running an external tool to completion.
///
/// `(program, args, timeout) -> (exit code, stdout, stderr)`, nothing more.
/// The calling task suspends until the child exits, yielding the scheduler to
/// other requests.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Runs `program` with `args`, bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// - `ProcessError::Spawn` - Binary missing or not executable
    /// - `ProcessError::TimedOut` - Budget exceeded; the child is killed
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError>;
}

/// Production runner backed by `tokio::process`.
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let mut command = tokio::process::Command::new(program);
        command.args(args);
        // Dropping the output future on timeout must take the child with it.
        command.kill_on_drop(true);

        tracing::debug!(program, ?args, "spawning external tool");

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Err(_) => {
                tracing::warn!(program, ?timeout, "external tool timed out, killing");
                return Err(ProcessError::TimedOut {
                    program: program.to_string(),
                    timeout,
                });
            }
            Ok(Err(source)) => {
                return Err(ProcessError::Spawn {
                    program: program.to_string(),
                    source,
                });
            }
            Ok(Ok(output)) => output,
        };

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() && !stderr.is_empty() {
            tracing::warn!(program, exit = ?output.status.code(), "tool stderr: {}", stderr);
        }

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}

/// Bounded tail of a tool's diagnostic text.
///
/// The interesting part of fetch/transcode stderr is almost always the end.
pub fn diagnostic_tail(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= MAX_DIAGNOSTIC_BYTES {
        return trimmed.to_string();
    }

    let mut start = trimmed.len() - MAX_DIAGNOSTIC_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_tail_short_text_untouched() {
        assert_eq!(diagnostic_tail("  boom  "), "boom");
    }

    #[test]
    fn test_diagnostic_tail_is_bounded() {
        let long = "x".repeat(MAX_DIAGNOSTIC_BYTES * 4);
        let tail = diagnostic_tail(&long);
        assert_eq!(tail.len(), MAX_DIAGNOSTIC_BYTES);
    }

    #[test]
    fn test_diagnostic_tail_respects_char_boundaries() {
        let long = "é".repeat(MAX_DIAGNOSTIC_BYTES);
        let tail = diagnostic_tail(&long);
        assert!(tail.len() <= MAX_DIAGNOSTIC_BYTES);
        assert!(tail.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_runner_captures_stdout_and_exit_code() {
        let runner = TokioProcessRunner;
        let output = runner
            .run(
                "sh",
                &["-c".to_string(), "echo hello".to_string()],
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_runner_reports_nonzero_exit() {
        let runner = TokioProcessRunner;
        let output = runner
            .run(
                "sh",
                &["-c".to_string(), "echo oops >&2; exit 3".to_string()],
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(!output.success());
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_runner_kills_on_timeout() {
        let runner = TokioProcessRunner;
        let result = runner
            .run("sleep", &["5".to_string()], Duration::from_millis(100))
            .await;

        assert!(matches!(result, Err(ProcessError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_runner_missing_binary_is_spawn_error() {
        let runner = TokioProcessRunner;
        let result = runner
            .run("clipforge-no-such-binary", &[], Duration::from_secs(1))
            .await;

        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
