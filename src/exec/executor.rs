//! Process executor — runs a composed invocation through a shell with a
//! timeout, capturing stdout and stderr in full.
//!
//! `CommandRunner` is the seam the pipeline and the metadata cache talk to;
//! `ShellRunner` is the production implementation. Tests substitute stubs.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tokio::io::AsyncReadExt;
use tokio::process::Child;

/// Generic failure message when no better diagnostic is available.
pub const EXECUTION_FAILED: &str = "Command execution failed";

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Outcome of one invocation, produced exactly once per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Set only when the process could not run, timed out or faulted.
    /// A non-zero exit status or non-empty stderr alone does not set it.
    pub failed: bool,
}

impl ExecutionResult {
    pub fn completed(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            failed: false,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            failed: true,
        }
    }

    /// True if the run failed or wrote anything to stderr.
    pub fn is_error(&self) -> bool {
        self.failed || !self.stderr.is_empty()
    }
}

/// Runs invocation strings and reports their outcome.
///
/// Implementations never error outward: every failure mode is folded into the
/// returned `ExecutionResult`.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, invocation: &'a str, timeout: Duration) -> BoxFuture<'a, ExecutionResult>;
}

/// Runs invocations as `<shell> -c <invocation>`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl ShellRunner {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    /// `cmd` takes `/C`; every POSIX-style shell takes `-c`.
    fn command_flag(&self) -> &'static str {
        let is_cmd = Path::new(&self.shell)
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("cmd"));
        if is_cmd { "/C" } else { "-c" }
    }

    async fn run_inner(&self, invocation: &str, timeout: Duration) -> ExecutionResult {
        let start = Instant::now();

        let mut cmd = tokio::process::Command::new(&self.shell);
        cmd.arg(self.command_flag()).arg(invocation);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    shell = %self.shell,
                    command = %invocation,
                    error = %e,
                    "failed to spawn command"
                );
                return ExecutionResult::failure(EXECUTION_FAILED);
            }
        };

        // The collect future borrows the child; it is gone once timeout() returns,
        // so the child can still be killed below.
        let outcome = tokio::time::timeout(timeout, collect_output(&mut child)).await;
        let elapsed = start.elapsed().as_millis();

        match outcome {
            Err(_elapsed) => {
                // Kill the process, not just the future
                let _ = child.kill().await;
                tracing::warn!(
                    command = %invocation,
                    timeout_ms = %timeout.as_millis(),
                    "command timed out, process killed"
                );
                ExecutionResult::failure(format!(
                    "{}: timed out after {}ms",
                    EXECUTION_FAILED,
                    timeout.as_millis()
                ))
            }
            Ok(Err(fault)) => {
                tracing::warn!(
                    command = %invocation,
                    error = %fault.error,
                    duration_ms = %elapsed,
                    "command faulted while collecting output"
                );
                fault.into_result()
            }
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                tracing::info!(
                    command = %invocation,
                    exit_code = %exit_code,
                    duration_ms = %elapsed,
                    "kubectl invocation"
                );
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if !stderr.is_empty() {
                    tracing::debug!(stderr = %stderr, "command stderr");
                }
                ExecutionResult::completed(stdout, stderr)
            }
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run<'a>(&'a self, invocation: &'a str, timeout: Duration) -> BoxFuture<'a, ExecutionResult> {
        Box::pin(self.run_inner(invocation, timeout))
    }
}

/// An I/O error raised while the process was running, with whatever stderr
/// had been read before it.
struct CollectFault {
    error: std::io::Error,
    stderr: String,
}

impl CollectFault {
    /// Stderr read so far becomes the message; the generic one otherwise.
    fn into_result(self) -> ExecutionResult {
        if self.stderr.is_empty() {
            ExecutionResult::failure(EXECUTION_FAILED)
        } else {
            ExecutionResult::failure(self.stderr)
        }
    }
}

/// Drain stdout and stderr concurrently while waiting for the child to exit.
async fn collect_output(child: &mut Child) -> Result<std::process::Output, CollectFault> {
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let read_stdout = async {
        match stdout_pipe.as_mut() {
            Some(pipe) => pipe.read_to_end(&mut stdout).await.map(|_| ()),
            None => Ok(()),
        }
    };
    let read_stderr = async {
        match stderr_pipe.as_mut() {
            Some(pipe) => pipe.read_to_end(&mut stderr).await.map(|_| ()),
            None => Ok(()),
        }
    };

    let (out_res, err_res, status) = tokio::join!(read_stdout, read_stderr, child.wait());

    let first_error = out_res.err().or(err_res.err());
    match (first_error, status) {
        (None, Ok(status)) => Ok(std::process::Output {
            status,
            stdout,
            stderr,
        }),
        (Some(error), _) | (None, Err(error)) => Err(CollectFault {
            error,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }),
    }
}
