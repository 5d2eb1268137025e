//! External Command Execution
//!
//! All CLI invocations (the cloud CLI probe, `git` in the clone step) go through
//! the [`CommandRunner`] trait so they can be replaced in tests.
//!
//! The system runner captures stdout/stderr, trims stdout, and kills the child
//! process if it outlives the configured timeout.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{Result, SwitchboardError};

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (None if terminated by a signal)
    pub status: Option<i32>,

    /// Standard output, trimmed
    pub stdout: String,

    /// Standard error, trimmed
    pub stderr: String,
}

impl CommandOutput {
    /// Create a successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self { status: Some(0), stdout: stdout.into(), stderr: String::new() }
    }

    /// Create a failed output with the given exit code and stderr
    pub fn failure(status: i32, stderr: impl Into<String>) -> Self {
        Self { status: Some(status), stdout: String::new(), stderr: stderr.into() }
    }

    /// Whether the command exited with status 0
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }

    /// Return trimmed stdout if the command succeeded, otherwise a `CommandFailed` error
    pub fn into_stdout(self, program: &str) -> Result<String> {
        if self.succeeded() {
            Ok(self.stdout)
        } else {
            let status = self.status.map_or_else(|| "signal".to_string(), |c| c.to_string());
            Err(SwitchboardError::command_failed(
                program,
                format!("exit status {status}: {}", self.stderr),
            ))
        }
    }

    fn captured(output: &std::process::Output) -> Self {
        Self {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

/// Trait for executing external commands, allowing for fakes in tests
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, optionally inside `working_dir`
    ///
    /// Returns `Err` only if the process could not be started or timed out;
    /// a non-zero exit is reported through [`CommandOutput::status`].
    async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<CommandOutput>;

    /// Run `program` to completion on the current thread
    ///
    /// For cleanup in `Drop`, where awaiting is not possible.
    fn run_blocking(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Real command runner backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct SystemCommandRunner {
    timeout: Duration,
}

impl SystemCommandRunner {
    /// Create a runner with the given per-command timeout
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemCommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> Result<CommandOutput> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }

        let child = command
            .spawn()
            .map_err(|e| SwitchboardError::command_failed(program, format!("could not start: {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                SwitchboardError::command_failed(
                    program,
                    format!("timed out after {}ms", self.timeout.as_millis()),
                )
            })?
            .map_err(|e| SwitchboardError::command_failed(program, e.to_string()))?;

        Ok(CommandOutput::captured(&output))
    }

    fn run_blocking(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let output = std::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SwitchboardError::command_failed(program, format!("could not start: {e}")))?;
        Ok(CommandOutput::captured(&output))
    }
}

/// A command invocation as seen by a runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory, if any
    pub working_dir: Option<PathBuf>,
}

impl Invocation {
    /// Program and arguments joined with spaces
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
