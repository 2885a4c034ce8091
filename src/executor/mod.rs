//! External process execution
//!
//! Every runtime and in-container operation is a shell command string run
//! through a [`ProcessExecutor`]. The production executor spawns `sh -c`;
//! tests plug in a scripted one.

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, SandboxError};

/// Default output ceiling for commands that produce little output.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Largest stdout accepted before the command is killed
    pub max_output_bytes: usize,
}

impl ExecOptions {
    pub fn with_limit(max_output_bytes: usize) -> Self {
        Self { max_output_bytes }
    }
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run a shell command, failing on a non-zero exit status.
    async fn run(&self, command: &str, opts: &ExecOptions) -> Result<CommandOutput>;
}

/// Runs commands through `sh -c` on the host.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessExecutor for ShellExecutor {
    async fn run(&self, command: &str, opts: &ExecOptions) -> Result<CommandOutput> {
        debug!(command = %command, "exec");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // stderr is drained on its own task so a chatty command can't block
        // on a full pipe while stdout is still being read.
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let mut stdout = Vec::new();
        if let Some(pipe) = child.stdout.take() {
            pipe.take(opts.max_output_bytes as u64 + 1)
                .read_to_end(&mut stdout)
                .await?;
        }

        if stdout.len() > opts.max_output_bytes {
            let _ = child.kill().await;
            if let Some(task) = stderr_task {
                task.abort();
            }
            return Err(SandboxError::OutputLimitExceeded {
                limit: opts.max_output_bytes,
            });
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        if !status.success() {
            return Err(SandboxError::CommandFailed {
                command: command.to_string(),
                code: status.code(),
                stderr: if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                },
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

/// Quote a single argument for `sh`.
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c))
    {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}
