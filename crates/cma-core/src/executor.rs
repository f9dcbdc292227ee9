use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

/// Combined output beyond this many bytes is dropped.
pub const MAX_OUTPUT: usize = 64 * 1024;

/// Exit code reported when the process never produced one.
pub const NO_EXIT_CODE: i32 = -1;

/// Result of running one command line.
///
/// A non-zero `exit_code` alone is not an error; `error` is only set when the
/// process could not be started or was killed on timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub output: Vec<u8>,
    pub exit_code: i32,
    pub error: Option<String>,
}

impl CommandOutput {
    pub fn failed_to_run(message: impl Into<String>) -> Self {
        Self {
            output: Vec::new(),
            exit_code: NO_EXIT_CODE,
            error: Some(message.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }

    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command_line: &str) -> CommandOutput;
}

/// Runs command lines through `bash -c` (or `sh -c` when bash is absent)
/// with a bounded timeout.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: PathBuf,
    timeout: Duration,
}

impl ShellExecutor {
    pub fn new(timeout: Duration) -> Self {
        let shell = which::which("bash")
            .or_else(|_| which::which("sh"))
            .unwrap_or_else(|_| PathBuf::from("/bin/sh"));
        Self { shell, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command_line: &str) -> CommandOutput {
        debug!(cmd = command_line, shell = %self.shell.display(), "executing");

        let child = tokio::process::Command::new(&self.shell)
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                warn!(cmd = command_line, error = %e, "command failed to start");
                return CommandOutput::failed_to_run(format!("{command_line}: {e}"));
            }
        };

        // Dropping the wait future on timeout kills the child.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => {
                let mut output = out.stdout;
                output.extend_from_slice(&out.stderr);
                output.truncate(MAX_OUTPUT);
                CommandOutput {
                    output,
                    exit_code: out.status.code().unwrap_or(NO_EXIT_CODE),
                    error: None,
                }
            }
            Ok(Err(e)) => CommandOutput::failed_to_run(format!("{command_line}: {e}")),
            Err(_) => {
                warn!(cmd = command_line, timeout = ?self.timeout, "command timed out");
                CommandOutput::failed_to_run(format!(
                    "{command_line}: timed out after {:?}",
                    self.timeout
                ))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
