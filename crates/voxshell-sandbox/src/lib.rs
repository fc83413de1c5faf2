//! VoxShell Sandbox - bounded command execution
//!
//! Runs a command released by the confirmation gate as a direct child
//! process: no shell on Unix, `cmd.exe /D /C` only for cmd built-ins on
//! Windows. Every run has a wall-clock limit and bounded output capture.
//! Failures are reported in the [`ExecutionResult`], never retried.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use voxshell_core::config::{DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_MAX_OUTPUT_BYTES};
use voxshell_core::{CommandLine, OsFamily, ReleasedCommand, ShellConfig};

/// Appended to a stream that exceeded the output limit
pub const TRUNCATION_MARKER: &str = "[truncated]";

/// cmd.exe built-ins that have no executable of their own
const CMD_BUILTINS: &[&str] = &[
    "dir", "mkdir", "md", "rmdir", "rd", "copy", "move", "del", "erase", "type", "cd", "chdir",
    "date", "time", "echo", "ren", "rename", "ver", "vol",
];

/// How long output readers may outlive the command's own time limit
const READER_GRACE: Duration = Duration::from_secs(1);

/// Executor settings
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Wall-clock limit per command
    pub timeout: Duration,
    /// Bytes kept per output stream
    pub max_output_bytes: usize,
    /// Working directory; the process cwd when unset
    pub working_dir: Option<PathBuf>,
    /// Conventions used to spawn the program
    pub os: OsFamily,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            working_dir: None,
            os: OsFamily::current(),
        }
    }
}

impl ExecutorConfig {
    pub fn from_shell_config(config: &ShellConfig) -> Self {
        Self {
            timeout: config.execution.timeout(),
            max_output_bytes: config.execution.max_output_bytes,
            working_dir: config.execution.working_dir.clone(),
            os: config.os_family(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_os(mut self, os: OsFamily) -> Self {
        self.os = os;
        self
    }
}

/// Outcome of one command
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub duration: Duration,
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Result for a command that could not be run at all
    pub fn failed(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            exit_code: -1,
            stdout: String::new(),
            stderr: message.into(),
            stdout_truncated: false,
            stderr_truncated: false,
            duration,
            timed_out: false,
        }
    }

    /// First non-empty stderr line, for spoken replies
    pub fn stderr_snippet(&self) -> Option<&str> {
        self.stderr.lines().map(str::trim).find(|line| !line.is_empty())
    }
}

/// Captured bytes of one stream
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Read a stream to the end, keeping at most `limit` bytes
async fn read_bounded<R>(mut reader: R, limit: usize) -> Captured
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = limit.saturating_sub(captured.bytes.len());
                if n > room {
                    captured.truncated = true;
                }
                captured.bytes.extend_from_slice(&buf[..n.min(room)]);
            }
        }
    }
    captured
}

/// Spawns released commands
#[derive(Debug, Clone)]
pub struct Executor {
    config: Arc<ExecutorConfig>,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run a released command in the configured working directory
    pub async fn execute(&self, released: ReleasedCommand) -> ExecutionResult {
        let dir = self.config.working_dir.clone();
        self.execute_in(released, dir.as_deref()).await
    }

    /// Run a released command in `dir`
    pub async fn execute_in(&self, released: ReleasedCommand, dir: Option<&Path>) -> ExecutionResult {
        let parsed = released.into_parsed();
        let started = Instant::now();

        tracing::info!(command_id = %parsed.id, intent = %parsed.intent, "Executing: {}", parsed.command);

        let result = match self.run(&parsed.command, dir, started).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(command_id = %parsed.id, "Execution failed: {:#}", e);
                ExecutionResult::failed(format!("{:#}", e), started.elapsed())
            }
        };

        tracing::info!(
            command_id = %parsed.id,
            exit_code = result.exit_code,
            timed_out = result.timed_out,
            "Finished in {:?}",
            result.duration
        );
        result
    }

    fn build_command(&self, line: &CommandLine, dir: Option<&Path>) -> Command {
        let program = line.program.to_lowercase();
        let mut command = if self.config.os == OsFamily::Windows && CMD_BUILTINS.contains(&program.as_str()) {
            let mut cmd = Command::new("cmd.exe");
            cmd.arg("/D").arg("/C").arg(&line.program);
            cmd
        } else {
            Command::new(&line.program)
        };

        command
            .args(&line.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = dir {
            command.current_dir(dir);
        }
        command
    }

    async fn run(&self, line: &CommandLine, dir: Option<&Path>, started: Instant) -> Result<ExecutionResult> {
        let mut child = self
            .build_command(line, dir)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", line.program))?;

        let stdout = child.stdout.take().ok_or_else(|| anyhow!("missing child stdout pipe"))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!("missing child stderr pipe"))?;

        let limit = self.config.max_output_bytes;
        let mut stdout_task = tokio::spawn(read_bounded(stdout, limit));
        let mut stderr_task = tokio::spawn(read_bounded(stderr, limit));

        let deadline = tokio::time::Instant::from_std(started) + self.config.timeout;
        let (status, timed_out) = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => (Some(status.context("Failed to wait for child")?), false),
            Err(_) => {
                tracing::warn!(program = %line.program, "Timed out after {:?}, killing", self.config.timeout);
                if let Err(e) = child.kill().await {
                    tracing::warn!(program = %line.program, "Failed to kill timed-out command: {}", e);
                }
                (None, true)
            }
        };

        // A grandchild can keep the pipes open after the child exits
        let readers_deadline = deadline + READER_GRACE;
        let stdout = match tokio::time::timeout_at(readers_deadline, &mut stdout_task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                stdout_task.abort();
                Captured::default()
            }
        };
        let stderr = match tokio::time::timeout_at(readers_deadline, &mut stderr_task).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                stderr_task.abort();
                Captured::default()
            }
        };

        let exit_code = status.and_then(|s| s.code()).unwrap_or(-1);
        Ok(ExecutionResult {
            success: exit_code == 0 && !timed_out,
            exit_code,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            stdout: stdout.into_text(),
            stderr: stderr.into_text(),
            duration: started.elapsed(),
            timed_out,
        })
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}
