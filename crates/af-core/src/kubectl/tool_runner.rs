//! External command runner with timeout, output cap, and cancellation.
//!
//! Used by the kubectl transport to run one-shot commands:
//!
//! - Per-command timeout with SIGTERM → SIGKILL escalation
//! - Output size caps to prevent memory exhaustion
//! - Cooperative cancellation checked while the child runs
//! - Command path validation to prevent injection

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, instrument, trace, warn};

use crate::cancel::CancelToken;

/// Default timeout per command in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum output size in bytes (10MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Grace period between SIGTERM and SIGKILL in milliseconds.
const SIGTERM_GRACE_MS: u64 = 500;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("command failed to spawn: {0}")]
    SpawnFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid command path: {0}")]
    InvalidPath(String),
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Command that was executed.
    pub command: String,

    /// Arguments passed to the command.
    pub args: Vec<String>,

    /// Standard output (may be truncated).
    pub stdout: Vec<u8>,

    /// Standard error (may be truncated).
    pub stderr: Vec<u8>,

    /// Exit code (if available).
    pub exit_code: Option<i32>,

    /// Whether output was truncated.
    pub truncated: bool,

    /// Execution duration.
    pub duration: Duration,

    /// Whether the command timed out.
    pub timed_out: bool,

    /// Whether the command was killed because the run was cancelled.
    pub cancelled: bool,
}

impl ToolOutput {
    /// Get stdout as string (lossy UTF-8 conversion).
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as string (lossy UTF-8 conversion).
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Check if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Configuration for the tool runner.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Timeout per command.
    pub timeout: Duration,

    /// Maximum output size per stream in bytes.
    pub max_output_bytes: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Runs external commands under the configured limits.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    config: ToolConfig,
}

type Captured = (Vec<u8>, Vec<u8>, Option<i32>, bool, bool, bool);

impl ToolRunner {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }

    /// Run `cmd` with `args`, stopping early if `cancel` fires.
    #[instrument(skip(self, args, cancel))]
    pub fn run(
        &self,
        cmd: &str,
        args: &[String],
        cancel: &CancelToken,
    ) -> Result<ToolOutput, ToolError> {
        validate_command(cmd)?;

        debug!(
            command = %cmd,
            args = ?args,
            timeout_ms = self.config.timeout.as_millis() as u64,
            max_output = self.config.max_output_bytes,
            "running tool"
        );

        let start = Instant::now();

        let mut command = Command::new(cmd);
        command.args(args);
        command.env("LC_ALL", "C");
        command.env("LANG", "C");

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!(command = %cmd, error = %e, "failed to spawn");
                if e.kind() == std::io::ErrorKind::NotFound {
                    ToolError::CommandNotFound(cmd.to_string())
                } else {
                    ToolError::SpawnFailed(e.to_string())
                }
            })?;

        let (stdout, stderr, exit_code, truncated, timed_out, cancelled) =
            self.execute_with_timeout(&mut child, cancel)?;

        let duration = start.elapsed();
        debug!(
            command = %cmd,
            duration_ms = duration.as_millis() as u64,
            exit_code = ?exit_code,
            timed_out,
            cancelled,
            "tool execution complete"
        );

        Ok(ToolOutput {
            command: cmd.to_string(),
            args: args.to_vec(),
            stdout,
            stderr,
            exit_code,
            truncated,
            duration,
            timed_out,
            cancelled,
        })
    }

    /// Poll a child process until it exits, times out, or is cancelled.
    fn execute_with_timeout(
        &self,
        child: &mut Child,
        cancel: &CancelToken,
    ) -> Result<Captured, ToolError> {
        let max_output = self.config.max_output_bytes;
        let deadline = Instant::now() + self.config.timeout;
        let mut stdout_buf = Vec::with_capacity(max_output.min(65536));
        let mut stderr_buf = Vec::with_capacity(max_output.min(65536));
        let mut truncated = false;
        let mut timed_out = false;
        let mut cancelled = false;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut chunk = vec![0u8; 8192];

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                warn!("run cancelled, stopping command");
                kill_with_grace(child);
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                warn!("command timed out, sending SIGTERM");
                kill_with_grace(child);
                break;
            }

            let mut did_read = false;
            if let Some(ref mut out) = stdout {
                if let Ok(n) = try_read_nonblocking(out, &mut chunk) {
                    did_read |= n > 0;
                    append_capped(&mut stdout_buf, &chunk[..n], max_output, &mut truncated);
                }
            }
            if let Some(ref mut err) = stderr {
                if let Ok(n) = try_read_nonblocking(err, &mut chunk) {
                    did_read |= n > 0;
                    append_capped(&mut stderr_buf, &chunk[..n], max_output, &mut truncated);
                }
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    if let Some(ref mut out) = stdout {
                        let _ = drain_to_limit(out, &mut stdout_buf, max_output, &mut truncated);
                    }
                    if let Some(ref mut err) = stderr {
                        let _ = drain_to_limit(err, &mut stderr_buf, max_output, &mut truncated);
                    }
                    let exit_code = status.code();
                    trace!(exit_code = ?exit_code, "process exited");
                    return Ok((stdout_buf, stderr_buf, exit_code, truncated, false, false));
                }
                Ok(None) => {
                    if !did_read {
                        thread::sleep(Duration::from_millis(10));
                    }
                }
                Err(e) => {
                    error!(error = %e, "failed to wait for child");
                    return Err(ToolError::Io(e));
                }
            }
        }

        let exit_code = child.wait().ok().and_then(|s| s.code());
        Ok((stdout_buf, stderr_buf, exit_code, truncated, timed_out, cancelled))
    }
}

/// Reject shell metacharacters and missing absolute paths.
fn validate_command(cmd: &str) -> Result<(), ToolError> {
    if cmd.is_empty() {
        return Err(ToolError::InvalidPath("empty command".to_string()));
    }
    if cmd.contains(['|', '&', ';', '$', '`', '\n', '\r']) {
        return Err(ToolError::InvalidPath(format!(
            "command contains shell metacharacters: {}",
            cmd
        )));
    }
    if cmd.starts_with('/') && !Path::new(cmd).exists() {
        return Err(ToolError::CommandNotFound(cmd.to_string()));
    }
    Ok(())
}

fn append_capped(buf: &mut Vec<u8>, data: &[u8], max: usize, truncated: &mut bool) {
    if data.is_empty() {
        return;
    }
    let space = max.saturating_sub(buf.len());
    let to_copy = data.len().min(space);
    buf.extend_from_slice(&data[..to_copy]);
    if data.len() > space {
        *truncated = true;
    }
}

/// Drain what is immediately available from a stream, up to the limit.
///
/// Non-blocking so that a grandchild still holding the pipe cannot hang us.
fn drain_to_limit<R: Read + AsRawFdCompat>(
    stream: &mut R,
    buf: &mut Vec<u8>,
    max: usize,
    truncated: &mut bool,
) -> std::io::Result<()> {
    let mut chunk = vec![0u8; 8192];
    while !*truncated {
        match try_read_nonblocking(stream, &mut chunk) {
            Ok(0) => break,
            Ok(n) => append_capped(buf, &chunk[..n], max, truncated),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(unix)]
use std::os::unix::io::AsRawFd as AsRawFdCompat;

#[cfg(not(unix))]
trait AsRawFdCompat {}
#[cfg(not(unix))]
impl<T> AsRawFdCompat for T {}

/// Kill a process with SIGTERM, then SIGKILL after the grace period.
#[cfg(unix)]
fn kill_with_grace(child: &mut Child) {
    let pid = child.id() as i32;

    // SAFETY: pid belongs to a child we spawned and have not yet reaped.
    unsafe {
        libc::kill(pid, libc::SIGTERM);
    }
    debug!(pid, "sent SIGTERM");

    thread::sleep(Duration::from_millis(SIGTERM_GRACE_MS));

    match child.try_wait() {
        Ok(Some(_)) => trace!(pid, "process exited after SIGTERM"),
        Ok(None) => {
            warn!(pid, "process did not exit after SIGTERM, sending SIGKILL");
            let _ = child.kill();
        }
        Err(e) => error!(pid, error = %e, "failed to check process status"),
    }
}

#[cfg(not(unix))]
fn kill_with_grace(child: &mut Child) {
    let _ = child.kill();
}

/// Read from a stream without blocking; `Ok(0)` when nothing is available.
#[cfg(unix)]
fn try_read_nonblocking<R: Read + AsRawFdCompat>(
    stream: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let fd = stream.as_raw_fd();

    // SAFETY: fd is owned by `stream` for the duration of this call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }

    let was_nonblocking = (flags & libc::O_NONBLOCK) != 0;
    if !was_nonblocking {
        // SAFETY: as above.
        let result = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if result < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }

    let result = stream.read(buf);

    if !was_nonblocking {
        // SAFETY: as above.
        unsafe {
            libc::fcntl(fd, libc::F_SETFL, flags);
        }
    }

    match result {
        Ok(n) => Ok(n),
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(0),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn try_read_nonblocking<R: Read>(stream: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    stream.read(buf)
}
