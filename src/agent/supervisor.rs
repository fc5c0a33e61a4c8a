//! Agent process supervision.
//!
//! Runs one agent invocation to completion, timeout or cancellation. The
//! child is placed in its own process group so termination reaches every
//! descendant: SIGTERM to the group, a grace window, then SIGKILL to whatever
//! is left, then reap. Output read before the child stopped is always kept.

use super::command::CommandLine;
use super::output::{extract_continuation_handle, missing_env_hint};
use crate::env::EnvSpec;
use crate::error::AgentError;
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time allowed for the output readers to drain once the child is gone.
const READER_DRAIN: Duration = Duration::from_secs(2);

/// Upper bound on each captured stream.
const MAX_CAPTURE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunLimits {
    /// Wall-clock budget for the whole run.
    pub timeout: Duration,
    /// How long the group gets between SIGTERM and SIGKILL.
    pub grace: Duration,
}

/// Why a run did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    Spawn { program: String, reason: String },
    /// Exited unsuccessfully. `code` is `None` when killed by a signal.
    NonZeroExit { code: Option<i32>, stderr: String },
    /// Waiting on the child failed.
    Wait(String),
    TimedOut { after: Duration },
    Cancelled,
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFailure::Spawn { program, reason } => {
                write!(f, "failed to launch '{}': {}", program, reason)
            }
            RunFailure::NonZeroExit { code, stderr } => {
                match code {
                    Some(code) => write!(f, "agent exited with code {}", code)?,
                    None => write!(f, "agent was terminated by a signal")?,
                }
                if !stderr.trim().is_empty() {
                    write!(f, ": {}", stderr.trim())?;
                }
                if let Some(hint) = missing_env_hint(stderr) {
                    write!(f, "\n{}", hint)?;
                }
                Ok(())
            }
            RunFailure::Wait(reason) => write!(f, "failed to wait for agent: {}", reason),
            RunFailure::TimedOut { after } => write!(f, "timed out after {}s", after.as_secs()),
            RunFailure::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one supervised run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The agent's final message, falling back to stdout.
    pub output: String,
    pub failure: Option<RunFailure>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub cancelled: bool,
    pub stdout: String,
    pub stderr: String,
    pub continuation: Option<String>,
    pub pid: Option<u32>,
    pub duration: Duration,
}

impl RunResult {
    /// A run that never produced a process.
    fn not_started(failure: RunFailure) -> Self {
        Self {
            output: String::new(),
            cancelled: matches!(failure, RunFailure::Cancelled),
            failure: Some(failure),
            exit_code: None,
            timed_out: false,
            stdout: String::new(),
            stderr: String::new(),
            continuation: None,
            pid: None,
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// The failure rendered for humans; empty for a successful run.
    pub fn error(&self) -> String {
        self.failure
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    /// Convert into the error taxonomy. Output captured before a runtime
    /// failure is carried in the error message.
    pub fn into_result(self) -> Result<Self, AgentError> {
        let Some(failure) = self.failure.clone() else {
            return Ok(self);
        };
        Err(match failure {
            RunFailure::Spawn { program, reason } => AgentError::Spawn { program, reason },
            RunFailure::TimedOut { after } => AgentError::Timeout { after },
            RunFailure::Cancelled => AgentError::Cancelled,
            RunFailure::NonZeroExit { code, ref stderr } => {
                let mut message = if stderr.trim().is_empty() {
                    "no error output".to_string()
                } else {
                    stderr.trim().to_string()
                };
                if let Some(hint) = missing_env_hint(stderr) {
                    message.push('\n');
                    message.push_str(&hint);
                }
                if !self.output.trim().is_empty() {
                    message.push_str("\n\nCaptured output:\n");
                    message.push_str(self.output.trim());
                }
                AgentError::Runtime {
                    exit_code: code,
                    message,
                }
            }
            RunFailure::Wait(reason) => AgentError::Runtime {
                exit_code: None,
                message: format!("failed to wait for agent: {}", reason),
            },
        })
    }
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Run `command` in `cwd` with exactly the variables in `env`.
///
/// `last_message` is the file the agent writes its final reply to; when it
/// is absent or empty the trimmed stdout is used instead.
pub async fn run(
    command: &CommandLine,
    env: &EnvSpec,
    cwd: &Path,
    last_message: Option<&Path>,
    limits: RunLimits,
    cancel: &CancellationToken,
) -> RunResult {
    let program = command.program.to_string_lossy().into_owned();

    if cancel.is_cancelled() {
        tracing::debug!(program = %program, "cancelled before spawn");
        return RunResult::not_started(RunFailure::Cancelled);
    }

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(cwd)
        .env_clear()
        .envs(env.vars())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let started = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(program = %program, error = %e, "agent spawn failed");
            let reason = if e.kind() == std::io::ErrorKind::NotFound {
                format!("{}. Fix: install the agent binary or set SUBAGENT_AGENT_BIN.", e)
            } else {
                e.to_string()
            };
            return RunResult::not_started(RunFailure::Spawn { program, reason });
        }
    };

    let pid = child.id();
    tracing::debug!(pid = ?pid, program = %program, "agent started");

    let stdout_buf = Arc::new(Mutex::new(Vec::new()));
    let stderr_buf = Arc::new(Mutex::new(Vec::new()));
    let readers = [
        child.stdout.take().map(|s| spawn_reader(s, Arc::clone(&stdout_buf))),
        child.stderr.take().map(|s| spawn_reader(s, Arc::clone(&stderr_buf))),
    ];

    let stop = tokio::select! {
        status = child.wait() => Stop::Exited(status),
        _ = tokio::time::sleep(limits.timeout) => Stop::TimedOut,
        _ = cancel.cancelled() => Stop::Cancelled,
    };

    let (exit_status, interrupted) = match stop {
        Stop::Exited(status) => (Some(status), None),
        Stop::TimedOut => (
            None,
            Some(RunFailure::TimedOut {
                after: limits.timeout,
            }),
        ),
        Stop::Cancelled => (None, Some(RunFailure::Cancelled)),
    };
    if let Some(reason) = &interrupted {
        tracing::info!(pid = ?pid, reason = %reason, "terminating agent process group");
        terminate(&mut child, pid, limits.grace).await;
    }

    for reader in readers.into_iter().flatten() {
        drain_reader(reader).await;
    }

    let stdout = lossy(&stdout_buf);
    let stderr = lossy(&stderr_buf);
    let continuation = extract_continuation_handle(&stdout, &stderr);

    let final_message = match last_message {
        Some(path) => tokio::fs::read_to_string(path).await.unwrap_or_default(),
        None => String::new(),
    };
    let output = if final_message.trim().is_empty() {
        stdout.trim().to_string()
    } else {
        final_message.trim().to_string()
    };

    let (failure, exit_code) = match (interrupted, exit_status) {
        (Some(failure), _) => (Some(failure), None),
        (None, Some(Ok(status))) if status.success() => (None, status.code()),
        (None, Some(Ok(status))) => (
            Some(RunFailure::NonZeroExit {
                code: status.code(),
                stderr: stderr.clone(),
            }),
            status.code(),
        ),
        (None, Some(Err(e))) => (Some(RunFailure::Wait(e.to_string())), None),
        (None, None) => (Some(RunFailure::Wait("no exit status".to_string())), None),
    };

    let duration = started.elapsed();
    tracing::info!(
        pid = ?pid,
        exit_code = ?exit_code,
        duration_ms = duration.as_millis() as u64,
        ok = failure.is_none(),
        "agent finished"
    );

    RunResult {
        output,
        timed_out: matches!(failure, Some(RunFailure::TimedOut { .. })),
        cancelled: matches!(failure, Some(RunFailure::Cancelled)),
        failure,
        exit_code,
        stdout,
        stderr,
        continuation,
        pid,
        duration,
    }
}

fn spawn_reader<R>(mut stream: R, buf: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let mut buf = buf.lock();
                    let room = MAX_CAPTURE_BYTES.saturating_sub(buf.len());
                    buf.extend_from_slice(&chunk[..n.min(room)]);
                }
            }
        }
    })
}

/// A grandchild that escaped the process group can hold the pipe open
/// forever; stop waiting after a bound and keep what was read.
async fn drain_reader(mut reader: JoinHandle<()>) {
    if tokio::time::timeout(READER_DRAIN, &mut reader).await.is_err() {
        reader.abort();
    }
}

fn lossy(buf: &Mutex<Vec<u8>>) -> String {
    String::from_utf8_lossy(&buf.lock()).into_owned()
}

/// SIGTERM the group, wait up to `grace` for the leader, SIGKILL the group,
/// then reap.
async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM);
        if tokio::time::timeout(grace, child.wait()).await.is_err() {
            tracing::warn!(pid, "agent ignored SIGTERM, sending SIGKILL");
        }
        signal_group(pid, nix::sys::signal::Signal::SIGKILL);
    }

    #[cfg(not(unix))]
    let _ = (pid, grace);

    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match nix::sys::signal::killpg(Pid::from_raw(raw), signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pid, ?signal, error = %e, "failed to signal process group"),
    }
}
