//! Agent process spawner.
//!
//! Spawns agent processes with:
//! - piped stdin/stdout/stderr,
//! - `kill_on_drop(true)` so an abandoned handle never leaks a process,
//! - the fully merged environment block (`env_clear()` first, so the
//!   block built by [`crate::platform::env`] is exactly what the child sees).

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::platform::CommandSpec;
use crate::{AppError, Result};

/// Maximum number of stderr bytes retained for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// Everything needed to launch one process.
#[derive(Debug, Clone, Copy)]
pub struct SpawnRequest<'a> {
    /// Log label, e.g. `Claude Code (claude)`.
    pub label: &'a str,
    /// Platform-wrapped command line.
    pub command: &'a CommandSpec,
    /// Working directory.
    pub cwd: &'a Path,
    /// Complete environment block.
    pub env: &'a BTreeMap<String, String>,
    /// Run through `cmd.exe /C` (native Windows).
    pub native_shell: bool,
}

/// A running child with its stdio captured.
#[derive(Debug)]
pub struct SpawnedProcess {
    /// Child handle; the exit supervisor takes ownership.
    pub child: Child,
    /// OS process id, when available.
    pub pid: Option<u32>,
    /// Agent stdin.
    pub stdin: ChildStdin,
    /// Agent stdout.
    pub stdout: ChildStdout,
    /// Agent stderr.
    pub stderr: ChildStderr,
}

/// Spawn a process per `request`.
///
/// # Errors
///
/// - [`AppError::CommandNotFound`] when the executable does not exist.
/// - [`AppError::Process`] for any other spawn failure or missing pipe.
pub fn spawn_process(request: SpawnRequest<'_>) -> Result<SpawnedProcess> {
    let mut cmd = if request.native_shell {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/C").arg(&request.command.command);
        cmd
    } else {
        Command::new(&request.command.command)
    };

    cmd.args(&request.command.args)
        .env_clear()
        .envs(request.env)
        .current_dir(request.cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            AppError::CommandNotFound(request.command.command.clone())
        } else {
            AppError::Process(format!("failed to start {}: {err}", request.label))
        }
    })?;

    let pid = child.id();
    info!(agent = request.label, pid, "agent process spawned");

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Process("failed to capture agent stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Process("failed to capture agent stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Process("failed to capture agent stderr".into()))?;

    Ok(SpawnedProcess {
        child,
        pid,
        stdin,
        stdout,
        stderr,
    })
}

/// Bounded tail of a process's stderr, shared with the logging task.
#[derive(Debug, Clone, Default)]
pub struct StderrTail(Arc<Mutex<String>>);

impl StderrTail {
    /// Empty tail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the retained text.
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push_line(&self, line: &str) {
        let mut tail = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        tail.push_str(line);
        tail.push('\n');
        if tail.len() > STDERR_TAIL_BYTES {
            let mut cut = tail.len() - STDERR_TAIL_BYTES;
            while !tail.is_char_boundary(cut) {
                cut += 1;
            }
            tail.drain(..cut);
        }
    }
}

/// Log every stderr line at `DEBUG` and keep a bounded tail.
///
/// Lines are decoded lossily; the drain only stops at EOF or an I/O error,
/// so the child never sees a closed stderr pipe while it is running.
#[must_use]
pub fn spawn_stderr_logger(label: String, stderr: ChildStderr, tail: StderrTail) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\n', '\r']);
                    debug!(agent = %label, stderr = %line, "agent stderr");
                    tail.push_line(line);
                }
                Err(err) => {
                    debug!(agent = %label, %err, "agent stderr read failed");
                    break;
                }
            }
        }
    })
}
