//! Terminal process manager.
//!
//! Each terminal is one child process whose stdout and stderr are captured
//! into a bounded [`OutputBuffer`]. Exit status is published through a
//! `watch` channel so any number of `wait_for_exit` callers can wait on it.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ExitStatus, OutputBuffer, TerminalOutput, TerminalRequest};
use crate::platform::command::wrap_in_shell_if_needed;
use crate::platform::env::inherited_env;
use crate::platform::{
    build_process_env, wrap_command_for_platform, CommandSpec, LaunchOptions, WrapOptions,
};
use crate::{AppError, Result};

const READ_CHUNK_BYTES: usize = 8192;

struct Terminal {
    pid: Option<u32>,
    output: Mutex<OutputBuffer>,
    exit: watch::Sender<Option<ExitStatus>>,
    kill: CancellationToken,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl Terminal {
    fn exit_status(&self) -> Option<ExitStatus> {
        self.exit.borrow().clone()
    }

    fn output(&self) -> MutexGuard<'_, OutputBuffer> {
        self.output.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type TerminalMap = Arc<Mutex<HashMap<String, Arc<Terminal>>>>;

/// Runs and tracks agent-requested terminals.
pub struct TerminalManager {
    launch: LaunchOptions,
    release_grace: Duration,
    terminals: TerminalMap,
}

impl TerminalManager {
    /// Create a manager; released terminals are discarded after
    /// `release_grace`.
    #[must_use]
    pub fn new(launch: LaunchOptions, release_grace: Duration) -> Self {
        Self {
            launch,
            release_grace,
            terminals: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a terminal and return its id.
    ///
    /// A command that cannot be spawned still gets a terminal, already
    /// exited with code 127.
    pub fn create(&self, request: TerminalRequest) -> String {
        let id = Uuid::new_v4().to_string();

        let base = if request.args.is_empty() {
            wrap_in_shell_if_needed(&request.command, self.launch.platform)
        } else {
            CommandSpec {
                command: request.command.clone(),
                args: request.args.clone(),
            }
        };
        let cwd = request
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_default();
        let spec = wrap_command_for_platform(WrapOptions {
            command: &base.command,
            args: &base.args,
            cwd: &cwd,
            launch: &self.launch,
        });
        let env = build_process_env(inherited_env(), &request.env, None, self.launch.platform);

        info!(terminal_id = %id, command = %spec.command, args = ?spec.args, cwd = %cwd.display(), "creating terminal");

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .env_clear()
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if request.cwd.is_some() {
            cmd.current_dir(&cwd);
        }

        let (exit, _) = watch::channel(None);
        let spawned = cmd.spawn();
        let terminal = Arc::new(Terminal {
            pid: spawned.as_ref().ok().and_then(Child::id),
            output: Mutex::new(OutputBuffer::new(request.output_byte_limit)),
            exit,
            kill: CancellationToken::new(),
            cleanup: Mutex::new(None),
        });

        match spawned {
            Ok(mut child) => {
                if let Some(stdout) = child.stdout.take() {
                    tokio::spawn(capture(stdout, Arc::clone(&terminal)));
                }
                if let Some(stderr) = child.stderr.take() {
                    tokio::spawn(capture(stderr, Arc::clone(&terminal)));
                }
                tokio::spawn(watch_exit(id.clone(), child, Arc::clone(&terminal)));
            }
            Err(err) => {
                warn!(terminal_id = %id, %err, "terminal process failed to start");
                terminal.exit.send_replace(Some(ExitStatus::spawn_failed()));
            }
        }

        self.lock().insert(id.clone(), terminal);
        id
    }

    /// Current output, or `None` for an unknown terminal.
    #[must_use]
    pub fn output(&self, terminal_id: &str) -> Option<TerminalOutput> {
        let terminal = self.get(terminal_id)?;
        let output = terminal.output();
        Some(TerminalOutput {
            output: output.text().to_owned(),
            truncated: output.truncated(),
            exit_status: terminal.exit_status(),
        })
    }

    /// Wait until the terminal exits; returns at once if it already has.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] for an unknown terminal.
    pub async fn wait_for_exit(&self, terminal_id: &str) -> Result<ExitStatus> {
        let terminal = self
            .get(terminal_id)
            .ok_or_else(|| AppError::NotFound(format!("Terminal {terminal_id} not found")))?;
        let mut rx = terminal.exit.subscribe();
        drop(terminal);

        let status = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| AppError::NotFound(format!("Terminal {terminal_id} was discarded")))?;
        Ok(status.clone().unwrap_or_else(ExitStatus::spawn_failed))
    }

    /// Send SIGTERM to a running terminal. Returns `false` for an unknown
    /// terminal.
    pub fn kill(&self, terminal_id: &str) -> bool {
        let Some(terminal) = self.get(terminal_id) else {
            return false;
        };
        if terminal.exit_status().is_none() {
            terminal.kill.cancel();
        }
        true
    }

    /// Kill a terminal and discard it after the grace period, leaving time
    /// to poll its final output.
    pub fn release(&self, terminal_id: &str) -> bool {
        let Some(terminal) = self.get(terminal_id) else {
            return false;
        };
        info!(terminal_id, "releasing terminal");
        if terminal.exit_status().is_none() {
            terminal.kill.cancel();
        }

        let terminals = Arc::clone(&self.terminals);
        let id = terminal_id.to_owned();
        let grace = self.release_grace;
        let cleanup = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            debug!(terminal_id = %id, "discarding released terminal");
            terminals
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        });

        let previous = terminal
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cleanup);
        if let Some(previous) = previous {
            previous.abort();
        }
        true
    }

    /// Kill every terminal and forget them all immediately.
    pub fn kill_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        if !drained.is_empty() {
            info!(count = drained.len(), "killing all terminals");
        }
        for (id, terminal) in drained {
            if let Some(cleanup) = terminal
                .cleanup
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
            {
                cleanup.abort();
            }
            if terminal.exit_status().is_none() {
                debug!(terminal_id = %id, pid = terminal.pid, "killing terminal");
                terminal.kill.cancel();
            }
        }
    }

    /// Number of tracked terminals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no terminal is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn get(&self, terminal_id: &str) -> Option<Arc<Terminal>> {
        self.lock().get(terminal_id).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<Terminal>>> {
        self.terminals.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for TerminalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalManager")
            .field("launch", &self.launch)
            .field("terminals", &self.len())
            .finish_non_exhaustive()
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

async fn capture<R>(mut stream: R, terminal: Arc<Terminal>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0_u8; READ_CHUNK_BYTES];
    let mut carry = Vec::new();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let text = decode_chunk(&mut carry, &buf[..n]);
                if !text.is_empty() {
                    terminal.output().push(&text);
                }
            }
        }
    }
    if !carry.is_empty() {
        terminal.output().push(&String::from_utf8_lossy(&carry));
    }
}

/// Decodes `chunk` after any bytes held over from the previous read.
///
/// A multibyte character cut off at the end of the chunk stays in `carry`
/// for the next call; any other invalid sequence becomes U+FFFD.
fn decode_chunk(carry: &mut Vec<u8>, chunk: &[u8]) -> String {
    carry.extend_from_slice(chunk);
    let mut text = String::with_capacity(carry.len());
    let mut rest = carry.as_slice();
    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                rest = &[];
                break;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                match err.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    // Incomplete trailing sequence.
                    None => {
                        rest = after;
                        break;
                    }
                }
            }
        }
    }
    let held = rest.len();
    let start = carry.len() - held;
    carry.drain(..start);
    text
}

async fn watch_exit(id: String, mut child: Child, terminal: Arc<Terminal>) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = terminal.kill.cancelled() => {
            terminate(&mut child, terminal.pid);
            child.wait().await
        }
    };

    let exit = match status {
        Ok(status) => ExitStatus {
            exit_code: status.code(),
            signal: signal_name(&status),
        },
        Err(err) => {
            warn!(terminal_id = %id, %err, "waiting for terminal failed");
            ExitStatus {
                exit_code: None,
                signal: None,
            }
        }
    };
    info!(terminal_id = %id, code = exit.exit_code, signal = ?exit.signal, "terminal exited");
    terminal.exit.send_replace(Some(exit));
}

#[cfg(unix)]
fn terminate(child: &mut Child, pid: Option<u32>) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(raw_pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        let _ = child.start_kill();
        return;
    };
    if let Err(err) = signal::kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
        warn!(pid = raw_pid, %err, "SIGTERM failed, killing terminal");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _pid: Option<u32>) {
    let _ = child.start_kill();
}

#[cfg(unix)]
fn signal_name(status: &std::process::ExitStatus) -> Option<String> {
    use std::os::unix::process::ExitStatusExt;

    let raw = status.signal()?;
    Some(
        nix::sys::signal::Signal::try_from(raw)
            .map_or_else(|_| raw.to_string(), |signal| signal.as_str().to_owned()),
    )
}

#[cfg(not(unix))]
fn signal_name(_status: &std::process::ExitStatus) -> Option<String> {
    None
}
