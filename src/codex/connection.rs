//! Codex MCP server connection.
//!
//! Codex runs as `codex mcp-server` (or `codex mcp serve` before 0.40) and
//! talks JSON-RPC with mixed framing, see [`CodexFramer`]. Approval
//! requests arrive role-reversed: Codex sends a request and waits for a
//! response frame. The frame observer records each such request id under
//! its normalized call id so that [`CodexConnection::respond_elicitation`]
//! can answer it later.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::{
    elicitation_call_id, normalize_call_id, CodexEvent, ELICITATION_SUFFIX, EVENT_METHOD,
};
use super::framer::CodexFramer;
use crate::models::AgentConfig;
use crate::platform::{prepare_command, LaunchOptions};
use crate::process::{ProcessExit, SpawnRequest};
use crate::rpc::{ConnectionEvent, FrameObserver, Incoming, RpcConnection, RpcError, Transport};
use crate::{AppError, Result};

/// How long the process must survive after spawning to count as started.
const STARTUP_CHECK_DELAY: Duration = Duration::from_millis(100);

/// Budget of the `--version` query.
const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Budget of [`CodexConnection::ping`].
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Stderr bytes quoted in a startup failure.
const STDERR_QUOTE_CHARS: usize = 500;

/// Message for a Codex CLI that is not installed.
pub const COMMAND_NOT_FOUND_MESSAGE: &str =
    "Codex command not found. Please verify the Codex CLI is installed and the path is correct.";

/// Decision sent back for a role-reversed approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElicitationDecision {
    /// Run it.
    Approved,
    /// Run it and stop asking this session.
    ApprovedForSession,
    /// Do not run it.
    Denied,
    /// Abort the turn.
    Abort,
}

type ElicitationMap = Arc<Mutex<HashMap<String, Value>>>;

/// One Codex MCP server process.
pub struct CodexConnection {
    inner: RpcConnection,
    elicitations: ElicitationMap,
    version: Mutex<Option<String>>,
}

impl CodexConnection {
    /// Create an idle connection reporting to `events`.
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        let elicitations: ElicitationMap = Arc::default();
        let observer: FrameObserver = {
            let elicitations = Arc::clone(&elicitations);
            Arc::new(move |frame: &Incoming| capture_elicitation(&elicitations, frame))
        };
        Self {
            inner: RpcConnection::with_observer("codex", events, Some(observer)),
            elicitations,
            version: Mutex::new(None),
        }
    }

    /// Spawn Codex for `config` and check that it survives startup.
    ///
    /// Without configured args the MCP subcommand is picked from
    /// `<command> --version`.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] when no command is configured.
    /// - [`AppError::CommandNotFound`] when the executable is missing,
    ///   including a shell exit with code 127 during startup.
    /// - [`AppError::Process`] when the process fails to start or exits
    ///   during startup.
    pub async fn start(&self, config: &AgentConfig, launch: &LaunchOptions) -> Result<Transport> {
        let Some(command) = config.trimmed_command() else {
            self.stop().await;
            return Err(AppError::Config(format!(
                "Command not configured for agent \"{}\" ({}). Please configure the agent command in settings.",
                config.display_name, config.id
            )));
        };

        let args = if config.args.is_empty() {
            let version = detect_version(command).await;
            let args = mcp_subcommand(version.as_ref().map(|v| (v.major, v.minor)));
            *self.lock_version() = version.map(|v| v.text);
            args
        } else {
            config.args.clone()
        };

        let mut env = config.env.clone();
        env.insert("CODEX_NO_INTERACTIVE".into(), "1".into());
        env.insert("CODEX_AUTO_CONTINUE".into(), "1".into());

        let label = config.label();
        let prepared = prepare_command(command, &args, &config.working_directory, &env, launch);
        info!(
            agent = %label,
            command = %prepared.spec.command,
            args = ?prepared.spec.args,
            version = ?self.version(),
            "starting codex mcp server"
        );

        self.elicitations_lock().clear();
        let transport = self
            .inner
            .spawn(
                SpawnRequest {
                    label: &label,
                    command: &prepared.spec,
                    cwd: &config.working_directory,
                    env: &prepared.env,
                    native_shell: launch.needs_native_shell(),
                },
                CodexFramer::new(),
            )
            .await
            .map_err(|err| {
                if matches!(err, AppError::CommandNotFound(_)) {
                    err
                } else {
                    AppError::Process(format!("Failed to start codex process: {err}"))
                }
            })?;

        tokio::time::sleep(STARTUP_CHECK_DELAY).await;
        self.check_started(transport, command)?;
        Ok(transport)
    }

    fn check_started(&self, transport: Transport, command: &str) -> Result<()> {
        if self.inner.is_current(transport.generation) {
            return Ok(());
        }
        let exit = self
            .inner
            .last_exit()
            .filter(|exit| exit.generation == transport.generation);
        match exit {
            Some(exit) if exit.is_command_not_found() => {
                Err(AppError::CommandNotFound(command.to_owned()))
            }
            Some(exit) => Err(AppError::Process(startup_failure_message(
                &exit,
                &self.inner.stderr_tail(),
            ))),
            None => Err(AppError::Process(
                "Codex process failed to start or exited during startup".into(),
            )),
        }
    }

    /// Bind to an already-running server's stdio.
    pub async fn attach_streams<R, W>(&self, stdout: R, stdin: W) -> Transport
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.elicitations_lock().clear();
        self.inner
            .attach_streams(stdout, stdin, CodexFramer::new())
            .await
    }

    /// Send a request.
    ///
    /// # Errors
    ///
    /// See [`RpcConnection::request`].
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.inner.request(method, params, timeout).await
    }

    /// Send a fire-and-forget notification.
    ///
    /// # Errors
    ///
    /// See [`RpcConnection::notify`].
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.inner.notify(method, params).await
    }

    /// Answer an arbitrary server request.
    ///
    /// # Errors
    ///
    /// See [`RpcConnection::respond`].
    pub async fn respond(&self, id: &Value, outcome: std::result::Result<Value, RpcError>) -> Result<()> {
        self.inner.respond(id, outcome).await
    }

    /// Answer the approval request recorded for `call_id`.
    ///
    /// Returns `false` when no request is recorded, e.g. because it was
    /// already answered.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConnectionClosed`] when the server is gone.
    pub async fn respond_elicitation(&self, call_id: &str, decision: ElicitationDecision) -> Result<bool> {
        let normalized = normalize_call_id(call_id);
        let rpc_id = {
            let mut map = self.elicitations_lock();
            let by_normalized = map.remove(normalized);
            let by_raw = map.remove(call_id);
            by_normalized.or(by_raw)
        };
        let Some(rpc_id) = rpc_id else {
            debug!(call_id, "no pending elicitation for call id");
            return Ok(false);
        };

        debug!(call_id, %rpc_id, ?decision, "answering codex elicitation");
        self.inner
            .respond(&rpc_id, Ok(json!({ "decision": decision })))
            .await?;
        Ok(true)
    }

    /// Whether the server answers `ping` within five seconds.
    pub async fn ping(&self) -> bool {
        self.inner.request("ping", json!({}), PING_TIMEOUT).await.is_ok()
    }

    /// Kill the server, fail outstanding requests and forget recorded
    /// elicitations. Idempotent.
    pub async fn stop(&self) {
        self.inner.disconnect().await;
        self.elicitations_lock().clear();
    }

    /// Forget recorded elicitations without touching the process.
    pub fn clear_elicitations(&self) {
        self.elicitations_lock().clear();
    }

    /// Whether a server is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Number of recorded, unanswered elicitations.
    #[must_use]
    pub fn pending_elicitations(&self) -> usize {
        self.elicitations_lock().len()
    }

    /// Requests awaiting an answer.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.pending_requests()
    }

    /// Version reported by the last `--version` query.
    #[must_use]
    pub fn version(&self) -> Option<String> {
        self.lock_version().clone()
    }

    fn lock_version(&self) -> MutexGuard<'_, Option<String>> {
        self.version.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn elicitations_lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.elicitations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CodexConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodexConnection")
            .field("inner", &self.inner)
            .field("elicitations", &self.pending_elicitations())
            .finish_non_exhaustive()
    }
}

// ── Elicitation capture ───────────────────────────────────────────────────────

fn capture_elicitation(map: &ElicitationMap, frame: &Incoming) {
    let Incoming::Request { id, method, params } = frame else {
        return;
    };

    let call_id = if method.ends_with(ELICITATION_SUFFIX) {
        Some(elicitation_call_id(params, id))
    } else if method == EVENT_METHOD {
        match CodexEvent::from_params(params) {
            Some(CodexEvent::ExecApproval(exec)) => Some(exec.call_id),
            Some(CodexEvent::PatchApproval(patch)) => Some(patch.call_id),
            Some(CodexEvent::OptionApproval(approval)) => Some(approval.call_id),
            _ => None,
        }
    } else {
        None
    };

    if let Some(call_id) = call_id.filter(|call_id| !call_id.is_empty()) {
        let key = normalize_call_id(&call_id).to_owned();
        debug!(call_id, %id, "recorded codex approval request");
        map.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, id.clone());
    }
}

// ── Version query ─────────────────────────────────────────────────────────────

/// A `major.minor.patch` version found in `--version` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliVersion {
    /// Major.
    pub major: u64,
    /// Minor.
    pub minor: u64,
    /// Patch.
    pub patch: u64,
    /// The matched text.
    pub text: String,
}

/// First `x.y.z` in `output`.
#[must_use]
pub fn parse_version(output: &str) -> Option<CliVersion> {
    let pattern = Regex::new(r"(\d+)\.(\d+)\.(\d+)").ok()?;
    let captures = pattern.captures(output)?;
    Some(CliVersion {
        major: captures.get(1)?.as_str().parse().ok()?,
        minor: captures.get(2)?.as_str().parse().ok()?,
        patch: captures.get(3)?.as_str().parse().ok()?,
        text: captures.get(0)?.as_str().to_owned(),
    })
}

/// MCP server subcommand for a CLI `(major, minor)` version.
///
/// 0.40 renamed `mcp serve` to `mcp-server`; unknown versions get the new
/// name.
#[must_use]
pub fn mcp_subcommand(version: Option<(u64, u64)>) -> Vec<String> {
    match version {
        Some((0, minor)) if minor < 40 => vec!["mcp".into(), "serve".into()],
        _ => vec!["mcp-server".into()],
    }
}

async fn detect_version(command: &str) -> Option<CliVersion> {
    let mut cmd = Command::new(command);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    if let Some(dir) = Path::new(command).parent().filter(|dir| dir.is_dir()) {
        cmd.current_dir(dir);
    }

    match tokio::time::timeout(VERSION_QUERY_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => {
            let version = parse_version(&String::from_utf8_lossy(&output.stdout));
            debug!(command, version = ?version.as_ref().map(|v| v.text.as_str()), "codex version query");
            version
        }
        Ok(Err(err)) => {
            debug!(command, %err, "codex version query failed");
            None
        }
        Err(_) => {
            warn!(command, "codex version query timed out");
            None
        }
    }
}

/// Text reported when Codex exits during startup.
#[must_use]
pub fn startup_failure_message(exit: &ProcessExit, stderr: &str) -> String {
    let stderr: String = stderr.trim().chars().take(STDERR_QUOTE_CHARS).collect();
    match (exit.code, exit.signal) {
        (Some(127), _) => COMMAND_NOT_FOUND_MESSAGE.to_owned(),
        (Some(code), _) if code != 0 => {
            if stderr.is_empty() {
                format!("Codex process exited with code {code}")
            } else {
                format!("Codex process exited with code {code}: {stderr}")
            }
        }
        (_, Some(signal)) => format!("Codex process was killed by signal {signal}"),
        _ if stderr.is_empty() => "Codex process failed to start or exited during startup".into(),
        _ => format!("Codex process failed to start or exited during startup: {stderr}"),
    }
}
