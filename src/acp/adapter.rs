//! ACP implementation of [`AgentClient`].
//!
//! The adapter owns one [`AcpConnection`], the permission handler and the
//! terminal manager. A single pump task consumes the connection's events in
//! arrival order:
//!
//! - `session/update` notifications go through the translator;
//! - `session/request_permission` requests are queued and answered once the
//!   user (or the auto-approval policy) decides;
//! - `fs/*` and `terminal/*` requests are served locally;
//! - a transport close is classified into an [`AgentError`] and tears down
//!   local permission and terminal state.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::AcpConnection;
use super::permission::{response_payload, AcpPermissionHandler};
use super::schema::{
    AuthenticateParams, CancelParams, CreateTerminalParams, NewSessionParams, NewSessionResponse,
    PromptParams, RequestPermissionParams, SetModeParams, SetModelParams, TerminalParams,
};
use super::translator::translate_notification;
use crate::config::Settings;
use crate::driver::{with_timeout, AgentClient, ClientEvent, ClientFuture};
use crate::errors::TimeoutStep;
use crate::models::{
    AgentConfig, AgentError, ErrorCategory, InitializeResult, NewSessionResult, PromptContent,
};
use crate::platform::wsl::convert_windows_path_to_wsl;
use crate::process::ProcessExit;
use crate::rpc::{CloseReason, ConnectionErrorKind, ConnectionEvent, RpcError};
use crate::terminal::{TerminalManager, TerminalRequest};
use crate::{AppError, Result};

type Reply = std::result::Result<Value, RpcError>;

struct Inner {
    settings: Settings,
    connection: AcpConnection,
    permissions: AcpPermissionHandler,
    terminals: TerminalManager,
    updates: mpsc::UnboundedSender<ClientEvent>,
    config: Mutex<Option<AgentConfig>>,
}

/// ACP agent client.
pub struct AcpAdapter {
    inner: Arc<Inner>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl AcpAdapter {
    /// Create an adapter that reports to `updates`.
    #[must_use]
    pub fn new(settings: Settings, updates: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            connection: AcpConnection::new(events_tx),
            permissions: AcpPermissionHandler::new(settings.auto_approve, updates.clone()),
            terminals: TerminalManager::new(
                settings.launch.clone(),
                settings.timeouts.terminal_release_grace(),
            ),
            updates,
            config: Mutex::new(None),
            settings,
        };
        Self {
            inner: Arc::new(inner),
            events: Mutex::new(Some(events_rx)),
            pump: Mutex::new(None),
        }
    }

    /// The underlying connection, e.g. to attach in-memory streams.
    #[must_use]
    pub fn connection(&self) -> &AcpConnection {
        &self.inner.connection
    }

    /// Terminals started on behalf of the agent.
    #[must_use]
    pub fn terminals(&self) -> &TerminalManager {
        &self.inner.terminals
    }

    /// Queued permission request ids, active first.
    #[must_use]
    pub fn queued_permissions(&self) -> Vec<String> {
        self.inner.permissions.queued_request_ids()
    }

    /// Record `config` as current without spawning anything, for callers
    /// that attach streams themselves.
    pub fn set_config(&self, config: AgentConfig) {
        self.start_pump();
        *self.inner.lock_config() = Some(config);
    }

    /// Start the event pump once, on the first call.
    fn start_pump(&self) {
        let Some(events) = self
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        let handle = tokio::spawn(run_pump(Arc::downgrade(&self.inner), events));
        *self.pump.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    async fn initialize_inner(&self, config: AgentConfig) -> Result<InitializeResult> {
        self.start_pump();
        let inner = &self.inner;
        inner.teardown().await;
        *inner.lock_config() = Some(config.clone());

        if let Err(err) = inner.connection.start(&config, &inner.settings.launch).await {
            inner.report_start_failure(&config, &err);
            return Err(err);
        }

        let handshake = inner.settings.handshake_for(&config.id);
        let result = inner.connection.initialize(handshake.initialize).await;
        if let Err(err) = &result {
            if err.is_timeout() {
                inner.teardown().await;
            }
        }
        result
    }

    async fn new_session_inner(&self, working_directory: &Path) -> Result<NewSessionResult> {
        let inner = &self.inner;
        let config = inner.require_connection()?;

        let cwd = if inner.settings.launch.uses_wsl() {
            convert_windows_path_to_wsl(&working_directory.to_string_lossy())
        } else {
            working_directory.to_string_lossy().into_owned()
        };
        let params = serde_json::to_value(NewSessionParams {
            cwd,
            mcp_servers: Vec::new(),
        })?;

        let timeout = inner.settings.handshake_for(&config.id).new_session;
        let raw = match with_timeout(
            TimeoutStep::NewSession,
            timeout,
            inner.connection.request("session/new", params, timeout),
        )
        .await
        {
            Ok(raw) => raw,
            Err(err) => {
                if err.is_timeout() {
                    warn!(agent = %config.id, timeout_ms = timeout.as_millis(), "session/new timed out, disconnecting");
                    inner.teardown().await;
                }
                return Err(err);
            }
        };

        let response: NewSessionResponse = serde_json::from_value(raw)?;
        info!(agent = %config.id, session_id = %response.session_id, "acp session created");
        Ok(NewSessionResult {
            session_id: response.session_id,
            modes: response.modes,
            models: response.models,
        })
    }

    async fn send_prompt_inner(&self, session_id: &str, content: Vec<PromptContent>) -> Result<()> {
        let inner = &self.inner;
        inner.require_connection()?;
        let params = serde_json::to_value(PromptParams {
            session_id,
            prompt: &content,
        })?;

        match inner
            .connection
            .request("session/prompt", params, inner.settings.timeouts.prompt())
            .await
        {
            Ok(result) => {
                debug!(session_id, stop_reason = ?result.get("stopReason"), "prompt turn finished");
                Ok(())
            }
            Err(AppError::Timeout { after, .. }) => {
                info!(session_id, after_ms = after.as_millis(), "prompt still running after budget, stream may continue");
                Ok(())
            }
            Err(AppError::Rpc(err)) if err.is_ignorable() => {
                debug!(session_id, %err, "ignoring benign prompt error");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn cancel_inner(&self, session_id: &str) -> Result<()> {
        let inner = &self.inner;
        if inner.connection.is_connected() {
            let params = serde_json::to_value(CancelParams { session_id })?;
            if let Err(err) = inner.connection.notify("session/cancel", params).await {
                warn!(session_id, %err, "session/cancel failed");
            }
        }
        let cancelled = inner.permissions.cancel_all();
        inner.terminals.kill_all();
        info!(session_id, cancelled, "turn cancelled");
        Ok(())
    }

    async fn authenticate_inner(&self, method_id: &str) -> Result<bool> {
        let inner = &self.inner;
        inner.require_connection()?;
        let params = serde_json::to_value(AuthenticateParams { method_id })?;
        match inner
            .connection
            .request("authenticate", params, inner.settings.timeouts.request())
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                warn!(method_id, %err, "authentication failed");
                Ok(false)
            }
        }
    }

    async fn session_request(&self, method: &str, params: Value) -> Result<()> {
        let inner = &self.inner;
        inner.require_connection()?;
        inner
            .connection
            .request(method, params, inner.settings.timeouts.request())
            .await
            .map(drop)
    }
}

impl AgentClient for AcpAdapter {
    fn initialize(&self, config: AgentConfig) -> ClientFuture<'_, InitializeResult> {
        Box::pin(self.initialize_inner(config))
    }

    fn new_session(&self, working_directory: &Path) -> ClientFuture<'_, NewSessionResult> {
        let working_directory = working_directory.to_path_buf();
        Box::pin(async move { self.new_session_inner(&working_directory).await })
    }

    fn authenticate(&self, method_id: &str) -> ClientFuture<'_, bool> {
        let method_id = method_id.to_owned();
        Box::pin(async move { self.authenticate_inner(&method_id).await })
    }

    fn send_prompt(&self, session_id: &str, content: Vec<PromptContent>) -> ClientFuture<'_, ()> {
        let session_id = session_id.to_owned();
        Box::pin(async move { self.send_prompt_inner(&session_id, content).await })
    }

    fn cancel(&self, session_id: &str) -> ClientFuture<'_, ()> {
        let session_id = session_id.to_owned();
        Box::pin(async move { self.cancel_inner(&session_id).await })
    }

    fn respond_to_permission(&self, request_id: &str, option_id: &str) -> ClientFuture<'_, ()> {
        if !self.inner.permissions.respond(request_id, option_id) {
            debug!(request_id, "permission response for unknown request ignored");
        }
        Box::pin(async { Ok(()) })
    }

    fn set_session_mode(&self, session_id: &str, mode_id: &str) -> ClientFuture<'_, ()> {
        let params = serde_json::to_value(SetModeParams { session_id, mode_id });
        Box::pin(async move { self.session_request("session/set_mode", params?).await })
    }

    fn set_session_model(&self, session_id: &str, model_id: &str) -> ClientFuture<'_, ()> {
        let params = serde_json::to_value(SetModelParams {
            session_id,
            model_id,
        });
        Box::pin(async move { self.session_request("session/set_model", params?).await })
    }

    fn disconnect(&self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            self.inner.teardown().await;
            *self.inner.lock_config() = None;
            Ok(())
        })
    }

    fn is_initialized(&self) -> bool {
        self.inner.connection.is_connected()
    }

    fn current_agent_id(&self) -> Option<String> {
        self.inner.lock_config().as_ref().map(|config| config.id.clone())
    }
}

impl Drop for AcpAdapter {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
        self.inner.permissions.cancel_all();
        self.inner.terminals.kill_all();
    }
}

impl std::fmt::Debug for AcpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcpAdapter")
            .field("connection", &self.inner.connection)
            .field("agent", &self.current_agent_id())
            .finish_non_exhaustive()
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

impl Inner {
    fn lock_config(&self) -> MutexGuard<'_, Option<AgentConfig>> {
        self.config.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn agent_id(&self) -> Option<String> {
        self.lock_config().as_ref().map(|config| config.id.clone())
    }

    fn require_connection(&self) -> Result<AgentConfig> {
        let config = self
            .lock_config()
            .clone()
            .ok_or_else(|| AppError::NotInitialized("Not initialized. Call initialize() first.".into()))?;
        if !self.connection.is_connected() {
            return Err(AppError::NotInitialized(format!(
                "agent {} is not connected",
                config.id
            )));
        }
        Ok(config)
    }

    /// Cancel permissions, kill terminals and the agent. Keeps the config.
    async fn teardown(&self) {
        self.permissions.cancel_all();
        self.terminals.kill_all();
        self.connection.disconnect().await;
    }

    fn emit_error(&self, error: AgentError) {
        warn!(title = %error.title, message = %error.message, "agent error");
        if self.updates.send(ClientEvent::Error(error)).is_err() {
            debug!("client event receiver dropped");
        }
    }

    fn report_start_failure(&self, config: &AgentConfig, err: &AppError) {
        let label = config.label();
        let error = match err {
            AppError::CommandNotFound(_) => AgentError::command_not_found(
                config.command.trim(),
                &label,
                self.settings.launch.platform,
            ),
            AppError::Process(message) => AgentError::new(
                ErrorCategory::Connection,
                "Agent Startup Error",
                format!("Failed to start {label}: {message}"),
            )
            .with_suggestion("Please check the agent configuration in settings."),
            _ => return,
        };
        self.emit_error(error.with_agent(Some(config.id.clone())));
    }

    fn on_closed(&self, reason: &CloseReason) {
        let cancelled = self.permissions.cancel_all();
        self.terminals.kill_all();

        let config = self.lock_config().clone();
        match reason {
            CloseReason::Exited(exit) => {
                info!(agent = ?config.as_ref().map(|c| c.id.as_str()), %exit, cancelled, "acp agent exited");
                if let Some(error) = config.as_ref().and_then(|config| classify_exit(config, exit, &self.settings)) {
                    self.emit_error(error);
                }
            }
            CloseReason::StreamEnded => {
                info!(cancelled, "acp agent stream ended");
            }
        }
    }

    fn on_transport_error(&self, kind: ConnectionErrorKind, message: String) {
        let (category, title) = match kind {
            ConnectionErrorKind::Timeout => (ErrorCategory::Timeout, "Agent Timeout"),
            ConnectionErrorKind::Stream => (ErrorCategory::Connection, "Agent Connection Error"),
        };
        self.emit_error(AgentError::new(category, title, message).with_agent(self.agent_id()));
    }

    /// Handle an agent request. Permission requests are queued before
    /// this returns so their UI update keeps its place in the stream.
    fn dispatch_request(self: &Arc<Self>, id: Value, method: String, params: Value) {
        if method == "session/request_permission" {
            let ticket = match parse::<RequestPermissionParams>(params) {
                Ok(request) => Ok(self.permissions.receive(request)),
                Err(err) => Err(err),
            };
            let weak = Arc::downgrade(self);
            tokio::spawn(async move {
                let reply = match ticket {
                    Ok(ticket) => Ok(response_payload(ticket.outcome().await)),
                    Err(err) => Err(err),
                };
                if let Some(inner) = weak.upgrade() {
                    inner.reply(&id, reply).await;
                }
            });
            return;
        }

        // wait_for_exit can block for as long as the command runs.
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let reply = inner.serve(&method, params).await;
            inner.reply(&id, reply).await;
        });
    }

    async fn serve(&self, method: &str, params: Value) -> Reply {
        match method {
            "fs/read_text_file" => Ok(json!({ "content": "" })),
            "fs/write_text_file" => Ok(json!({})),
            "terminal/create" => parse(params).map(|params| self.create_terminal(params)),
            "terminal/output" => {
                let params: TerminalParams = parse(params)?;
                let output = self
                    .terminals
                    .output(&params.terminal_id)
                    .ok_or_else(|| terminal_not_found(&params.terminal_id))?;
                to_reply(&output)
            }
            "terminal/wait_for_exit" => {
                let params: TerminalParams = parse(params)?;
                let status = self
                    .terminals
                    .wait_for_exit(&params.terminal_id)
                    .await
                    .map_err(|_| terminal_not_found(&params.terminal_id))?;
                to_reply(&status)
            }
            "terminal/kill" => {
                let params: TerminalParams = parse(params)?;
                if self.terminals.kill(&params.terminal_id) {
                    Ok(json!({}))
                } else {
                    Err(terminal_not_found(&params.terminal_id))
                }
            }
            "terminal/release" => {
                let params: TerminalParams = parse(params)?;
                if !self.terminals.release(&params.terminal_id) {
                    debug!(terminal_id = %params.terminal_id, "terminal already released");
                }
                Ok(json!({}))
            }
            other => {
                debug!(method = other, "unsupported agent request");
                Err(RpcError::method_not_found(other))
            }
        }
    }

    fn create_terminal(&self, params: CreateTerminalParams) -> Value {
        let cwd = params
            .cwd
            .filter(|cwd| !cwd.is_empty())
            .map(Into::into)
            .or_else(|| self.lock_config().as_ref().map(|config| config.working_directory.clone()));
        let terminal_id = self.terminals.create(TerminalRequest {
            command: params.command,
            args: params.args,
            env: params.env.into_iter().map(|var| (var.name, var.value)).collect(),
            cwd,
            output_byte_limit: params.output_byte_limit,
        });
        json!({ "terminalId": terminal_id })
    }

    async fn reply(&self, id: &Value, reply: Reply) {
        if let Err(err) = self.connection.respond(id, reply).await {
            debug!(%id, %err, "could not answer agent request");
        }
    }
}

/// Error to show for an agent that exited on its own, if any.
fn classify_exit(config: &AgentConfig, exit: &ProcessExit, settings: &Settings) -> Option<AgentError> {
    let error = if exit.is_command_not_found() {
        AgentError::command_not_found(config.command.trim(), &config.label(), settings.launch.platform)
    } else if exit.is_failure() {
        AgentError::new(
            ErrorCategory::Connection,
            "Agent Exited",
            format!("{} stopped unexpectedly: {exit}", config.label()),
        )
    } else {
        return None;
    };
    Some(error.with_agent(Some(config.id.clone())).with_code(exit.code))
}

fn parse<T: DeserializeOwned>(params: Value) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params).map_err(RpcError::invalid_params)
}

fn to_reply<T: serde::Serialize>(value: &T) -> Reply {
    serde_json::to_value(value).map_err(|err| RpcError::internal(err.to_string()))
}

fn terminal_not_found(terminal_id: &str) -> RpcError {
    RpcError::internal(format!("Terminal {terminal_id} not found"))
}

// ── Pump ──────────────────────────────────────────────────────────────────────

async fn run_pump(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = inner.upgrade() else {
            break;
        };
        match event {
            ConnectionEvent::Notification { method, params } => {
                if method != "session/update" {
                    debug!(%method, "ignoring agent notification");
                    continue;
                }
                if let Some(update) = translate_notification(params) {
                    if shared.updates.send(ClientEvent::SessionUpdate(update)).is_err() {
                        debug!("client event receiver dropped");
                    }
                }
            }
            ConnectionEvent::Request { id, method, params } => {
                shared.dispatch_request(id, method, params);
            }
            ConnectionEvent::Error { kind, message } => shared.on_transport_error(kind, message),
            ConnectionEvent::Closed(reason) => shared.on_closed(&reason),
        }
    }
    debug!(agent = ?inner.upgrade().and_then(|shared| shared.agent_id()), "acp event pump stopped");
}
