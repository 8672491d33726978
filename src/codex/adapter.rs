//! Codex implementation of [`AgentClient`].
//!
//! Codex exposes a conversation as two MCP tools: `codex` starts one,
//! `codex-reply` continues it. A session id is therefore minted locally by
//! [`new_session`](AgentClient::new_session) and only reaches Codex with
//! the first prompt.
//!
//! The pump task turns `codex/event` traffic into session updates and
//! approval requests. Approvals are answered either by an
//! `apply_patch_approval_response` request or by responding to the
//! recorded role-reversed request.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{CodexConnection, ElicitationDecision, COMMAND_NOT_FOUND_MESSAGE};
use super::events::{elicitation_call_id, CodexEvent, ELICITATION_SUFFIX, EVENT_METHOD};
use super::permission::{
    ApprovalRoute, CodexAdmission, CodexApproval, CodexPermissionHandler, CodexPermissionRequest,
    Decision,
};
use crate::config::Settings;
use crate::driver::{with_timeout, AgentClient, ClientEvent, ClientFuture};
use crate::errors::TimeoutStep;
use crate::models::{
    AgentConfig, AgentError, ErrorCategory, InitializeResult, NewSessionResult,
    PromptCapabilities, PromptContent,
};
use crate::permission::normalize_options;
use crate::platform::wsl::convert_windows_path_to_wsl;
use crate::process::ProcessExit;
use crate::rpc::{CloseReason, ConnectionErrorKind, ConnectionEvent, RpcError};
use crate::{AppError, Result};

/// Budget of the `tools/list` readiness check.
const TOOLS_LIST_TIMEOUT: Duration = Duration::from_secs(15);

/// Budget of `apply_patch_approval_response`.
const PATCH_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Session id used when neither Codex nor the caller supplied one.
const FALLBACK_SESSION_ID: &str = "codex";

const ERROR_SUGGESTION: &str = "Please check Codex CLI authentication and network connectivity.";
const NOT_FOUND_SUGGESTION: &str =
    "Please set the Codex CLI path in settings (use \"which codex\" or \"where codex\"), then reload.";

#[derive(Debug, Default)]
struct SessionState {
    config: Option<AgentConfig>,
    session_id: Option<String>,
    working_directory: Option<PathBuf>,
    started: bool,
}

struct Inner {
    settings: Settings,
    connection: CodexConnection,
    permissions: CodexPermissionHandler,
    updates: mpsc::UnboundedSender<ClientEvent>,
    state: Mutex<SessionState>,
}

/// Codex MCP agent client.
pub struct CodexAdapter {
    inner: Arc<Inner>,
    events: Mutex<Option<mpsc::UnboundedReceiver<ConnectionEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl CodexAdapter {
    /// Create an adapter that reports to `updates`.
    #[must_use]
    pub fn new(settings: Settings, updates: mpsc::UnboundedSender<ClientEvent>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Inner {
            connection: CodexConnection::new(events_tx),
            permissions: CodexPermissionHandler::new(settings.auto_approve, updates.clone()),
            updates,
            state: Mutex::new(SessionState::default()),
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
    pub fn connection(&self) -> &CodexConnection {
        &self.inner.connection
    }

    /// Queued permission request ids, active first.
    #[must_use]
    pub fn queued_permissions(&self) -> Vec<String> {
        self.inner.permissions.queued_request_ids()
    }

    /// Current conversation id, as last set by `new_session` or Codex.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.lock_state().session_id.clone()
    }

    /// Record `config` as current without spawning anything, for callers
    /// that attach streams themselves.
    pub fn set_config(&self, config: AgentConfig) {
        self.start_pump();
        *self.inner.lock_state() = SessionState {
            config: Some(config),
            ..SessionState::default()
        };
    }

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
        *inner.lock_state() = SessionState {
            config: Some(config.clone()),
            ..SessionState::default()
        };

        if let Err(err) = inner.connection.start(&config, &inner.settings.launch).await {
            inner.report_start_failure(&config, &err);
            return Err(err);
        }

        // The server answers tools/list and tools/call only, so listing the
        // tools doubles as the readiness check.
        let handshake = inner.settings.handshake_for(&config.id);
        let ready = with_timeout(
            TimeoutStep::Initialize,
            handshake.initialize,
            inner
                .connection
                .request("tools/list", json!({}), TOOLS_LIST_TIMEOUT),
        )
        .await;
        if let Err(err) = ready {
            if err.is_timeout() {
                warn!(agent = %config.id, "codex tools/list timed out, disconnecting");
                inner.teardown().await;
            }
            return Err(err);
        }

        info!(agent = %config.id, version = ?inner.connection.version(), "codex ready");
        Ok(InitializeResult {
            protocol_version: 1,
            auth_methods: Vec::new(),
            prompt_capabilities: PromptCapabilities::default(),
        })
    }

    fn new_session_inner(&self, working_directory: &Path) -> Result<NewSessionResult> {
        self.inner.require_connection()?;
        let session_id = Uuid::new_v4().to_string();
        {
            let mut state = self.inner.lock_state();
            state.session_id = Some(session_id.clone());
            state.working_directory = Some(working_directory.to_path_buf());
            state.started = false;
        }
        info!(session_id, "codex session prepared");
        Ok(NewSessionResult {
            session_id,
            modes: None,
            models: None,
        })
    }

    async fn send_prompt_inner(&self, session_id: &str, content: &[PromptContent]) -> Result<()> {
        let inner = &self.inner;
        let config = inner.require_connection()?;
        let prompt = prompt_text(content);

        let (started, working_directory) = {
            let state = inner.lock_state();
            (state.started, state.working_directory.clone())
        };
        let params = if started {
            json!({
                "name": "codex-reply",
                "arguments": { "prompt": prompt, "conversationId": session_id },
            })
        } else {
            let cwd = working_directory.unwrap_or(config.working_directory);
            let cwd = if inner.settings.launch.uses_wsl() {
                convert_windows_path_to_wsl(&cwd.to_string_lossy())
            } else {
                cwd.to_string_lossy().into_owned()
            };
            json!({
                "name": "codex",
                "arguments": { "prompt": prompt, "cwd": cwd, "sandbox": "workspace-write" },
                "config": { "conversationId": session_id },
            })
        };

        match inner
            .connection
            .request("tools/call", params, inner.settings.timeouts.prompt())
            .await
        {
            Ok(_) => {
                debug!(session_id, "codex turn finished");
            }
            Err(AppError::Timeout { after, .. }) => {
                // Already reported on the event channel.
                info!(session_id, after_ms = after.as_millis(), "codex turn still running after budget, stream may continue");
            }
            Err(err) => return Err(err),
        }
        inner.lock_state().started = true;
        Ok(())
    }

    async fn cancel_inner(&self, session_id: &str) {
        let inner = &self.inner;
        let cancelled = inner.permissions.cancel_all();
        let count = cancelled.len();
        if inner.connection.is_connected() {
            for approval in cancelled {
                inner.abort(approval).await;
            }
        }
        info!(session_id, cancelled = count, "codex turn cancelled locally");
    }
}

impl AgentClient for CodexAdapter {
    fn initialize(&self, config: AgentConfig) -> ClientFuture<'_, InitializeResult> {
        Box::pin(self.initialize_inner(config))
    }

    fn new_session(&self, working_directory: &Path) -> ClientFuture<'_, NewSessionResult> {
        let result = self.new_session_inner(working_directory);
        Box::pin(async move { result })
    }

    fn authenticate(&self, _method_id: &str) -> ClientFuture<'_, bool> {
        Box::pin(async { Ok(true) })
    }

    fn send_prompt(&self, session_id: &str, content: Vec<PromptContent>) -> ClientFuture<'_, ()> {
        let session_id = session_id.to_owned();
        Box::pin(async move { self.send_prompt_inner(&session_id, &content).await })
    }

    fn cancel(&self, session_id: &str) -> ClientFuture<'_, ()> {
        let session_id = session_id.to_owned();
        Box::pin(async move {
            self.cancel_inner(&session_id).await;
            Ok(())
        })
    }

    fn respond_to_permission(&self, request_id: &str, option_id: &str) -> ClientFuture<'_, ()> {
        let decision = self.inner.permissions.respond(request_id, option_id);
        if decision.is_none() {
            debug!(request_id, "permission response for unknown request ignored");
        }
        Box::pin(async move {
            let Some(decision) = decision else {
                return Ok(());
            };
            self.inner.deliver(decision).await
        })
    }

    fn set_session_mode(&self, _session_id: &str, _mode_id: &str) -> ClientFuture<'_, ()> {
        Box::pin(async {
            Err(AppError::Unsupported(
                "Codex does not support session modes".into(),
            ))
        })
    }

    fn set_session_model(&self, _session_id: &str, _model_id: &str) -> ClientFuture<'_, ()> {
        Box::pin(async {
            Err(AppError::Unsupported(
                "Codex does not support session models".into(),
            ))
        })
    }

    fn disconnect(&self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            self.inner.teardown().await;
            *self.inner.lock_state() = SessionState::default();
            Ok(())
        })
    }

    fn is_initialized(&self) -> bool {
        self.inner.connection.is_connected()
    }

    fn current_agent_id(&self) -> Option<String> {
        self.inner.agent_id()
    }
}

impl Drop for CodexAdapter {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
        self.inner.permissions.cancel_all();
    }
}

impl std::fmt::Debug for CodexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodexAdapter")
            .field("connection", &self.inner.connection)
            .field("state", &*self.inner.lock_state())
            .finish_non_exhaustive()
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn agent_id(&self) -> Option<String> {
        self.lock_state().config.as_ref().map(|config| config.id.clone())
    }

    /// Session id for updates: Codex's, else the agent id, else `codex`.
    fn update_session_id(&self) -> String {
        let state = self.lock_state();
        state
            .session_id
            .clone()
            .or_else(|| state.config.as_ref().map(|config| config.id.clone()))
            .unwrap_or_else(|| FALLBACK_SESSION_ID.to_owned())
    }

    fn require_connection(&self) -> Result<AgentConfig> {
        let config = self
            .lock_state()
            .config
            .clone()
            .ok_or_else(|| AppError::NotInitialized("Codex connection not initialized".into()))?;
        if !self.connection.is_connected() {
            return Err(AppError::NotInitialized("Codex connection not initialized".into()));
        }
        Ok(config)
    }

    async fn teardown(&self) {
        self.permissions.cancel_all();
        self.connection.stop().await;
    }

    fn emit(&self, event: ClientEvent) {
        if self.updates.send(event).is_err() {
            debug!("client event receiver dropped");
        }
    }

    fn emit_error(&self, error: AgentError) {
        warn!(title = %error.title, message = %error.message, "codex error");
        self.emit(ClientEvent::Error(error));
    }

    fn report_start_failure(&self, config: &AgentConfig, err: &AppError) {
        let error = match err {
            AppError::CommandNotFound(_) => codex_error(COMMAND_NOT_FOUND_MESSAGE, Some(127)),
            AppError::Process(message) => codex_error(message, None),
            _ => return,
        };
        self.emit_error(error.with_agent(Some(config.id.clone())));
    }

    fn on_closed(&self, reason: &CloseReason) {
        let cancelled = self.permissions.cancel_all().len();
        self.connection.clear_elicitations();
        match reason {
            CloseReason::Exited(exit) => {
                info!(%exit, cancelled, "codex exited");
                if let Some(error) = classify_exit(exit) {
                    self.emit_error(error.with_agent(self.agent_id()));
                }
            }
            CloseReason::StreamEnded => info!(cancelled, "codex stream ended"),
        }
    }

    fn on_transport_error(&self, kind: ConnectionErrorKind, message: &str) {
        let mut error = codex_error(message, None);
        if kind == ConnectionErrorKind::Timeout {
            error.category = ErrorCategory::Timeout;
        }
        self.emit_error(error.with_agent(self.agent_id()));
    }

    /// Send a decision to Codex.
    async fn deliver(&self, decision: Decision) -> Result<()> {
        let Decision { approval, approved } = decision;
        match approval.route {
            ApprovalRoute::Patch { changes } => {
                debug!(call_id = %approval.call_id, approved, "answering codex patch approval");
                self.connection
                    .request(
                        "apply_patch_approval_response",
                        json!({ "call_id": approval.call_id, "approved": approved, "changes": changes }),
                        PATCH_RESPONSE_TIMEOUT,
                    )
                    .await
                    .map(drop)
            }
            ApprovalRoute::Elicitation => {
                let decision = if approved {
                    ElicitationDecision::Approved
                } else {
                    ElicitationDecision::Denied
                };
                self.connection
                    .respond_elicitation(&approval.call_id, decision)
                    .await
                    .map(drop)
            }
        }
    }

    /// Tell Codex a cancelled approval will not be granted.
    async fn abort(&self, approval: CodexApproval) {
        let call_id = approval.call_id.clone();
        let result = match approval.route {
            ApprovalRoute::Elicitation => self
                .connection
                .respond_elicitation(&call_id, ElicitationDecision::Abort)
                .await
                .map(drop),
            ApprovalRoute::Patch { .. } => {
                self.deliver(Decision {
                    approval,
                    approved: false,
                })
                .await
            }
        };
        if let Err(err) = result {
            debug!(call_id, %err, "could not abort codex approval");
        }
    }

    fn handle_event(self: &Arc<Self>, event: CodexEvent) {
        let session_id = self.update_session_id();
        if let Some(update) = event.to_update(&session_id) {
            self.emit(ClientEvent::SessionUpdate(update));
            return;
        }
        let request = match event {
            CodexEvent::SessionConfigured(Some(id)) => {
                debug!(session_id = %id, "codex session configured");
                self.lock_state().session_id = Some(id);
                return;
            }
            CodexEvent::ExecApproval(exec) => CodexPermissionRequest {
                session_id,
                call_id: exec.call_id,
                kind: "execute".into(),
                title: "Exec command".into(),
                options: Vec::new(),
                route: ApprovalRoute::Elicitation,
            },
            CodexEvent::PatchApproval(patch) => CodexPermissionRequest {
                session_id,
                call_id: patch.call_id.clone(),
                kind: "edit".into(),
                title: "Apply patch".into(),
                options: Vec::new(),
                route: ApprovalRoute::Patch {
                    changes: patch.changes(),
                },
            },
            CodexEvent::OptionApproval(approval) => CodexPermissionRequest {
                session_id,
                title: approval.title.unwrap_or_else(|| approval.event_type.clone()),
                call_id: approval.call_id,
                kind: "execute".into(),
                options: normalize_options(&approval.options),
                route: ApprovalRoute::Elicitation,
            },
            CodexEvent::Unknown(event_type) => {
                debug!(event_type, "ignoring codex event");
                return;
            }
            _ => return,
        };
        self.admit(request);
    }

    fn handle_elicitation(self: &Arc<Self>, id: &Value, params: &Value) {
        let call_id = elicitation_call_id(params, id);
        let is_patch = params
            .get("codex_elicitation")
            .and_then(Value::as_str)
            .is_some_and(|kind| kind.contains("patch"));
        let title = params
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map_or_else(
                || if is_patch { "Apply patch" } else { "Exec command" }.to_owned(),
                str::to_owned,
            );
        self.admit(CodexPermissionRequest {
            session_id: self.update_session_id(),
            call_id,
            kind: if is_patch { "edit" } else { "execute" }.into(),
            title,
            options: Vec::new(),
            route: ApprovalRoute::Elicitation,
        });
    }

    fn admit(self: &Arc<Self>, request: CodexPermissionRequest) {
        match self.permissions.receive(request) {
            CodexAdmission::Duplicate => {}
            CodexAdmission::Queued { request_id } => {
                debug!(request_id, "codex approval queued");
            }
            CodexAdmission::Decided(decision) => {
                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    let call_id = decision.approval.call_id.clone();
                    if let Err(err) = inner.deliver(decision).await {
                        warn!(call_id, %err, "could not deliver auto-approval");
                    }
                });
            }
        }
    }

    fn dispatch_request(self: &Arc<Self>, id: Value, method: &str, params: &Value) {
        // `codex/event` requests are never answered directly: approvals are
        // answered once the user decides, through the id the connection
        // recorded, and everything else is treated as a notification.
        if method == EVENT_METHOD {
            if let Some(event) = CodexEvent::from_params(params) {
                self.handle_event(event);
            }
            return;
        }
        if method.ends_with(ELICITATION_SUFFIX) {
            self.handle_elicitation(&id, params);
            return;
        }

        debug!(method, "unsupported codex request");
        let error = RpcError::method_not_found(method);
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.reply(&id, Err(error)).await });
    }

    async fn reply(&self, id: &Value, reply: std::result::Result<Value, RpcError>) {
        if let Err(err) = self.connection.respond(id, reply).await {
            debug!(%id, %err, "could not answer codex request");
        }
    }
}

fn codex_error(message: &str, code: Option<i32>) -> AgentError {
    if code == Some(127) {
        AgentError::new(ErrorCategory::Configuration, "Codex Command Not Found", message)
            .with_suggestion(NOT_FOUND_SUGGESTION)
            .with_code(code)
    } else {
        AgentError::new(ErrorCategory::Connection, "Codex Error", message)
            .with_suggestion(ERROR_SUGGESTION)
            .with_code(code)
    }
}

/// Error to show for a Codex process that exited on its own, if any.
fn classify_exit(exit: &ProcessExit) -> Option<AgentError> {
    if exit.is_command_not_found() {
        Some(codex_error(COMMAND_NOT_FOUND_MESSAGE, exit.code))
    } else if exit.is_failure() {
        Some(codex_error(&format!("Codex process stopped unexpectedly: {exit}"), exit.code))
    } else {
        None
    }
}

/// Flatten prompt blocks into one text prompt; images become placeholders.
#[must_use]
pub fn prompt_text(content: &[PromptContent]) -> String {
    content
        .iter()
        .map(|block| match block {
            PromptContent::Text { text } => text.clone(),
            PromptContent::Image { mime_type, .. } => format!("[Image omitted: {mime_type}]"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Pump ──────────────────────────────────────────────────────────────────────

async fn run_pump(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = inner.upgrade() else {
            break;
        };
        match event {
            ConnectionEvent::Notification { method, params } => {
                if method != EVENT_METHOD {
                    debug!(%method, "ignoring codex notification");
                    continue;
                }
                if let Some(event) = CodexEvent::from_params(&params) {
                    shared.handle_event(event);
                }
            }
            ConnectionEvent::Request { id, method, params } => {
                shared.dispatch_request(id, &method, &params);
            }
            ConnectionEvent::Error { kind, message } => shared.on_transport_error(kind, &message),
            ConnectionEvent::Closed(reason) => shared.on_closed(&reason),
        }
    }
    debug!("codex event pump stopped");
}
