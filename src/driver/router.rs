//! Picks the protocol client for an agent and forwards every call to it.
//!
//! The designated Codex agent id normally speaks Codex's MCP server
//! protocol. The same agent can also be configured with the `codex-acp`
//! bridge binary, in which case it speaks ACP. The decision is a substring
//! match on the configured command, so a renamed bridge binary is routed
//! to the Codex client.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{AgentClient, ClientEvent, ClientFuture};
use crate::acp::AcpAdapter;
use crate::codex::CodexAdapter;
use crate::config::Settings;
use crate::models::{AgentConfig, InitializeResult, NewSessionResult, PromptContent};
use crate::{AppError, Result};

/// Command substring that marks the ACP bridge for Codex.
const CODEX_ACP_MARKER: &str = "codex-acp";

/// Which client serves an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// [`AcpAdapter`].
    Acp,
    /// [`CodexAdapter`].
    Codex,
}

/// Route for `config` given the designated Codex agent id.
#[must_use]
pub fn select_route(config: &AgentConfig, codex_agent_id: &str) -> Route {
    if config.id == codex_agent_id && !config.command.contains(CODEX_ACP_MARKER) {
        Route::Codex
    } else {
        Route::Acp
    }
}

/// Holds at most one active client.
pub struct Router {
    acp: Arc<dyn AgentClient>,
    codex: Arc<dyn AgentClient>,
    codex_agent_id: String,
    active: Mutex<Option<Route>>,
}

impl Router {
    /// Router over two arbitrary clients.
    #[must_use]
    pub fn new(
        acp: Arc<dyn AgentClient>,
        codex: Arc<dyn AgentClient>,
        codex_agent_id: impl Into<String>,
    ) -> Self {
        Self {
            acp,
            codex,
            codex_agent_id: codex_agent_id.into(),
            active: Mutex::new(None),
        }
    }

    /// Router over the built-in adapters, both reporting to `updates`.
    #[must_use]
    pub fn from_settings(settings: &Settings, updates: &mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self::new(
            Arc::new(AcpAdapter::new(settings.clone(), updates.clone())),
            Arc::new(CodexAdapter::new(settings.clone(), updates.clone())),
            settings.codex_agent_id.clone(),
        )
    }

    /// Route of the active client, if any.
    #[must_use]
    pub fn active_route(&self) -> Option<Route> {
        *self.lock_active()
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<Route>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self, route: Route) -> Arc<dyn AgentClient> {
        match route {
            Route::Acp => Arc::clone(&self.acp),
            Route::Codex => Arc::clone(&self.codex),
        }
    }

    fn active_client(&self) -> Result<Arc<dyn AgentClient>> {
        self.active_route()
            .map(|route| self.client(route))
            .ok_or_else(|| AppError::NotInitialized("No active agent client initialized".into()))
    }

    async fn initialize_inner(&self, config: AgentConfig) -> Result<InitializeResult> {
        let selected = select_route(&config, &self.codex_agent_id);
        let previous = self.lock_active().replace(selected);
        if let Some(previous) = previous.filter(|previous| *previous != selected) {
            info!(from = ?previous, to = ?selected, "switching agent client");
            if let Err(err) = self.client(previous).disconnect().await {
                warn!(%err, "previous client did not disconnect cleanly");
            }
        }
        debug!(agent = %config.id, route = ?selected, "routing agent");
        self.client(selected).initialize(config).await
    }
}

impl AgentClient for Router {
    fn initialize(&self, config: AgentConfig) -> ClientFuture<'_, InitializeResult> {
        Box::pin(self.initialize_inner(config))
    }

    fn new_session(&self, working_directory: &Path) -> ClientFuture<'_, NewSessionResult> {
        let working_directory = working_directory.to_path_buf();
        Box::pin(async move { self.active_client()?.new_session(&working_directory).await })
    }

    fn authenticate(&self, method_id: &str) -> ClientFuture<'_, bool> {
        let method_id = method_id.to_owned();
        Box::pin(async move { self.active_client()?.authenticate(&method_id).await })
    }

    fn send_prompt(&self, session_id: &str, content: Vec<PromptContent>) -> ClientFuture<'_, ()> {
        let session_id = session_id.to_owned();
        Box::pin(async move { self.active_client()?.send_prompt(&session_id, content).await })
    }

    fn cancel(&self, session_id: &str) -> ClientFuture<'_, ()> {
        let session_id = session_id.to_owned();
        Box::pin(async move { self.active_client()?.cancel(&session_id).await })
    }

    fn respond_to_permission(&self, request_id: &str, option_id: &str) -> ClientFuture<'_, ()> {
        let (request_id, option_id) = (request_id.to_owned(), option_id.to_owned());
        Box::pin(async move {
            self.active_client()?
                .respond_to_permission(&request_id, &option_id)
                .await
        })
    }

    fn set_session_mode(&self, session_id: &str, mode_id: &str) -> ClientFuture<'_, ()> {
        let (session_id, mode_id) = (session_id.to_owned(), mode_id.to_owned());
        Box::pin(async move {
            self.active_client()?
                .set_session_mode(&session_id, &mode_id)
                .await
        })
    }

    fn set_session_model(&self, session_id: &str, model_id: &str) -> ClientFuture<'_, ()> {
        let (session_id, model_id) = (session_id.to_owned(), model_id.to_owned());
        Box::pin(async move {
            self.active_client()?
                .set_session_model(&session_id, &model_id)
                .await
        })
    }

    fn disconnect(&self) -> ClientFuture<'_, ()> {
        Box::pin(async move {
            let Some(route) = self.lock_active().take() else {
                return Ok(());
            };
            self.client(route).disconnect().await
        })
    }

    fn is_initialized(&self) -> bool {
        self.active_route()
            .is_some_and(|route| self.client(route).is_initialized())
    }

    fn current_agent_id(&self) -> Option<String> {
        self.active_route()
            .and_then(|route| self.client(route).current_agent_id())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("codex_agent_id", &self.codex_agent_id)
            .field("active", &self.active_route())
            .finish_non_exhaustive()
    }
}
