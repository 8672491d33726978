//! Protocol-agnostic agent client abstraction.
//!
//! The [`AgentClient`] trait decouples the caller (the chat front end or
//! the CLI) from the wire protocol spoken by the agent process (ACP or the
//! Codex MCP variant). Every user action that affects an agent routes
//! through this trait, usually via the [`Router`].
//!
//! Clients never call back into the caller. Everything they want to show
//! travels over one constructor-injected [`ClientEvent`] channel.

pub mod router;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

pub use router::Router;

use crate::errors::TimeoutStep;
use crate::models::{
    AgentConfig, AgentError, InitializeResult, NewSessionResult, PromptContent, SessionUpdate,
};
use crate::{AppError, Result};

/// Boxed future returned by [`AgentClient`] methods.
pub type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Events emitted by clients into the shared event channel.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Incremental change for the chat UI, including permission state.
    SessionUpdate(SessionUpdate),
    /// Structured error to display.
    Error(AgentError),
}

/// Uniform surface over the ACP and Codex adapters.
pub trait AgentClient: Send + Sync {
    /// Start the agent process and perform the protocol readiness check.
    ///
    /// Any previous connection owned by this client is torn down first.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] when no command is configured.
    /// - [`AppError::CommandNotFound`] when the command does not exist.
    /// - [`AppError::Timeout`] with [`TimeoutStep::Initialize`]; the
    ///   connection is disconnected before returning.
    fn initialize(&self, config: AgentConfig) -> ClientFuture<'_, InitializeResult>;

    /// Open a conversation rooted at `working_directory`.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotInitialized`] before [`initialize`](Self::initialize).
    /// - [`AppError::Timeout`] with [`TimeoutStep::NewSession`]; the
    ///   connection is disconnected before returning.
    fn new_session(&self, working_directory: &Path) -> ClientFuture<'_, NewSessionResult>;

    /// Authenticate with one of the advertised methods.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotInitialized`] before initialization.
    fn authenticate(&self, method_id: &str) -> ClientFuture<'_, bool>;

    /// Send one user turn. Long-running turns that exceed the prompt budget
    /// are not treated as failures; the agent keeps streaming updates.
    ///
    /// # Errors
    ///
    /// Propagates send failures other than ignorable agent errors.
    fn send_prompt(&self, session_id: &str, content: Vec<PromptContent>) -> ClientFuture<'_, ()>;

    /// Stop the current turn and cancel every pending permission request.
    ///
    /// # Errors
    ///
    /// Never fails for a missing connection; local state is always cleared.
    fn cancel(&self, session_id: &str) -> ClientFuture<'_, ()>;

    /// Answer a permission request. Unknown request ids are a no-op.
    ///
    /// # Errors
    ///
    /// Returns stream errors from delivering the decision to the agent.
    fn respond_to_permission(&self, request_id: &str, option_id: &str) -> ClientFuture<'_, ()>;

    /// Switch the session mode.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unsupported`] when the protocol has no modes.
    fn set_session_mode(&self, session_id: &str, mode_id: &str) -> ClientFuture<'_, ()>;

    /// Switch the session model.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Unsupported`] when the protocol has no models.
    fn set_session_model(&self, session_id: &str, model_id: &str) -> ClientFuture<'_, ()>;

    /// Cancel permissions, kill the process and clear all state.
    ///
    /// Safe to call repeatedly and before initialization.
    fn disconnect(&self) -> ClientFuture<'_, ()>;

    /// Whether a connection is live.
    fn is_initialized(&self) -> bool;

    /// Id of the agent this client was last initialized for.
    fn current_agent_id(&self) -> Option<String>;
}

/// Run `fut` under a step budget.
///
/// Expiry of the budget, or a request timeout raised inside `fut`, yields
/// [`AppError::Timeout`] tagged with `step`.
///
/// # Errors
///
/// Returns the error of `fut`, or the tagged timeout.
pub async fn with_timeout<T, F>(step: TimeoutStep, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Err(AppError::Timeout { after, .. })) => Err(AppError::Timeout { step, after }),
        Ok(result) => result,
        Err(_elapsed) => Err(AppError::Timeout { step, after }),
    }
}
