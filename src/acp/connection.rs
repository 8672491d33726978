//! ACP agent connection.
//!
//! Spawns the agent through the platform wrapper, frames stdio as NDJSON
//! and performs the `initialize` handshake. Requests and notifications
//! from the agent arrive on the [`ConnectionEvent`] channel handed to
//! [`AcpConnection::new`].

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::codec::AcpFrameDecoder;
use super::schema::{InitializeParams, InitializeResponse};
use crate::driver::with_timeout;
use crate::errors::TimeoutStep;
use crate::models::{AgentConfig, InitializeResult};
use crate::platform::{prepare_command, LaunchOptions};
use crate::process::SpawnRequest;
use crate::rpc::{ConnectionEvent, RpcConnection, RpcError, Transport};
use crate::{AppError, Result};

/// One ACP agent process and its JSON-RPC session.
#[derive(Debug)]
pub struct AcpConnection {
    inner: RpcConnection,
}

impl AcpConnection {
    /// Create an idle connection reporting to `events`.
    #[must_use]
    pub fn new(events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self {
            inner: RpcConnection::new("acp", events),
        }
    }

    /// Spawn the agent described by `config`.
    ///
    /// A previously started agent is killed first.
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] when no command is configured.
    /// - [`AppError::CommandNotFound`] or [`AppError::Process`] from the
    ///   spawn.
    pub async fn start(&self, config: &AgentConfig, launch: &LaunchOptions) -> Result<Transport> {
        let label = config.label();
        let Some(command) = config.trimmed_command() else {
            self.inner.disconnect().await;
            return Err(AppError::Config(format!(
                "Command not configured for agent \"{}\" ({})",
                config.display_name, config.id
            )));
        };

        let prepared = prepare_command(
            command,
            &config.args,
            &config.working_directory,
            &config.env,
            launch,
        );
        info!(
            agent = %label,
            command = %prepared.spec.command,
            args = ?prepared.spec.args,
            cwd = %config.working_directory.display(),
            wsl = launch.uses_wsl(),
            "starting acp agent"
        );

        self.inner
            .spawn(
                SpawnRequest {
                    label: &label,
                    command: &prepared.spec,
                    cwd: &config.working_directory,
                    env: &prepared.env,
                    native_shell: launch.needs_native_shell(),
                },
                AcpFrameDecoder::new(),
            )
            .await
    }

    /// Bind to an already-running agent's stdio.
    pub async fn attach_streams<R, W>(&self, stdout: R, stdin: W) -> Transport
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.inner
            .attach_streams(stdout, stdin, AcpFrameDecoder::new())
            .await
    }

    /// Perform the `initialize` handshake.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] with [`TimeoutStep::Initialize`] when the
    ///   agent does not answer in time; the connection is torn down.
    /// - [`AppError::Rpc`] when the agent rejects the handshake.
    pub async fn initialize(&self, timeout: Duration) -> Result<InitializeResult> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = with_timeout(
            TimeoutStep::Initialize,
            timeout,
            self.inner.request("initialize", params, timeout),
        )
        .await;

        let raw = match result {
            Ok(raw) => raw,
            Err(err) => {
                if err.is_timeout() {
                    warn!(timeout_ms = timeout.as_millis(), "acp initialize timed out, disconnecting");
                    self.inner.disconnect().await;
                }
                return Err(err);
            }
        };

        let response: InitializeResponse = serde_json::from_value(raw)?;
        info!(
            protocol_version = response.protocol_version,
            auth_methods = response.auth_methods.len(),
            "acp agent initialized"
        );
        Ok(InitializeResult {
            protocol_version: response.protocol_version,
            auth_methods: response.auth_methods,
            prompt_capabilities: response.agent_capabilities.prompt_capabilities,
        })
    }

    /// Send a request.
    ///
    /// # Errors
    ///
    /// See [`RpcConnection::request`].
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.inner.request(method, params, timeout).await
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// See [`RpcConnection::notify`].
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.inner.notify(method, params).await
    }

    /// Answer an agent request.
    ///
    /// # Errors
    ///
    /// See [`RpcConnection::respond`].
    pub async fn respond(&self, id: &Value, outcome: std::result::Result<Value, RpcError>) -> Result<()> {
        self.inner.respond(id, outcome).await
    }

    /// Kill the agent and fail outstanding requests. Idempotent.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await;
    }

    /// Whether an agent is attached.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Pid of the running agent.
    #[must_use]
    pub fn current_pid(&self) -> Option<u32> {
        self.inner.current_pid()
    }

    /// Whether `generation` is the live transport.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.inner.is_current(generation)
    }

    /// Requests awaiting an answer.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.pending_requests()
    }
}
