//! Error types shared across the crate.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::rpc::RpcError;

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Lifecycle step whose time budget was exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutStep {
    /// Protocol handshake after spawning the agent.
    Initialize,
    /// Session creation.
    NewSession,
    /// A single JSON-RPC request, named by its method.
    Request(String),
}

impl Display for TimeoutStep {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialize => f.write_str("initialize"),
            Self::NewSession => f.write_str("newSession"),
            Self::Request(method) => write!(f, "request {method}"),
        }
    }
}

/// Crate error enumeration covering every failure mode of the protocol core.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure, including a missing
    /// agent command.
    Config(String),
    /// Child process could not be spawned or exited unexpectedly.
    Process(String),
    /// The agent command does not exist (spawn `ENOENT` or exit code 127).
    CommandNotFound(String),
    /// File-system or stream I/O failure.
    Io(String),
    /// Malformed or unexpected protocol traffic.
    Protocol(String),
    /// The agent answered a request with a JSON-RPC error object.
    Rpc(RpcError),
    /// An operation exceeded its time budget.
    Timeout {
        /// Which step timed out.
        step: TimeoutStep,
        /// The budget that elapsed.
        after: Duration,
    },
    /// The connection closed while a request was outstanding.
    ConnectionClosed(String),
    /// An operation needed an initialized client or connection.
    NotInitialized(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// The active protocol does not support the operation.
    Unsupported(String),
}

impl AppError {
    /// Whether this error is a timeout of any kind.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::CommandNotFound(command) => write!(f, "command not found: {command}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Rpc(err) => write!(f, "rpc error {}: {}", err.code, err.message),
            Self::Timeout { step, after } => {
                write!(f, "timeout: {step} timed out after {}ms", after.as_millis())
            }
            Self::ConnectionClosed(msg) => write!(f, "connection closed: {msg}"),
            Self::NotInitialized(msg) => write!(f, "not initialized: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("json: {err}"))
    }
}

impl From<RpcError> for AppError {
    fn from(err: RpcError) -> Self {
        Self::Rpc(err)
    }
}
