//! JSON-RPC plumbing shared by the ACP and Codex connections.
//!
//! [`RpcChannel`] pairs a [`FrameWriter`] with a [`PendingRequests`] table
//! and implements request/response correlation with per-call timeouts.
//! Reading and framing stay with each protocol's connection, which feeds
//! responses back through [`RpcChannel::dispatch_response`].

pub mod connection;
pub mod message;
pub mod pending;
pub mod reader;
pub mod writer;

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use connection::{
    CloseReason, ConnectionErrorKind, ConnectionEvent, FrameObserver, RpcConnection, Transport,
};
pub use message::{classify, Incoming, RpcError};
pub use pending::PendingRequests;
pub use writer::FrameWriter;

use crate::errors::TimeoutStep;
use crate::{AppError, Result};

/// Outbound side of a JSON-RPC connection.
#[derive(Debug)]
pub struct RpcChannel {
    label: String,
    pending: PendingRequests,
    writer: FrameWriter,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl RpcChannel {
    /// Create a channel with no stdin attached. Timeouts and write
    /// failures are reported to `events`.
    #[must_use]
    pub fn new(label: impl Into<String>, events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        let label = label.into();
        Self {
            writer: FrameWriter::new(label.as_str(), events.clone()),
            label,
            pending: PendingRequests::new(),
            events,
        }
    }

    /// The frame writer.
    #[must_use]
    pub fn writer(&self) -> &FrameWriter {
        &self.writer
    }

    /// The outstanding request table.
    #[must_use]
    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Send a request and wait up to `timeout` for its response.
    ///
    /// A timeout forgets only this request; other outstanding requests
    /// stay resolvable. It is also reported as a
    /// [`ConnectionEvent::Error`] of kind [`ConnectionErrorKind::Timeout`].
    ///
    /// # Errors
    ///
    /// - [`AppError::Rpc`] when the peer answers with an error object.
    /// - [`AppError::Timeout`] with [`TimeoutStep::Request`] on expiry.
    /// - [`AppError::ConnectionClosed`] when stdin is unavailable or the
    ///   connection closes while waiting.
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        let (id, rx) = self.pending.register();
        let _entry = PendingGuard {
            pending: &self.pending,
            id,
        };
        debug!(agent = %self.label, id, method, "sending request");

        self.writer
            .send(&message::request_frame(id, method, params))
            .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(rpc))) => Err(AppError::Rpc(rpc)),
            Ok(Err(_closed)) => Err(AppError::ConnectionClosed(format!(
                "{} closed while waiting for {method}",
                self.label
            ))),
            Err(_elapsed) => {
                warn!(agent = %self.label, id, method, timeout_ms = timeout.as_millis(), "request timed out");
                let _ = self.events.send(ConnectionEvent::Error {
                    kind: ConnectionErrorKind::Timeout,
                    message: format!(
                        "{} request timed out: {method} ({}ms)",
                        self.label,
                        timeout.as_millis()
                    ),
                });
                Err(AppError::Timeout {
                    step: TimeoutStep::Request(method.to_owned()),
                    after: timeout,
                })
            }
        }
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConnectionClosed`] when stdin is unavailable.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        debug!(agent = %self.label, method, "sending notification");
        self.writer
            .send(&message::notification_frame(method, params))
            .await
    }

    /// Answer a peer-initiated request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConnectionClosed`] when stdin is unavailable.
    pub async fn respond(&self, id: &Value, outcome: std::result::Result<Value, RpcError>) -> Result<()> {
        self.writer
            .send(&message::response_frame(id, outcome))
            .await
    }

    /// Route an inbound response to its waiter.
    pub fn dispatch_response(&self, id: &Value, outcome: std::result::Result<Value, RpcError>) -> bool {
        self.pending.resolve(id, outcome)
    }

    /// Close stdin and fail every outstanding request.
    pub async fn close(&self) {
        self.writer.detach().await;
        let failed = self.pending.fail_all();
        if failed > 0 {
            debug!(agent = %self.label, failed, "rejected pending requests on close");
        }
    }

    /// Like [`close`](Self::close), for the end of transport `generation`.
    /// Does nothing once a newer transport has attached its stdin.
    pub async fn close_generation(&self, generation: u64) {
        match self
            .writer
            .detach_generation(generation, || self.pending.fail_all())
            .await
        {
            None => debug!(agent = %self.label, generation, "newer transport attached, stdin kept"),
            Some(0) => {}
            Some(failed) => debug!(agent = %self.label, failed, "rejected pending requests on close"),
        }
    }
}

/// Removes a request's table entry however its waiter ends, including when
/// the request future is dropped by an enclosing timeout.
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.forget(self.id);
    }
}
