//! Process-backed JSON-RPC connection shared by the ACP and Codex variants.
//!
//! An [`RpcConnection`] owns at most one transport at a time: a spawned
//! agent process, or an in-memory stream pair attached with
//! [`RpcConnection::attach_streams`]. Each transport runs two tasks:
//!
//! - a reader that decodes frames in arrival order, resolves responses
//!   directly and forwards requests and notifications as
//!   [`ConnectionEvent`]s;
//! - for processes, an exit supervisor.
//!
//! Both tasks are tagged with the transport's slot generation. Only the
//! current generation may clear connection state or emit
//! [`ConnectionEvent::Closed`]; reports from a replaced transport are
//! dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::message::{classify, Incoming};
use super::reader::{run_reader, ReaderExit};
use super::{RpcChannel, RpcError};
use crate::process::{
    spawn_process, spawn_stderr_logger, supervise, ProcessExit, ProcessSlot, SpawnRequest,
    StderrTail,
};
use crate::{AppError, Result};

/// Peer traffic that is not a response to one of our requests.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Peer notification.
    Notification {
        /// Method.
        method: String,
        /// Parameters.
        params: Value,
    },
    /// Peer request expecting a response through
    /// [`RpcConnection::respond`].
    Request {
        /// Peer id.
        id: Value,
        /// Method.
        method: String,
        /// Parameters.
        params: Value,
    },
    /// A transport failure worth showing to the user. The transport may
    /// still be live.
    Error {
        /// Failure category.
        kind: ConnectionErrorKind,
        /// Human-readable description.
        message: String,
    },
    /// The current transport ended on its own.
    Closed(CloseReason),
}

/// Category of a [`ConnectionEvent::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// A request exceeded its budget.
    Timeout,
    /// Reading stdout or writing stdin failed.
    Stream,
}

/// Why the current transport ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The agent process exited.
    Exited(ProcessExit),
    /// The attached stream reached EOF.
    StreamEnded,
}

/// Inspects every non-response frame before it is forwarded.
pub type FrameObserver = Arc<dyn Fn(&Incoming) + Send + Sync>;

/// Identity of a started transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport {
    /// Slot generation.
    pub generation: u64,
    /// Process id, for spawned processes.
    pub pid: Option<u32>,
}

struct Shared {
    label: String,
    rpc: RpcChannel,
    slot: Mutex<ProcessSlot>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    observer: Option<FrameObserver>,
    stderr: Mutex<StderrTail>,
    last_exit: Mutex<Option<ProcessExit>>,
}

/// JSON-RPC connection bound to at most one live transport.
pub struct RpcConnection {
    shared: Arc<Shared>,
}

impl RpcConnection {
    /// Create a connection reporting to `events`.
    #[must_use]
    pub fn new(label: impl Into<String>, events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self::with_observer(label, events, None)
    }

    /// Create a connection whose inbound requests and notifications are
    /// shown to `observer` before they are forwarded.
    #[must_use]
    pub fn with_observer(
        label: impl Into<String>,
        events: mpsc::UnboundedSender<ConnectionEvent>,
        observer: Option<FrameObserver>,
    ) -> Self {
        let label = label.into();
        Self {
            shared: Arc::new(Shared {
                rpc: RpcChannel::new(label.as_str(), events.clone()),
                label,
                slot: Mutex::new(ProcessSlot::new()),
                events,
                observer,
                stderr: Mutex::new(StderrTail::new()),
                last_exit: Mutex::new(None),
            }),
        }
    }

    /// Log label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Spawn a process and start reading its stdout with `decoder`.
    ///
    /// Any previous transport is shut down first; its later exit report is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Propagates [`spawn_process`] failures.
    pub async fn spawn<D>(&self, request: SpawnRequest<'_>, decoder: D) -> Result<Transport>
    where
        D: Decoder<Item = Value, Error = AppError> + Send + 'static,
    {
        self.disconnect().await;

        let spawned = spawn_process(request)?;
        let shutdown = CancellationToken::new();
        let generation = {
            let mut slot = self.shared.lock_slot();
            let generation = slot.next_generation();
            slot.install(generation, spawned.pid, shutdown.clone());
            generation
        };
        *self.shared.lock_last_exit() = None;

        let tail = StderrTail::new();
        *self
            .shared
            .stderr
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = tail.clone();
        drop(spawn_stderr_logger(self.shared.label.clone(), spawned.stderr, tail));

        self.shared.rpc.writer().attach(generation, spawned.stdin).await;
        spawn_reader(&self.shared, generation, spawned.stdout, decoder, shutdown.clone(), true);

        let weak = Arc::downgrade(&self.shared);
        let label = self.shared.label.clone();
        let child = spawned.child;
        tokio::spawn(async move {
            let exit = supervise(&label, generation, child, shutdown).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_exit(exit).await;
            }
        });

        Ok(Transport {
            generation,
            pid: spawned.pid,
        })
    }

    /// Bind the connection to an already-open stream pair, e.g. a
    /// [`tokio::io::duplex`] pipe or a process started elsewhere.
    pub async fn attach_streams<R, W, D>(&self, stdout: R, stdin: W, decoder: D) -> Transport
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
        D: Decoder<Item = Value, Error = AppError> + Send + 'static,
    {
        self.disconnect().await;

        let shutdown = CancellationToken::new();
        let generation = {
            let mut slot = self.shared.lock_slot();
            let generation = slot.next_generation();
            slot.install(generation, None, shutdown.clone());
            generation
        };
        *self.shared.lock_last_exit() = None;

        self.shared.rpc.writer().attach(generation, stdin).await;
        spawn_reader(&self.shared, generation, stdout, decoder, shutdown, false);

        debug!(agent = %self.shared.label, generation, "stream transport attached");
        Transport {
            generation,
            pid: None,
        }
    }

    /// Send a request and wait up to `timeout` for its answer.
    ///
    /// # Errors
    ///
    /// See [`RpcChannel::request`].
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        self.shared.rpc.request(method, params, timeout).await
    }

    /// Send a notification.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConnectionClosed`] without a live transport.
    pub async fn notify(&self, method: &str, params: Value) -> Result<()> {
        self.shared.rpc.notify(method, params).await
    }

    /// Answer a peer request.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConnectionClosed`] without a live transport.
    pub async fn respond(&self, id: &Value, outcome: std::result::Result<Value, RpcError>) -> Result<()> {
        self.shared.rpc.respond(id, outcome).await
    }

    /// Shut the transport down and fail every outstanding request.
    ///
    /// Idempotent. No [`ConnectionEvent::Closed`] is emitted for a
    /// requested shutdown.
    pub async fn disconnect(&self) {
        let tracked = self.shared.lock_slot().take();
        if let Some(tracked) = tracked {
            info!(agent = %self.shared.label, pid = tracked.pid, "disconnecting agent transport");
            tracked.shutdown();
        }
        self.shared.rpc.close().await;
    }

    /// Whether a transport is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.shared.lock_slot().is_occupied()
    }

    /// Pid of the live process.
    #[must_use]
    pub fn current_pid(&self) -> Option<u32> {
        self.shared.lock_slot().current_pid()
    }

    /// Whether `generation` is the live transport.
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        self.shared.lock_slot().is_current(generation)
    }

    /// Exit of the most recent process, if it ended on its own.
    #[must_use]
    pub fn last_exit(&self) -> Option<ProcessExit> {
        self.shared.lock_last_exit().clone()
    }

    /// Retained stderr of the most recent process.
    #[must_use]
    pub fn stderr_tail(&self) -> String {
        self.shared
            .stderr
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    /// Number of requests awaiting an answer.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.rpc.pending().len()
    }
}

impl Drop for RpcConnection {
    fn drop(&mut self) {
        if let Some(tracked) = self.shared.lock_slot().take() {
            tracked.shutdown();
        }
    }
}

impl std::fmt::Debug for RpcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcConnection")
            .field("label", &self.shared.label)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

fn spawn_reader<R, D>(
    shared: &Arc<Shared>,
    generation: u64,
    stdout: R,
    decoder: D,
    cancel: CancellationToken,
    owns_process: bool,
) where
    R: AsyncRead + Send + Unpin + 'static,
    D: Decoder<Item = Value, Error = AppError> + Send + 'static,
{
    let weak = Arc::downgrade(shared);
    let label = shared.label.clone();

    tokio::spawn(async move {
        let route_target = weak.clone();
        let exit = run_reader(
            &label,
            stdout,
            decoder,
            move |frame| {
                if let Some(shared) = route_target.upgrade() {
                    shared.route(generation, frame);
                }
            },
            cancel,
        )
        .await;

        let Some(shared) = weak.upgrade() else {
            return;
        };
        match exit {
            ReaderExit::Cancelled => {}
            ReaderExit::StreamClosed => shared.on_stream_end(generation, owns_process).await,
            ReaderExit::StreamFailed(err) => {
                if shared.lock_slot().is_current(generation) {
                    shared.report(
                        ConnectionErrorKind::Stream,
                        format!("{} stdout read failed: {err}", shared.label),
                    );
                }
                shared.on_stream_end(generation, owns_process).await;
            }
        }
    });
}

impl Shared {
    fn route(&self, generation: u64, frame: Value) {
        if !self.lock_slot().is_current(generation) {
            debug!(agent = %self.label, generation, "frame from replaced transport dropped");
            return;
        }

        let Some(incoming) = classify(frame) else {
            debug!(agent = %self.label, "non-JSON-RPC frame dropped");
            return;
        };

        if let Incoming::Response { id, outcome } = incoming {
            if !self.rpc.dispatch_response(&id, outcome) {
                debug!(agent = %self.label, %id, "response for unknown request id");
            }
            return;
        }

        if let Some(observer) = &self.observer {
            observer(&incoming);
        }

        let event = match incoming {
            Incoming::Response { .. } => return,
            Incoming::Request { id, method, params } => ConnectionEvent::Request { id, method, params },
            Incoming::Notification { method, params } => {
                ConnectionEvent::Notification { method, params }
            }
        };

        if self.events.send(event).is_err() {
            debug!(agent = %self.label, "connection event receiver dropped");
        }
    }

    async fn on_stream_end(&self, generation: u64, owns_process: bool) {
        if owns_process {
            // The exit supervisor clears the slot; only unblock waiters here.
            if self.lock_slot().is_current(generation) {
                let failed = self.rpc.pending().fail_all();
                debug!(agent = %self.label, failed, "stdout closed");
            }
            return;
        }

        if !self.lock_slot().clear_if_current(generation) {
            return;
        }
        info!(agent = %self.label, generation, "agent stream ended");
        self.rpc.close_generation(generation).await;
        let _ = self.events.send(ConnectionEvent::Closed(CloseReason::StreamEnded));
    }

    async fn on_exit(&self, exit: ProcessExit) {
        if !self.lock_slot().clear_if_current(exit.generation) {
            debug!(
                agent = %self.label,
                generation = exit.generation,
                pid = exit.pid,
                "exit of replaced process ignored"
            );
            return;
        }

        if exit.is_failure() {
            warn!(agent = %self.label, pid = exit.pid, %exit, "agent process exited unexpectedly");
        }
        *self.lock_last_exit() = Some(exit.clone());
        self.rpc.close_generation(exit.generation).await;
        let _ = self.events.send(ConnectionEvent::Closed(CloseReason::Exited(exit)));
    }

    fn report(&self, kind: ConnectionErrorKind, message: String) {
        let _ = self.events.send(ConnectionEvent::Error { kind, message });
    }

    fn lock_slot(&self) -> MutexGuard<'_, ProcessSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_last_exit(&self) -> MutexGuard<'_, Option<ProcessExit>> {
        self.last_exit.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
