//! Newline-delimited frame writer for an agent's stdin.
//!
//! Both protocols write compact JSON followed by `\n`. Writes to a stdin
//! that has already closed are logged and swallowed: a broken pipe is a
//! normal end-of-life signal for an agent process, not a caller error.
//! Any other write failure is also reported as a
//! [`ConnectionEvent::Error`].

use std::fmt::{Debug, Formatter};
use std::io::ErrorKind;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, warn};

use super::connection::{ConnectionErrorKind, ConnectionEvent};
use crate::{AppError, Result};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Stdin of one transport, tagged with its slot generation.
struct Sink {
    generation: u64,
    writer: BoxedWriter,
}

/// Shared handle to the current stdin sink, if any.
#[derive(Clone)]
pub struct FrameWriter {
    label: Arc<str>,
    sink: Arc<Mutex<Option<Sink>>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl FrameWriter {
    /// Create a writer with no sink attached, reporting failures to
    /// `events`.
    #[must_use]
    pub fn new(label: impl Into<Arc<str>>, events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self {
            label: label.into(),
            sink: Arc::new(Mutex::new(None)),
            events,
        }
    }

    /// Replace the sink with the stdin of transport `generation`, dropping
    /// (and thereby closing) any previous one.
    pub async fn attach<W>(&self, generation: u64, writer: W)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        *self.sink.lock().await = Some(Sink {
            generation,
            writer: Box::new(writer),
        });
    }

    /// Drop the sink, closing the agent's stdin.
    pub async fn detach(&self) {
        self.sink.lock().await.take();
    }

    /// Drop the sink unless a transport newer than `generation` owns it,
    /// running `on_detach` while the sink is still locked.
    ///
    /// Returns `None` when a newer sink was kept.
    pub async fn detach_generation<T>(&self, generation: u64, on_detach: impl FnOnce() -> T) -> Option<T> {
        let mut guard = self.sink.lock().await;
        if guard.as_ref().is_some_and(|sink| sink.generation != generation) {
            return None;
        }
        guard.take();
        Some(on_detach())
    }

    /// Serialize `frame` and write it as one line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConnectionClosed`] when no sink is attached.
    /// Write failures on an attached sink mark it as closed and return
    /// `Ok(())`.
    pub async fn send(&self, frame: &Value) -> Result<()> {
        let mut bytes = serde_json::to_vec(frame)?;
        bytes.push(b'\n');

        let mut guard = self.sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(AppError::ConnectionClosed(format!(
                "{} stdin not available",
                self.label
            )));
        };

        let written = async {
            sink.writer.write_all(&bytes).await?;
            sink.writer.flush().await
        }
        .await;

        if let Err(err) = written {
            if err.kind() == ErrorKind::BrokenPipe {
                warn!(agent = %self.label, "stdin closed (EPIPE), dropping frame");
            } else {
                error!(agent = %self.label, %err, "stdin write failed, dropping frame");
                let _ = self.events.send(ConnectionEvent::Error {
                    kind: ConnectionErrorKind::Stream,
                    message: format!("{} stdin write failed: {err}", self.label),
                });
            }
            *guard = None;
        }

        Ok(())
    }
}

impl Debug for FrameWriter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameWriter")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}
