//! Stdout reader task shared by both protocols.
//!
//! Drives a [`FramedRead`] with the protocol's JSON decoder and hands each
//! decoded frame to a routing closure, strictly in arrival order.

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::AppError;

/// Why a reader loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderExit {
    /// The stream reached EOF.
    StreamClosed,
    /// Reading failed with an I/O error.
    StreamFailed(String),
    /// The cancellation token fired.
    Cancelled,
}

/// Read frames from `stdout` until EOF, an I/O error, or cancellation.
///
/// Protocol-level decode errors (oversized lines) are logged and skipped;
/// they never stop the loop.
pub async fn run_reader<R, D, F>(
    label: &str,
    stdout: R,
    decoder: D,
    mut route: F,
    cancel: CancellationToken,
) -> ReaderExit
where
    R: AsyncRead + Unpin,
    D: Decoder<Item = Value, Error = AppError>,
    F: FnMut(Value),
{
    let mut framed = FramedRead::new(stdout, decoder);

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(agent = label, "reader: cancellation received, stopping");
                return ReaderExit::Cancelled;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(agent = label, "reader: EOF detected");
                        return ReaderExit::StreamClosed;
                    }
                    Some(Ok(frame)) => route(frame),
                    Some(Err(AppError::Io(err))) => {
                        warn!(agent = label, error = %err, "reader: IO error, stopping");
                        return ReaderExit::StreamFailed(err);
                    }
                    Some(Err(err)) => {
                        warn!(agent = label, error = %err, "reader: framing error, skipping");
                    }
                }
            }
        }
    }
}
