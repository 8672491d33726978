//! NDJSON codec for ACP agent streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so an
//! unterminated or oversized message from a misbehaving agent cannot
//! exhaust memory.
//!
//! # Usage
//!
//! [`AcpCodec`] splits raw lines. [`AcpFrameDecoder`] sits on top of it
//! and yields parsed JSON
//! values, dropping blank lines, oversized lines and unparseable lines
//! with a log entry instead of an error, so a single bad line never ends
//! the stream.
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use cchub::acp::codec::AcpFrameDecoder;
//!
//! let frames = FramedRead::new(child_stdout, AcpFrameDecoder::new());
//! ```

use bytes::BytesMut;
use serde_json::Value;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::{AppError, Result};

/// Maximum line length accepted by the ACP codec: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON line splitter for ACP agent output.
///
/// Lines longer than [`MAX_LINE_BYTES`] return
/// [`AppError::Protocol`]`("line too long: …")`; I/O errors map to
/// [`AppError::Io`]. Outbound frames are written by
/// [`FrameWriter`](crate::rpc::FrameWriter).
#[derive(Debug)]
pub struct AcpCodec(LinesCodec);

impl AcpCodec {
    /// Create a new `AcpCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for AcpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for AcpCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

/// Inbound decoder yielding one JSON value per non-empty line.
#[derive(Debug, Default)]
pub struct AcpFrameDecoder {
    lines: AcpCodec,
}

impl AcpFrameDecoder {
    /// Create a decoder with the default line limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_frame(&mut self, src: &mut BytesMut, eof: bool) -> Result<Option<Value>> {
        loop {
            let line = if eof {
                self.lines.decode_eof(src)
            } else {
                self.lines.decode(src)
            };

            match line {
                Ok(None) => return Ok(None),
                Ok(Some(line)) => {
                    if let Some(frame) = parse_line(&line) {
                        return Ok(Some(frame));
                    }
                }
                Err(AppError::Protocol(msg)) => {
                    warn!(error = msg.as_str(), "acp codec: dropping oversized line");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Decoder for AcpFrameDecoder {
    type Item = Value;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.next_frame(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.next_frame(src, true)
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn parse_line(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%err, raw_line = %truncate(trimmed, 200), "acp codec: unparseable line skipped");
            None
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
