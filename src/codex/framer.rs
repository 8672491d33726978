//! Mixed-framing decoder for the Codex MCP server.
//!
//! The server writes either LSP-style frames
//!
//! ```text
//! Content-Length: 17\r\n\r\n{"jsonrpc":"2.0"}
//! ```
//!
//! or bare newline-terminated JSON, sometimes interleaved, and stdout reads
//! split them at arbitrary byte positions. [`CodexFramer`] re-runs a small
//! state machine over the buffered bytes until no complete frame is left:
//!
//! 1. a buffer that starts with `Content-Length:` (after whitespace only)
//!    is a header frame; wait for `\r\n\r\n` and the full body;
//! 2. anything else is line-oriented; wait for `\n`;
//! 3. bodies that do not start with `{` are noise and are dropped, as are
//!    bodies that fail to parse.
//!
//! The decoder never returns an error for malformed input, so a single bad
//! frame cannot stop the stream.

use bytes::{Buf, BytesMut};
use serde_json::Value;
use tokio_util::codec::Decoder;
use tracing::{debug, warn};

use crate::{AppError, Result};

const HEADER_PREFIX: &[u8] = b"Content-Length:";
const HEADER_END: &[u8] = b"\r\n\r\n";

/// Frames that fail to parse are logged with at most this many bytes.
const LOG_PREVIEW_BYTES: usize = 200;

/// Stateless apart from the buffer `FramedRead` hands it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CodexFramer;

/// One step of the framing loop.
enum Step {
    /// Not enough bytes buffered.
    NeedMore,
    /// Consumed bytes without producing a body.
    Skipped,
    /// A complete body.
    Body(BytesMut),
}

impl CodexFramer {
    /// Create a framer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn step(src: &mut BytesMut) -> Step {
        if let Some(offset) = header_offset(src) {
            src.advance(offset);
            return Self::header_frame(src);
        }
        Self::line_frame(src)
    }

    fn header_frame(src: &mut BytesMut) -> Step {
        let Some(header_end) = find(src, HEADER_END) else {
            return Step::NeedMore;
        };
        let Some(length) = content_length(&src[..header_end]) else {
            debug!("codex framer: header without a length skipped");
            src.advance(header_end + HEADER_END.len());
            return Step::Skipped;
        };

        let total = header_end + HEADER_END.len() + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Step::NeedMore;
        }
        src.advance(header_end + HEADER_END.len());
        Step::Body(src.split_to(length))
    }

    fn line_frame(src: &mut BytesMut) -> Step {
        let Some(newline) = src.iter().position(|byte| *byte == b'\n') else {
            return Step::NeedMore;
        };
        let mut line = src.split_to(newline + 1);
        line.truncate(newline);
        Step::Body(line)
    }
}

impl Decoder for CodexFramer {
    type Item = Value;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        loop {
            match Self::step(src) {
                Step::NeedMore => return Ok(None),
                Step::Skipped => {}
                Step::Body(body) => {
                    if let Some(frame) = parse_body(&body) {
                        return Ok(Some(frame));
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // A trailing line without its newline is still a frame.
        if !src.is_empty() && header_offset(src).is_none() {
            let rest = src.split();
            return Ok(parse_body(&rest));
        }
        src.clear();
        Ok(None)
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

/// Offset of a `Content-Length:` header preceded only by whitespace.
fn header_offset(src: &[u8]) -> Option<usize> {
    let offset = find(src, HEADER_PREFIX)?;
    src[..offset]
        .iter()
        .all(u8::is_ascii_whitespace)
        .then_some(offset)
}

/// Parse the length out of a header block, case-insensitively.
fn content_length(header: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(header).ok()?;
    text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.trim().eq_ignore_ascii_case("content-length") {
            return None;
        }
        let digits: String = value
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_body(body: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        if !trimmed.is_empty() {
            debug!(preview = %preview(trimmed), "codex framer: non-JSON output dropped");
        }
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(%err, preview = %preview(trimmed), "codex framer: unparseable frame dropped");
            None
        }
    }
}

fn preview(text: &str) -> &str {
    if text.len() <= LOG_PREVIEW_BYTES {
        return text;
    }
    let mut end = LOG_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
