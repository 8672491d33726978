//! Unit tests for the ACP NDJSON codec.
//!
//! Covers:
//! - a single newline-terminated message decodes to its JSON value
//! - batched messages are decoded one per call
//! - partial delivery is buffered until the newline arrives
//! - blank, non-JSON and oversized lines are dropped without ending the stream
//! - a trailing line without newline is flushed at EOF
//! - the raw line codec reports oversized lines as protocol errors

use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::Decoder;

use cchub::acp::codec::{AcpCodec, AcpFrameDecoder, MAX_LINE_BYTES};
use cchub::AppError;

fn drain(decoder: &mut AcpFrameDecoder, buf: &mut BytesMut) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    while let Some(frame) = decoder.decode(buf).expect("decoder never errors on content") {
        frames.push(frame);
    }
    frames
}

// ── Framing ───────────────────────────────────────────────────────────────────

/// One complete line yields exactly one frame and empties the buffer.
#[test]
fn single_line_decodes() {
    let mut decoder = AcpFrameDecoder::new();
    let mut buf = BytesMut::from(r#"{"jsonrpc":"2.0","id":0,"result":{}}"#);
    buf.extend_from_slice(b"\n");

    let frames = drain(&mut decoder, &mut buf);
    assert_eq!(frames, vec![json!({"jsonrpc": "2.0", "id": 0, "result": {}})]);
    assert!(buf.is_empty(), "buffer should be fully consumed");
}

/// Several lines delivered in one read come out in order.
#[test]
fn batched_lines_decode_in_order() {
    let mut decoder = AcpFrameDecoder::new();
    let mut buf = BytesMut::from("{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n");

    let frames = drain(&mut decoder, &mut buf);
    assert_eq!(frames, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
}

/// A line split across reads is only emitted once the newline arrives.
#[test]
fn partial_line_is_buffered() {
    let mut decoder = AcpFrameDecoder::new();
    let mut buf = BytesMut::from("{\"method\":\"session/");

    assert!(drain(&mut decoder, &mut buf).is_empty());

    buf.extend_from_slice(b"update\"}\n");
    assert_eq!(
        drain(&mut decoder, &mut buf),
        vec![json!({"method": "session/update"})]
    );
}

// ── Noise tolerance ───────────────────────────────────────────────────────────

/// Blank lines, log output and broken JSON are skipped; the next valid line
/// still decodes.
#[test]
fn noise_lines_are_skipped() {
    let mut decoder = AcpFrameDecoder::new();
    let mut buf = BytesMut::from("\n   \nStarting agent...\n{\"broken\":\n{\"ok\":true}\n");

    assert_eq!(drain(&mut decoder, &mut buf), vec![json!({"ok": true})]);
}

/// An oversized line is discarded and decoding resumes at the next line.
#[test]
fn oversized_line_is_dropped() {
    let mut decoder = AcpFrameDecoder::new();
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&vec![b'x'; MAX_LINE_BYTES + 16]);
    buf.extend_from_slice(b"\n{\"after\":1}\n");

    assert_eq!(drain(&mut decoder, &mut buf), vec![json!({"after": 1})]);
}

/// The final line of a stream is still delivered without its newline.
#[test]
fn trailing_line_flushes_at_eof() {
    let mut decoder = AcpFrameDecoder::new();
    let mut buf = BytesMut::from("{\"last\":true}");

    assert_eq!(decoder.decode(&mut buf).expect("decode"), None);
    assert_eq!(
        decoder.decode_eof(&mut buf).expect("decode_eof"),
        Some(json!({"last": true}))
    );
}

// ── Raw line codec ────────────────────────────────────────────────────────────

/// The raw codec surfaces the line limit as a protocol error.
#[test]
fn raw_codec_reports_line_too_long() {
    let mut codec = AcpCodec::new();
    let mut buf = BytesMut::from(vec![b'y'; MAX_LINE_BYTES + 1].as_slice());

    let err = codec.decode(&mut buf).expect_err("line over the limit");
    assert!(
        matches!(&err, AppError::Protocol(msg) if msg.contains("line too long")),
        "unexpected error: {err:?}"
    );
}
