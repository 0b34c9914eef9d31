//! Unit tests for NDJSON stream framing.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use agent_conduit::stream::codec::{NdjsonCodec, MAX_LINE_BYTES};
use agent_conduit::AppError;

/// A complete newline-terminated line is decoded without its `\n`.
#[test]
fn complete_line_is_decoded() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"result\"}\n");

    let line = codec
        .decode(&mut buf)
        .expect("decode must succeed for a valid line");

    assert_eq!(line.as_deref(), Some("{\"type\":\"result\"}"));
}

/// A partial line split across two deliveries yields exactly two events,
/// in order, with the split line reassembled correctly.
#[test]
fn partial_line_is_buffered_across_deliveries() {
    let mut codec = NdjsonCodec::new();

    // First delivery: one complete line plus the head of a second.
    let mut buf = BytesMut::from("{\"a\":1}\n{\"b");
    let first = codec.decode(&mut buf).expect("first decode must succeed");
    assert_eq!(first.as_deref(), Some("{\"a\":1}"));
    assert!(
        codec
            .decode(&mut buf)
            .expect("decode of partial tail must succeed")
            .is_none(),
        "the unterminated tail must stay buffered"
    );

    // Second delivery completes the split line.
    buf.extend_from_slice(b"\":2}\n");
    let second = codec.decode(&mut buf).expect("second decode must succeed");
    assert_eq!(second.as_deref(), Some("{\"b\":2}"));

    assert!(
        codec.decode(&mut buf).expect("empty buffer").is_none(),
        "no further lines must be present"
    );
}

/// Multiple lines delivered at once are decoded one per call, in order.
#[test]
fn batched_lines_decode_in_order() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("first\nsecond\n");

    let first = codec.decode(&mut buf).expect("first decode");
    let second = codec.decode(&mut buf).expect("second decode");

    assert_eq!(first.as_deref(), Some("first"));
    assert_eq!(second.as_deref(), Some("second"));
}

/// A line exceeding the maximum length maps to a stream framing error.
#[test]
fn oversized_line_is_rejected() {
    let mut codec = NdjsonCodec::new();
    let mut raw = vec![b'x'; MAX_LINE_BYTES + 1];
    raw.push(b'\n');
    let mut buf = BytesMut::from(raw.as_slice());

    let err = codec
        .decode(&mut buf)
        .expect_err("oversized line must be rejected");

    match err {
        AppError::Stream(msg) => assert!(msg.contains("line too long"), "got: {msg}"),
        other => panic!("expected AppError::Stream, got {other:?}"),
    }
}

/// A final unterminated line is surfaced at EOF.
#[test]
fn eof_flushes_final_partial_line() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("tail-without-newline");

    assert!(codec.decode(&mut buf).expect("no complete line").is_none());
    let flushed = codec.decode_eof(&mut buf).expect("decode_eof must succeed");
    assert_eq!(flushed.as_deref(), Some("tail-without-newline"));
}
