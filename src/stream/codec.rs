//! NDJSON codec for the agent's output stream.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length to
//! prevent memory exhaustion caused by unterminated or runaway output from
//! a misbehaving agent process. A trailing partial line stays buffered in
//! the decoder until its newline arrives.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted by the stream codec: 1 MiB.
///
/// Lines exceeding this limit cause [`NdjsonCodec::decode`] to return
/// [`AppError::Stream`] with `"line too long"` instead of allocating
/// unbounded memory for a single event.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line-framing codec for the agent's NDJSON output.
///
/// Each newline-terminated (`\n`) UTF-8 string is one complete event line;
/// JSON decoding is the caller's concern. Lines longer than
/// [`MAX_LINE_BYTES`] return [`AppError::Stream`]`("line too long: …")`.
/// I/O errors are mapped to [`AppError::Io`].
#[derive(Debug)]
pub struct NdjsonCodec(LinesCodec);

impl NdjsonCodec {
    /// Create a new `NdjsonCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for NdjsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NdjsonCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next newline-terminated line from `src`.
    ///
    /// Returns `Ok(None)` when `src` holds no complete line yet (buffering).
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final, unterminated line when the stream reaches EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Stream(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
