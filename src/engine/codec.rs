//! Line framing for the adapter's NDJSON streams.
//!
//! One frame is one `\n`-terminated UTF-8 line. Framing is bounded: a
//! runaway line from a broken adapter fails the decode instead of
//! growing the read buffer without limit. The bound is generous because
//! an eval response inlines its plots as base64 PNG payloads, which puts
//! legitimate single lines in the megabyte range.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Upper bound on one inbound frame: 8 MiB.
pub const MAX_LINE_BYTES: usize = 8 * 1_048_576;

/// Bounded NDJSON line codec for [`FramedRead`]/[`FramedWrite`] over the
/// adapter's stdio.
///
/// [`FramedRead`]: tokio_util::codec::FramedRead
/// [`FramedWrite`]: tokio_util::codec::FramedWrite
#[derive(Debug)]
pub struct EngineCodec {
    inner: LinesCodec,
}

impl EngineCodec {
    /// Codec with the [`MAX_LINE_BYTES`] bound applied to inbound lines.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }

    fn lift(err: LinesCodecError) -> AppError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                AppError::Engine(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
            }
            LinesCodecError::Io(io) => AppError::Io(io.to_string()),
        }
    }
}

impl Default for EngineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EngineCodec {
    type Item = String;
    type Error = AppError;

    /// Next complete line, or `Ok(None)` while one is still buffering.
    ///
    /// # Errors
    ///
    /// [`AppError::Engine`] with `"line too long"` once a line passes
    /// [`MAX_LINE_BYTES`]; [`AppError::Io`] for stream errors.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.inner.decode(src).map_err(Self::lift)
    }

    /// Flush the final unterminated line when the stream ends.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        self.inner.decode_eof(src).map_err(Self::lift)
    }
}

impl Encoder<String> for EngineCodec {
    type Error = AppError;

    /// Append `item` to `dst` as one `\n`-terminated line.
    ///
    /// The length bound is inbound-only; outbound requests are small.
    ///
    /// # Errors
    ///
    /// [`AppError::Io`] on underlying write failures.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.inner.encode(item, dst).map_err(Self::lift)
    }
}
