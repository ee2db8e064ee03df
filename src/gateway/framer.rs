//! Newline framing for the helper's stdout.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so an
//! unterminated or oversized message cannot make the gateway allocate without
//! bound. The buffer is the carry-over: bytes after the last newline stay there
//! until a later chunk completes the message, so a message split across reads
//! is emitted once, whole, and in arrival order.
//!
//! Differences from a bare `LinesCodec`:
//!
//! - whitespace-only lines are dropped;
//! - an oversized line is reported as [`Frame::Oversized`] instead of an error
//!   that would end the `FramedRead` stream;
//! - a non-UTF-8 line is logged and skipped;
//! - an unterminated tail at end of stream is discarded, never emitted.
//!
//! The framer has two faces: [`LineFramer::push`] for callers holding text
//! chunks, and its [`Decoder`] impl for use with `FramedRead`.
//!
//! # Examples
//!
//! ```rust,ignore
//! use tokio_util::codec::FramedRead;
//! use tool_gateway::gateway::framer::LineFramer;
//!
//! let frames = FramedRead::new(child_stdout, LineFramer::new());
//! ```

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::{AppError, Result};

/// Maximum accepted message length: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// One unit of framed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A complete, non-blank line without its terminator.
    Line(String),
    /// A line longer than the limit was discarded; carries the limit in bytes.
    Oversized(usize),
}

/// Line decoder for the helper's stdout.
#[derive(Debug)]
pub struct LineFramer {
    codec: LinesCodec,
    max_length: usize,
    pending: BytesMut,
}

impl LineFramer {
    /// Create a framer with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_BYTES)
    }

    /// Create a framer with a custom per-line limit.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            codec: LinesCodec::new_with_max_length(max_length),
            max_length,
            pending: BytesMut::new(),
        }
    }

    /// Feed one text chunk and return every frame it completes, in order.
    ///
    /// Text after the last newline is kept and prefixed to the next chunk.
    pub fn push(&mut self, chunk: &str) -> Vec<Frame> {
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(chunk.as_bytes());
        let frames = std::iter::from_fn(|| self.next_frame(&mut pending)).collect();
        self.pending = pending;
        frames
    }

    fn next_frame(&mut self, src: &mut BytesMut) -> Option<Frame> {
        loop {
            match self.codec.decode(src) {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => return Some(Frame::Line(line)),
                Ok(None) => return None,
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    // LinesCodec discards through the next newline on its own.
                    warn!(limit = self.max_length, "framer: oversized line discarded");
                    return Some(Frame::Oversized(self.max_length));
                }
                Err(LinesCodecError::Io(err)) => {
                    // Only invalid UTF-8 reaches here; the bad line is already consumed.
                    warn!(%err, "framer: undecodable line skipped");
                }
            }
        }
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineFramer {
    type Item = Frame;
    type Error = AppError;

    /// Return the next frame, or `None` while buffering.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        Ok(self.next_frame(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(frame) = self.next_frame(src) {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            debug!(bytes = src.len(), "framer: dropping unterminated tail at eof");
            src.clear();
        }
        Ok(None)
    }
}
