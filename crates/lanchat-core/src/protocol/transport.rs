//! Line framing over a byte stream.
//!
//! TCP delivers a byte stream, not messages: one `read` may return half a
//! line, or three lines and the start of a fourth. The original transport
//! assumption of "one receive call equals one message" is a correctness bug,
//! so this layer buffers partial reads until a `\n` delimiter is seen and
//! only then hands a decoded [`Frame`] to the caller.
//!
//! A trailing `\r` is tolerated (telnet-style clients send `\r\n`). Invalid
//! UTF-8 is replaced rather than treated as fatal. Lines longer than
//! [`MAX_LINE_BYTES`] are rejected so a misbehaving peer cannot grow the
//! buffer without bound.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::protocol::frame::{Frame, ProtocolError};
use thiserror::Error;

/// Upper bound on one inbound line, delimiter included.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

/// Errors produced by the framing layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An I/O error on the underlying stream.
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote side sent more than [`MAX_LINE_BYTES`] without a delimiter.
    #[error("inbound line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// The outbound frame could not be encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Buffered frame reader over any byte stream.
///
/// Returns `Ok(None)` on clean EOF, which both read loops treat as an
/// ordinary disconnect rather than a fault.
pub struct FrameReader<R> {
    inner: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            inner: BufReader::new(stream),
            buf: Vec::with_capacity(256),
        }
    }

    /// Reads bytes until the next delimiter and decodes the line.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] for stream failures and
    /// [`TransportError::LineTooLong`] when the cap is exceeded before a
    /// delimiter arrives.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        self.buf.clear();

        // `take` caps how much one frame may pull from the stream; a fresh
        // limit is applied per call so long conversations are unaffected.
        let mut limited = (&mut self.inner).take(MAX_LINE_BYTES as u64 + 1);
        let n = limited.read_until(b'\n', &mut self.buf).await?;

        if n == 0 {
            return Ok(None);
        }
        if self.buf.last() != Some(&b'\n') && self.buf.len() > MAX_LINE_BYTES {
            return Err(TransportError::LineTooLong {
                limit: MAX_LINE_BYTES,
            });
        }

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }

        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(Frame::decode(&line)))
    }
}

/// Encodes `frame`, appends the delimiter, and writes the whole line.
///
/// # Errors
///
/// Returns [`TransportError::Protocol`] if the frame cannot be encoded and
/// [`TransportError::Io`] for stream failures.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &Frame,
) -> Result<(), TransportError> {
    let mut line = frame.encode()?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
