//! Line framing and tokenization.
//!
//! Requests are CRLF-terminated ASCII lines. Every parser in this crate
//! works on a line produced by [`read_line`] and pulls fields out of it with
//! [`next_token`]; tokens are slices of the line buffer, never copies.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt};

/// The line terminator used throughout the protocol
pub const CRLF: &[u8] = b"\r\n";

/// Why no request line could be read.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The peer closed the stream between requests.
    #[error("end of stream")]
    Eof,

    /// The peer closed the stream in the middle of a line.
    #[error("stream ended inside a request line")]
    Truncated,

    /// No CRLF within the configured line limit.
    #[error("request line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// The line ended with a bare `\n`.
    #[error("request line not terminated by CRLF")]
    MissingCr,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Reads one request line into `line`, without its CRLF.
///
/// `line` is cleared first and can be reused across requests. At most
/// `max_len` bytes of content are accepted.
pub async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>, max_len: usize) -> Result<(), FrameError>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();

    let limit = max_len.saturating_add(CRLF.len()) as u64;
    let n = (&mut *reader).take(limit).read_until(b'\n', line).await?;
    if n == 0 {
        return Err(FrameError::Eof);
    }

    if line.last() != Some(&b'\n') {
        return Err(if n as u64 == limit {
            FrameError::LineTooLong { limit: max_len }
        } else {
            FrameError::Truncated
        });
    }

    line.pop();
    if line.pop() != Some(b'\r') {
        return Err(FrameError::MissingCr);
    }
    Ok(())
}

/// Consumes exactly two bytes and checks that they are CRLF.
///
/// Returns `false` on any other bytes, on a short stream, or on an I/O error.
pub async fn read_crlf<R>(reader: &mut R) -> bool
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 2];
    match reader.read_exact(&mut buf).await {
        Ok(_) => buf[..] == *CRLF,
        Err(_) => false,
    }
}

/// Returns the next space-delimited token of `line` at or after `from`,
/// together with the index just past it.
///
/// Leading spaces are skipped. Returns `None` when only spaces (or nothing)
/// remain.
///
/// ```
/// use memline::protocol::framing::next_token;
///
/// let line = b"key 0  60 5";
/// let (key, n) = next_token(line, 0).unwrap();
/// assert_eq!((key, n), (&b"key"[..], 3));
/// let (_, n) = next_token(line, n).unwrap();
/// let (exptime, n) = next_token(line, n).unwrap();
/// assert_eq!(exptime, b"60");
/// assert_eq!(next_token(line, n).unwrap().1, line.len());
/// ```
pub fn next_token(line: &[u8], from: usize) -> Option<(&[u8], usize)> {
    let rest = line.get(from..)?;
    let start = from + rest.iter().position(|&b| b != b' ')?;
    let end = line[start..]
        .iter()
        .position(|&b| b == b' ')
        .map_or(line.len(), |i| start + i);
    Some((&line[start..end], end))
}
