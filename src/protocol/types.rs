//! Reply Frames
//!
//! This module defines the frames the server writes back to clients and
//! serializes them onto the connection's write buffer.
//!
//! ## Frame Format
//!
//! Every frame is an ASCII line terminated with CRLF (`\r\n`). A `VALUE`
//! frame is followed by the raw payload and another CRLF.
//!
//! ```text
//! VALUE <key> 0 <bytes>\r\n<payload>\r\n     one per hit of get/gets
//! END\r\n                                    closes every get/gets reply
//! STORED\r\n                                 set succeeded
//! ERROR\r\n                                  unknown command
//! CLIENT_ERROR <message>\r\n                 malformed request
//! SERVER_ERROR <message>\r\n                 cache refused the request
//! ```
//!
//! Flags are always written as `0` and `gets` never carries a CAS value.

use crate::protocol::framing::CRLF;
use crate::storage::CacheItem;
use std::fmt;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// A fixed-form reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// `STORED`
    Stored,

    /// `END`, terminating a `get`/`gets` reply
    End,

    /// Bare `ERROR` for an unrecognized command
    Error,

    /// `CLIENT_ERROR <message>`
    ClientError(&'static str),

    /// `SERVER_ERROR <message>`
    ServerError(&'static str),
}

impl Reply {
    /// Serializes the frame into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Stored => buf.extend_from_slice(b"STORED"),
            Reply::End => buf.extend_from_slice(b"END"),
            Reply::Error => buf.extend_from_slice(b"ERROR"),
            Reply::ClientError(msg) => {
                buf.extend_from_slice(b"CLIENT_ERROR ");
                buf.extend_from_slice(msg.as_bytes());
            }
            Reply::ServerError(msg) => {
                buf.extend_from_slice(b"SERVER_ERROR ");
                buf.extend_from_slice(msg.as_bytes());
            }
        }
        buf.extend_from_slice(CRLF);
    }

    /// Serializes the frame to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(32);
        self.serialize_into(&mut buf);
        buf
    }

    /// Writes the frame to `writer` without flushing it.
    pub async fn write_to<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.serialize()).await
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Stored => write!(f, "STORED"),
            Reply::End => write!(f, "END"),
            Reply::Error => write!(f, "ERROR"),
            Reply::ClientError(msg) => write!(f, "CLIENT_ERROR {}", msg),
            Reply::ServerError(msg) => write!(f, "SERVER_ERROR {}", msg),
        }
    }
}

/// Serializes the `VALUE <key> 0 <size>\r\n` header line.
pub fn value_header_into(key: &[u8], size: usize, buf: &mut Vec<u8>) {
    buf.extend_from_slice(b"VALUE ");
    buf.extend_from_slice(key);
    buf.extend_from_slice(b" 0 ");
    buf.extend_from_slice(size.to_string().as_bytes());
    buf.extend_from_slice(CRLF);
}

/// Writes one `VALUE` frame, streaming the payload out of `item`.
///
/// Fails with `InvalidData` if the item yields a different number of bytes
/// than it declared; the frame is unusable at that point and the caller
/// must drop the connection.
pub async fn write_value<W, I>(writer: &mut W, key: &[u8], item: &mut I) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    I: CacheItem,
{
    let size = item.size();

    let mut header = Vec::with_capacity(key.len() + 32);
    value_header_into(key, size, &mut header);
    writer.write_all(&header).await?;

    let mut streamed = 0usize;
    loop {
        let chunk = item.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let n = chunk.len();
        writer.write_all(chunk).await?;
        item.consume(n);
        streamed += n;
    }

    if streamed != size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("item yielded {} bytes, expected {}", streamed, size),
        ));
    }

    writer.write_all(CRLF).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncBufRead, AsyncRead, ReadBuf};

    /// An item whose declared size disagrees with its payload.
    struct LyingItem {
        declared: usize,
        payload: &'static [u8],
    }

    impl CacheItem for LyingItem {
        fn size(&self) -> usize {
            self.declared
        }
    }

    impl AsyncRead for LyingItem {
        fn poll_read(
            self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.get_mut().payload).poll_read(cx, buf)
        }
    }

    impl AsyncBufRead for LyingItem {
        fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
            Pin::new(&mut self.get_mut().payload).poll_fill_buf(cx)
        }

        fn consume(self: Pin<&mut Self>, amt: usize) {
            Pin::new(&mut self.get_mut().payload).consume(amt)
        }
    }

    #[test]
    fn test_fixed_frames() {
        assert_eq!(Reply::Stored.serialize(), b"STORED\r\n");
        assert_eq!(Reply::End.serialize(), b"END\r\n");
        assert_eq!(Reply::Error.serialize(), b"ERROR\r\n");
    }

    #[test]
    fn test_error_frames() {
        assert_eq!(
            Reply::ClientError("invalid size").serialize(),
            b"CLIENT_ERROR invalid size\r\n"
        );
        assert_eq!(
            Reply::ServerError("cannot start 'set' transaction").serialize(),
            b"SERVER_ERROR cannot start 'set' transaction\r\n"
        );
    }

    #[test]
    fn test_display_matches_wire() {
        let reply = Reply::ClientError("invalid exptime");
        assert_eq!(format!("{}\r\n", reply).into_bytes(), reply.serialize());
    }

    #[test]
    fn test_value_header() {
        let mut buf = Vec::new();
        value_header_into(b"foo", 42, &mut buf);
        assert_eq!(buf, b"VALUE foo 0 42\r\n");
    }

    #[tokio::test]
    async fn test_write_to_mock() {
        let mut mock = tokio_test::io::Builder::new()
            .write(b"CLIENT_ERROR unrecognized noreply\r\n")
            .build();
        Reply::ClientError("unrecognized noreply")
            .write_to(&mut mock)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_value() {
        let mut item = LyingItem {
            declared: 5,
            payload: b"hello",
        };
        let mut out = Vec::new();

        write_value(&mut out, b"k", &mut item).await.unwrap();
        assert_eq!(out, b"VALUE k 0 5\r\nhello\r\n");
    }

    #[tokio::test]
    async fn test_write_value_size_mismatch() {
        let mut item = LyingItem {
            declared: 10,
            payload: b"hello",
        };
        let mut out = Vec::new();

        let err = write_value(&mut out, b"k", &mut item).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!out.ends_with(CRLF));
    }

    #[tokio::test]
    async fn test_write_value_propagates_write_errors() {
        let mut mock = tokio_test::io::Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let mut item = LyingItem {
            declared: 1,
            payload: b"x",
        };

        let err = write_value(&mut mock, b"k", &mut item).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
