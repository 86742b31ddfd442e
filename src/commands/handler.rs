//! Command Executor
//!
//! Runs one request at a time against the cache: reads the request line,
//! dispatches on the verb, talks to the [`Cache`] and writes the reply
//! frames. Replies go into the caller's (buffered) writer; flushing is the
//! connection loop's business.
//!
//! ## Request Flow
//!
//! ```text
//! read_line ──> classify ──┬── get/gets ──> lookup each key ──> VALUE* END
//!                          ├── set ──> parse ──> exptime ──> begin_set
//!                          │            ──> payload ──> CRLF ──> commit ──> STORED
//!                          └── other ──> ERROR
//! ```
//!
//! Any failure ends the connection. Failures that the client should hear
//! about (`ERROR`, `CLIENT_ERROR`, `SERVER_ERROR`) get their frame written
//! before [`CommandHandler::execute`] returns the error.

use crate::config::DEFAULT_MAX_LINE_LEN;
use crate::protocol::{
    keys, read_crlf, read_line, resolve_exptime, write_value, FrameError, ParseError, Reply,
    Request, SetCommand,
};
use crate::storage::{Cache, Lookup, SetTxn};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, error, trace, warn};

const CANNOT_READ_PAYLOAD: &str = "cannot read payload";
const UNEXPECTED_PAYLOAD_SIZE: &str = "unexpected payload size";
const MISSING_PAYLOAD_CRLF: &str = "cannot read crlf after payload";
const CANNOT_START_SET: &str = "cannot start 'set' transaction";

/// Why a request ended the connection.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No request line could be read.
    #[error("no request: {0}")]
    Frame(#[from] FrameError),

    /// The request line was empty.
    #[error("empty request line")]
    EmptyLine,

    /// The verb is not `get`, `gets` or `set`.
    #[error("unrecognized command")]
    UnknownCommand,

    /// The `set` line is malformed.
    #[error("malformed set: {0}")]
    Parse(#[from] ParseError),

    /// The `set` payload or its terminator is wrong.
    #[error("client error: {0}")]
    Client(&'static str),

    /// The cache refused the request.
    #[error("server error: {0}")]
    Server(&'static str),

    /// Writing the reply failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CommandError {
    /// The frame owed to the client for this error, if any.
    pub fn reply(&self) -> Option<Reply> {
        match self {
            CommandError::UnknownCommand => Some(Reply::Error),
            CommandError::Parse(e) => Some(Reply::ClientError(e.client_message())),
            CommandError::Client(msg) => Some(Reply::ClientError(msg)),
            CommandError::Server(msg) => Some(Reply::ServerError(msg)),
            CommandError::Frame(_) | CommandError::EmptyLine | CommandError::Io(_) => None,
        }
    }

    /// True when the peer simply went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            CommandError::Frame(FrameError::Eof) => true,
            CommandError::Frame(FrameError::Io(e)) | CommandError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// True for errors caused by a malformed request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CommandError::UnknownCommand | CommandError::Parse(_) | CommandError::Client(_)
        )
    }
}

/// Executes requests from one connection against a shared cache.
///
/// Each connection owns its own handler (and with it the reusable line
/// buffer); the cache behind the `Arc` is shared by all of them.
pub struct CommandHandler<C> {
    cache: Arc<C>,
    line: Vec<u8>,
    max_line_len: usize,
}

impl<C: Cache> CommandHandler<C> {
    /// Creates a handler that accepts request lines of up to `max_line_len` bytes.
    ///
    /// A limit of 0 means unset and selects [`DEFAULT_MAX_LINE_LEN`].
    pub fn new(cache: Arc<C>, max_line_len: usize) -> Self {
        let max_line_len = if max_line_len == 0 {
            DEFAULT_MAX_LINE_LEN
        } else {
            max_line_len
        };
        Self {
            cache,
            line: Vec::with_capacity(1024),
            max_line_len,
        }
    }

    /// Reads and executes exactly one request.
    ///
    /// `Ok(())` means the request was answered and the connection can carry
    /// on. On `Err` the connection must be closed; any reply frame the error
    /// calls for has already been written to `writer`.
    pub async fn execute<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<(), CommandError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.process(reader, writer).await;

        if let Err(e) = &result {
            if let Some(reply) = e.reply() {
                if let Err(io_err) = reply.write_to(writer).await {
                    trace!(error = %io_err, reply = %reply, "Could not send error reply");
                }
            }
        }

        result
    }

    async fn process<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<(), CommandError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        read_line(reader, &mut self.line, self.max_line_len).await?;
        if self.line.is_empty() {
            return Err(CommandError::EmptyLine);
        }

        let Some(request) = Request::classify(&self.line) else {
            debug!(line = %String::from_utf8_lossy(&self.line), "Unrecognized command");
            return Err(CommandError::UnknownCommand);
        };
        trace!(command = request.name(), "Executing request");

        let cache = &*self.cache;
        match request {
            Request::Get(args) | Request::Gets(args) => execute_get(cache, writer, args).await,
            Request::Set(args) => execute_set(cache, reader, writer, args).await,
        }
    }
}

/// `get`/`gets`: one `VALUE` frame per hit, then `END`.
async fn execute_get<C, W>(cache: &C, writer: &mut W, args: &[u8]) -> Result<(), CommandError>
where
    C: Cache,
    W: AsyncWrite + Unpin,
{
    for key in keys(args) {
        match cache.lookup(key) {
            Lookup::Found(mut item) => write_value(writer, key, &mut item).await?,
            Lookup::NotFound => trace!(key = %String::from_utf8_lossy(key), "Miss"),
            Lookup::Failure(e) => {
                // The cache contract rules this out; serving on top of a
                // broken cache is worse than restarting.
                error!(
                    key = %String::from_utf8_lossy(key),
                    error = %e,
                    "Cache lookup failed, aborting"
                );
                std::process::abort();
            }
        }
    }

    Reply::End.write_to(writer).await?;
    Ok(())
}

/// `set`: stage the payload in a cache transaction, commit, reply `STORED`.
async fn execute_set<C, R, W>(
    cache: &C,
    reader: &mut R,
    writer: &mut W,
    args: &[u8],
) -> Result<(), CommandError>
where
    C: Cache,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let cmd = SetCommand::parse(args)?;
    let expiration = resolve_exptime(cmd.exptime)?;
    let size = cmd.payload_size()?;
    let noreply = cmd.is_noreply()?;

    let mut txn = cache.begin_set(cmd.key, size, expiration).map_err(|e| {
        warn!(
            key = %String::from_utf8_lossy(cmd.key),
            size,
            ?expiration,
            error = %e,
            "Cannot start set transaction"
        );
        CommandError::Server(CANNOT_START_SET)
    })?;

    // An uncommitted txn is discarded on drop, so every early return below
    // leaves the cache as it was.
    let mut payload = (&mut *reader).take(size as u64);
    let copied = match tokio::io::copy_buf(&mut payload, &mut txn).await {
        Ok(n) => n,
        Err(e) => {
            debug!(key = %String::from_utf8_lossy(cmd.key), size, error = %e, "Error reading payload");
            return Err(CommandError::Client(CANNOT_READ_PAYLOAD));
        }
    };
    if copied != size as u64 {
        debug!(copied, expected = size, "Short payload");
        return Err(CommandError::Client(UNEXPECTED_PAYLOAD_SIZE));
    }

    if !read_crlf(reader).await {
        return Err(CommandError::Client(MISSING_PAYLOAD_CRLF));
    }

    txn.commit();
    trace!(key = %String::from_utf8_lossy(cmd.key), size, noreply, "Stored");

    if !noreply {
        Reply::Stored.write_to(writer).await?;
    }
    Ok(())
}
