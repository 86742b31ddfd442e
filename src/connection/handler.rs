//! Connection Handler Module
//!
//! This module handles individual client connections to memline.
//! Each client gets its own handler task that runs in a loop,
//! executing one request at a time until something ends the connection.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute one request     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Input buffer drained?   │ │
//!    │  │   yes: flush replies    │ │
//!    │  │   no:  keep batching    │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / protocol error / I/O error
//!        │
//!        ▼
//! 5. Pending replies flushed, socket shut down, task ends
//! ```
//!
//! ## Buffer Management
//!
//! Reads go through a `BufReader` and replies through a `BufWriter`, both
//! sized from [`ServerConfig`]. Replies are flushed only once the read
//! buffer holds no further request bytes, so a pipelined burst of requests
//! is answered with as few writes as possible, while a client waiting on
//! its last request always gets its reply.

use crate::commands::{CommandError, CommandHandler};
use crate::config::ServerConfig;
use crate::storage::Cache;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, trace, warn};

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests answered successfully
    pub commands_processed: AtomicU64,
    /// Connections closed because of a malformed request
    pub client_errors: AtomicU64,
    /// Connections closed because the cache refused a request
    pub server_errors: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_error(&self) {
        self.client_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn server_error(&self) {
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Owns the buffered read and write halves of one connection plus the
/// per-connection [`CommandHandler`].
pub struct ConnectionHandler<C, R, W> {
    /// Buffered request stream
    reader: BufReader<R>,

    /// Buffered reply stream
    writer: BufWriter<W>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Executes the requests read from this connection
    command_handler: CommandHandler<C>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<C, R, W> ConnectionHandler<C, R, W>
where
    C: Cache,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `reader` - The read half of the connection
    /// * `writer` - The write half of the connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing requests
    /// * `stats` - Shared connection statistics
    /// * `config` - Supplies the buffer capacities; zero sizes get the defaults
    pub fn new(
        reader: R,
        writer: W,
        addr: SocketAddr,
        command_handler: CommandHandler<C>,
        stats: Arc<ConnectionStats>,
        config: &ServerConfig,
    ) -> Self {
        stats.connection_opened();

        let config = config.clone().with_defaults();
        Self {
            reader: BufReader::with_capacity(config.read_buffer_size, reader),
            writer: BufWriter::with_capacity(config.write_buffer_size, writer),
            addr,
            command_handler,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Executes requests until the client disconnects or a request ends the
    /// connection, then flushes whatever replies are still buffered and
    /// shuts the write side down. A plain disconnect is `Ok(())`.
    pub async fn run(mut self) -> Result<(), CommandError> {
        debug!(client = %self.addr, "Client connected");

        let err = self.main_loop().await;

        if let Err(e) = self.writer.shutdown().await {
            trace!(client = %self.addr, error = %e, "Could not flush on close");
        }
        self.stats.connection_closed();

        if err.is_disconnect() {
            debug!(client = %self.addr, "Client disconnected");
            return Ok(());
        }

        match &err {
            e if e.is_client_error() => {
                self.stats.client_error();
                debug!(client = %self.addr, error = %e, "Closing connection after client error");
            }
            CommandError::Server(_) => {
                self.stats.server_error();
                warn!(client = %self.addr, error = %err, "Closing connection after server error");
            }
            CommandError::Io(_) => {
                warn!(client = %self.addr, error = %err, "Connection error");
            }
            _ => {
                debug!(client = %self.addr, error = %err, "Protocol violation, closing connection");
            }
        }

        Err(err)
    }

    /// The execute-flush loop. Only returns once a request fails.
    async fn main_loop(&mut self) -> CommandError {
        loop {
            if let Err(e) = self
                .command_handler
                .execute(&mut self.reader, &mut self.writer)
                .await
            {
                return e;
            }
            self.stats.command_processed();

            if self.reader.buffer().is_empty() {
                if let Err(e) = self.writer.flush().await {
                    return e.into();
                }
                trace!(client = %self.addr, "Flushed replies");
            }
        }
    }
}

/// Handles a client connection.
///
/// This is a convenience function that splits the stream, creates a
/// ConnectionHandler and runs it to completion. The outcome has already
/// been logged by the handler.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing requests
/// * `stats` - Shared connection statistics
/// * `config` - Buffer sizes for this connection
pub async fn handle_connection<C: Cache>(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler<C>,
    stats: Arc<ConnectionStats>,
    config: ServerConfig,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(client = %addr, error = %e, "Could not set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    let handler = ConnectionHandler::new(reader, writer, addr, command_handler, stats, &config);
    let _ = handler.run().await;
}
