//! Server lifecycle.
//!
//! A [`Server`] owns the listening socket and the accept loop. Every
//! accepted connection runs in its own task; the accept loop keeps track of
//! them in a [`JoinSet`] so that stopping the server also waits for every
//! connection to reach its natural end.
//!
//! ```text
//!  start ──> bind ──> spawn accept loop ──> return local address
//!
//!  accept loop:  accept ──> spawn connection ──> accept ...
//!                   │
//!    shutdown signal or accept error
//!                   │
//!                   ▼
//!     close listener ──> drain connections ──> exit
//!
//!  wait:  until the accept loop exits
//!  stop:  signal shutdown, then wait
//! ```

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::Cache;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// Errors returned by the server lifecycle methods.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// `start` was called on a running server.
    #[error("server is already running")]
    AlreadyRunning,

    /// `wait` or `stop` was called on a server that is not running.
    #[error("server is not running")]
    NotRunning,

    /// The accept loop stopped because accepting failed.
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// The accept loop task panicked.
    #[error("accept loop task failed: {0}")]
    Task(#[from] JoinError),
}

/// Triggers a graceful shutdown of a [`Server`] from anywhere.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Stops accepting new connections. Open connections are left to finish.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }
}

struct Running {
    local_addr: SocketAddr,
    accept_task: JoinHandle<io::Result<()>>,
}

/// A memcached text-protocol server over a shared [`Cache`].
pub struct Server<C> {
    cache: Arc<C>,
    config: ServerConfig,
    stats: Arc<ConnectionStats>,
    shutdown: Arc<watch::Sender<bool>>,
    running: Option<Running>,
}

impl<C: Cache> Server<C> {
    /// Creates a stopped server. Unset config fields get their defaults.
    pub fn new(cache: Arc<C>, config: ServerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            cache,
            config: config.with_defaults(),
            stats: Arc::new(ConnectionStats::new()),
            shutdown: Arc::new(shutdown),
            running: None,
        }
    }

    /// Binds the listen address and spawns the accept loop.
    ///
    /// Returns as soon as the socket is listening, with the bound address
    /// (useful when listening on port 0).
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.listen_addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: self.config.listen_addr.clone(),
            source,
        })?;

        let shutdown_rx = self.shutdown.subscribe();

        let accept_task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.cache),
            self.config.clone(),
            Arc::clone(&self.stats),
            shutdown_rx,
        ));

        info!(addr = %local_addr, "Server listening");
        self.running = Some(Running {
            local_addr,
            accept_task,
        });
        Ok(local_addr)
    }

    /// Waits until the accept loop has exited and every connection it
    /// spawned has finished.
    ///
    /// Returns `Ok(())` after a shutdown request, or the error that made
    /// accepting fail.
    pub async fn wait(&mut self) -> Result<(), ServerError> {
        let running = self.running.as_mut().ok_or(ServerError::NotRunning)?;
        let joined = (&mut running.accept_task).await;
        self.running = None;
        // Re-arm the signal so the server can be started again.
        self.shutdown.send_replace(false);

        match joined {
            Ok(Ok(())) => {
                info!("Server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::Accept(e)),
            Err(e) => {
                error!(error = %e, "Accept loop task failed");
                Err(ServerError::Task(e))
            }
        }
    }

    /// Closes the listening socket and waits for all connections to finish.
    ///
    /// Connections are not interrupted: a client that never disconnects
    /// keeps this waiting.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        if self.running.is_none() {
            return Err(ServerError::NotRunning);
        }
        self.shutdown.send_replace(true);
        self.wait().await
    }

    /// Starts the server and waits for it to stop.
    pub async fn serve(&mut self) -> Result<(), ServerError> {
        self.start().await?;
        self.wait().await
    }

    /// Returns a handle that stops this server.
    ///
    /// A shutdown requested while the server is stopped applies to its next
    /// run, which then exits right after binding.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown),
        }
    }

    /// The bound address while the server is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Connection counters, shared with the running connections.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }
}

/// Accepts connections until shutdown is signalled or accepting fails,
/// then waits for every spawned connection.
async fn accept_loop<C: Cache>(
    listener: TcpListener,
    cache: Arc<C>,
    config: ServerConfig,
    stats: Arc<ConnectionStats>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let mut connections = JoinSet::new();

    let result = loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    trace!(client = %addr, "Accepted connection");
                    let handler = CommandHandler::new(Arc::clone(&cache), config.max_line_len);
                    connections.spawn(handle_connection(
                        stream,
                        addr,
                        handler,
                        Arc::clone(&stats),
                        config.clone(),
                    ));
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed, no longer accepting connections");
                    break Err(e);
                }
            },
            // A dropped sender also ends the loop.
            _ = shutdown.wait_for(|&stop| stop) => {
                debug!("Shutdown requested");
                break Ok(());
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_connection_exit(joined);
            }
        }
    };

    drop(listener);
    if !connections.is_empty() {
        info!(connections = connections.len(), "Waiting for open connections to close");
    }
    while let Some(joined) = connections.join_next().await {
        log_connection_exit(joined);
    }

    result
}

fn log_connection_exit(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Connection task panicked");
    }
}
