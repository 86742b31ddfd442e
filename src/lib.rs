//! # memline - A memcached Text-Protocol Front End
//!
//! memline serves the `get`, `gets` and `set` commands of the memcached
//! ASCII protocol over TCP. The cache itself sits behind the
//! [`Cache`](storage::Cache) trait; the crate ships a sharded in-memory
//! [`StorageEngine`] as the default implementation.
//!
//! ## Features
//!
//! - **memcached-compatible**: `get`/`gets`/`set` with `noreply`, relative
//!   and absolute expiration times
//! - **Streaming**: values are streamed out of cache items and payloads
//!   into set transactions without intermediate copies
//! - **Pipelining**: replies are batched until the client's input is drained
//! - **Graceful shutdown**: stopping the server waits for every connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              memline                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │ Cache trait             │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │  Text       │    │              StorageEngine                   │   │
//! │  │  protocol   │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │  framing    │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │   │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use memline::{Server, ServerConfig, StorageEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = memline::start_expiry_sweeper(Arc::clone(&storage));
//!
//!     let mut server = Server::new(storage, ServerConfig::new("127.0.0.1:11211"));
//!     server.serve().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: line framing, request parsing, reply frames
//! - [`commands`]: executes one request against the cache
//! - [`connection`]: per-client loop and flush policy
//! - [`server`]: listener, accept loop and lifecycle
//! - [`storage`]: the cache contract and the in-memory engine
//! - [`config`]: server settings and their defaults
//!
//! ## Design Highlights
//!
//! ### Fail-Closed Connections
//!
//! Any malformed request, unknown command or refused transaction closes the
//! connection after its error reply. A `set` that fails midway is never
//! committed.
//!
//! ### Lazy + Active Expiry
//!
//! Keys with an expiration are expired in two ways:
//! 1. **Lazy**: When a key is looked up, we check if it's expired
//! 2. **Active**: A background task periodically scans for expired keys

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandHandler};
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionStats};
pub use server::{Server, ServerError, ShutdownHandle};
pub use storage::{start_expiry_sweeper, Cache, ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port memline listens on (same as memcached)
pub const DEFAULT_PORT: u16 = 11211;

/// The default host memline binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of memline
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
