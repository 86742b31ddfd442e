//! Connection Handler Module
//!
//! This module manages individual client connections to memline.
//! Each client connection is handled by its own async task; connections
//! share nothing but the cache and the statistics counters.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ BufReader   │───>│ Execute req │───>│ BufWriter   │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                               │             │
//! │                                               ▼             │
//! │                                   ┌──────────────────────┐  │
//! │                                   │ flush when input is  │  │
//! │                                   │ drained              │  │
//! │                                   └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Async I/O**: Uses Tokio for non-blocking network operations
//! - **Pipelining**: Replies to buffered requests are batched into one write
//! - **Statistics**: Tracks connection, command and error counters
//!
//! ## Example
//!
//! ```ignore
//! use memline::commands::CommandHandler;
//! use memline::connection::{handle_connection, ConnectionStats};
//! use memline::storage::StorageEngine;
//! use memline::ServerConfig;
//! use std::sync::Arc;
//!
//! let storage = Arc::new(StorageEngine::new());
//! let stats = Arc::new(ConnectionStats::new());
//! let config = ServerConfig::default();
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! let handler = CommandHandler::new(Arc::clone(&storage), config.max_line_len);
//! tokio::spawn(handle_connection(stream, addr, handler, stats, config));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionHandler, ConnectionStats};
