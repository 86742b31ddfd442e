//! Command Handler Module
//!
//! This module implements the command processing layer for memline.
//! It reads one request off the connection, executes it against a
//! [`Cache`](crate::storage::Cache), and writes the reply frames.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line framing   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Classify     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Cache       │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `get <key>*`, `gets <key>*`: one `VALUE` frame per hit, then `END`
//! - `set <key> <flags> <exptime> <bytes> [noreply]`: replies `STORED`
//!
//! Anything else is answered with `ERROR` and the connection is closed.

pub mod handler;

// Re-export the main command handler
pub use handler::{CommandError, CommandHandler};
