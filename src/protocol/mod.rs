//! memcached Text Protocol Implementation
//!
//! This module implements the subset of the memcached ASCII protocol that
//! memline speaks: `get`, `gets` and `set`.
//!
//! ## Overview
//!
//! Requests are CRLF-terminated lines of space-separated tokens. A `set`
//! line is followed by a raw payload of the declared size and one more CRLF.
//!
//! ```text
//! get <key>[ <key>...]\r\n
//! gets <key>[ <key>...]\r\n
//! set <key> <flags> <exptime> <bytes>[ noreply]\r\n<payload>\r\n
//! ```
//!
//! ## Modules
//!
//! - `framing`: line reading, CRLF checks and the tokenizer
//! - `command`: verb classification and `set` field parsing
//! - `exptime`: memcached's relative/absolute expiration rule
//! - `types`: reply frames and `VALUE` streaming
//!
//! ## Example
//!
//! ```
//! use memline::protocol::{Request, SetCommand, Reply};
//!
//! let line = b"set greeting 0 60 5";
//! let Some(Request::Set(args)) = Request::classify(line) else { unreachable!() };
//! let cmd = SetCommand::parse(args).unwrap();
//! assert_eq!(cmd.payload_size(), Ok(5));
//!
//! assert_eq!(Reply::Stored.serialize(), b"STORED\r\n");
//! ```

pub mod command;
pub mod exptime;
pub mod framing;
pub mod types;

// Re-export commonly used types for convenience
pub use command::{keys, ParseError, Request, SetCommand};
pub use exptime::{resolve_exptime, resolve_exptime_at, MAX_RELATIVE_EXPTIME};
pub use framing::{next_token, read_crlf, read_line, FrameError, CRLF};
pub use types::{write_value, Reply};
