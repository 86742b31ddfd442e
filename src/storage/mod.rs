//! Storage Module
//!
//! This module defines the capability contract between the protocol engine
//! and the cache it fronts, and ships the in-memory cache the server binary
//! uses by default.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐         ┌─────────────────────────────────────┐
//! │   CommandHandler     │ ──────> │  trait Cache (traits.rs)            │
//! │  (commands module)   │         │    lookup()    -> Lookup<Item>      │
//! └──────────────────────┘         │    begin_set() -> Txn               │
//!                                  └──────────────────┬──────────────────┘
//!                                                     │ impl
//!                                  ┌──────────────────▼──────────────────┐
//!                                  │  StorageEngine (engine.rs)          │
//!                                  │  64 x RwLock<HashMap> shards        │
//!                                  └──────────────────▲──────────────────┘
//!                                                     │
//!                                  ┌──────────────────┴──────────────────┐
//!                                  │  ExpirySweeper (expiry.rs)          │
//!                                  │  background Tokio task              │
//!                                  └─────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use memline::storage::{Cache, Expiration, Lookup, StorageEngine};
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"));
//!
//! assert!(matches!(engine.lookup(b"name"), Lookup::Found(_)));
//! assert!(matches!(engine.lookup(b"other"), Lookup::NotFound));
//! assert!(engine.begin_set(b"big", 10 << 20, Expiration::Never).is_err());
//! ```

pub mod engine;
pub mod expiry;
pub mod traits;

// Re-export commonly used types
pub use engine::{Entry, ItemReader, PendingSet, StorageEngine, StorageStats, DEFAULT_MAX_ITEM_SIZE};
pub use expiry::{start_expiry_sweeper, ExpiryConfig, ExpirySweeper};
pub use traits::{Cache, CacheItem, Expiration, Lookup, SetTxn, StorageError};
