//! The cache collaborator contract.
//!
//! The protocol engine never stores anything itself. Every `get` and `set`
//! is translated into calls against a [`Cache`], which owns item storage,
//! eviction and expiry enforcement. Implementations must be safe to share
//! across any number of connection tasks without external locking.
//!
//! ```text
//!   get k  ──> Cache::lookup(k) ──> Lookup::Found(item) ──> stream item.size() bytes
//!   set k  ──> Cache::begin_set(k, size, exp) ──> txn ──> write size bytes ──> txn.commit()
//! ```

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncWrite};

/// How long a newly written item should live.
///
/// Produced by [`crate::protocol::exptime::resolve_exptime`] from the
/// `exptime` field of a `set` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// No expiry (`exptime == 0`).
    Never,
    /// Expires once this much time has passed.
    After(Duration),
    /// Already expired: a negative relative value, or an absolute timestamp
    /// that is not in the future. The cache must treat this as an immediate
    /// expiry hint, not as an error.
    Expired,
}

/// Errors reported by a [`Cache`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The item cannot be stored because it exceeds the cache's size limit.
    #[error("item of {size} bytes exceeds the maximum of {max} bytes")]
    ItemTooLarge { size: usize, max: usize },

    /// Any other collaborator-side failure.
    #[error("{0}")]
    Internal(String),
}

/// Result of a cache lookup.
///
/// Misses are an ordinary outcome and must not be confused with failures,
/// so they get their own variant instead of an error sentinel.
#[derive(Debug)]
pub enum Lookup<I> {
    Found(I),
    NotFound,
    Failure(StorageError),
}

/// A readable handle to a stored item.
///
/// The handle is held only while its payload is being written to one
/// response and is released by dropping it.
pub trait CacheItem: AsyncBufRead + Unpin + Send {
    /// Number of payload bytes the handle will yield.
    fn size(&self) -> usize;
}

/// A pending write of exactly `size` bytes, opened by [`Cache::begin_set`].
///
/// Bytes written through [`AsyncWrite`] are staged; nothing becomes visible
/// to readers until [`SetTxn::commit`] is called. Dropping the transaction
/// without committing discards the staged bytes.
pub trait SetTxn: AsyncWrite + Unpin + Send {
    /// Publishes the staged item atomically.
    fn commit(self);
}

/// The storage capability injected into every connection.
pub trait Cache: Send + Sync + 'static {
    type Item: CacheItem;
    type Txn: SetTxn;

    /// Looks up `key`.
    fn lookup(&self, key: &[u8]) -> Lookup<Self::Item>;

    /// Opens a write transaction for `key` that will receive exactly `size`
    /// payload bytes.
    fn begin_set(
        &self,
        key: &[u8],
        size: usize,
        expiration: Expiration,
    ) -> Result<Self::Txn, StorageError>;
}
