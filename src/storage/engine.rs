//! Thread-Safe In-Memory Cache Engine
//!
//! This module implements the reference [`Cache`] collaborator that the
//! `memline` binary serves. It is a sharded, concurrent HashMap with TTL
//! support, plus the item-handle and write-transaction types the protocol
//! engine talks to.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Instead of one big lock, we use multiple shards to reduce contention.
//! 2. **Lazy Expiry**: Keys are checked for expiry on access (lazy) plus background cleanup.
//! 3. **Staged Writes**: A `set` payload is accumulated in a private buffer and only
//!    inserted into its shard on commit, so readers never observe a partial value.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//!        ▲                                      ▲
//!        │ ItemReader (Bytes clone)             │ PendingSet::commit
//!     get/gets                                 set
//! ```
//!
//! Keys are distributed across shards using a hash function.
//! This allows multiple connections to read/write different keys concurrently.

use crate::storage::traits::{Cache, CacheItem, Expiration, Lookup, SetTxn, StorageError};
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, trace};

/// Number of shards for the storage engine.
/// More shards = less lock contention, but more memory overhead.
/// 64 is a good balance for most workloads.
const NUM_SHARDS: usize = 64;

/// Largest item accepted by default (same as memcached's `-I 1m`).
pub const DEFAULT_MAX_ITEM_SIZE: usize = 1024 * 1024;

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry with TTL.
    ///
    /// A TTL too large to represent as an `Instant` is treated as no expiry.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

/// Operation counters shared by the engine and its pending writes.
#[derive(Debug, Default)]
struct Counters {
    keys: AtomicU64,
    gets: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    expired: AtomicU64,
}

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    // A panic while holding a shard lock cannot leave a half-updated map
    // behind (every mutation is a single HashMap call), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces `key`. Returns `true` if the key is new.
    fn insert(&self, counters: &Counters, key: Bytes, entry: Entry) -> bool {
        let mut data = self.write();
        let is_new = data.insert(key, entry).is_none();
        // Counted under the lock so a concurrent removal cannot decrement first.
        if is_new {
            counters.keys.fetch_add(1, Ordering::Relaxed);
        }
        is_new
    }

    /// Removes `key`. Returns `true` if it was present.
    fn remove(&self, counters: &Counters, key: &[u8]) -> bool {
        let mut data = self.write();
        let removed = data.remove(key).is_some();
        if removed {
            counters.keys.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }
}

/// Database statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub hits: u64,
    pub misses: u64,
    pub set_ops: u64,
    pub expired: u64,
}

/// The in-memory cache served by the `memline` binary.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all connection tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use memline::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Arc<Shard>>,

    /// Shared with every `PendingSet` so commits are counted too
    counters: Arc<Counters>,

    /// Largest payload `begin_set` accepts
    max_item_size: usize,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("keys", &self.counters.keys.load(Ordering::Relaxed))
            .field("max_item_size", &self.max_item_size)
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new storage engine with default settings.
    pub fn new() -> Self {
        Self::with_max_item_size(DEFAULT_MAX_ITEM_SIZE)
    }

    /// Creates a storage engine that refuses items larger than `max_item_size` bytes.
    pub fn with_max_item_size(max_item_size: usize) -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Arc::new(Shard::default())).collect();

        Self {
            shards,
            counters: Arc::new(Counters::default()),
            max_item_size,
        }
    }

    /// Largest item this engine stores, in bytes.
    pub fn max_item_size(&self) -> usize {
        self.max_item_size
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Arc<Shard> {
        &self.shards[self.shard_index(key)]
    }

    /// Sets a key-value pair without expiry.
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.get_shard(&key)
            .insert(&self.counters, key, Entry::new(value))
    }

    /// Sets a key-value pair with a TTL (Time-To-Live).
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.get_shard(&key)
            .insert(&self.counters, key, Entry::with_ttl(value, ttl))
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// This implements "lazy expiry" - expired keys are detected and removed on access.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        let value = self.get_live(key);

        let counter = if value.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);

        value
    }

    fn get_live(&self, key: &[u8]) -> Option<Bytes> {
        let shard = self.get_shard(key);

        // First, try a read lock (fast path for existing, non-expired keys)
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut data = shard.write();
        if let Some(entry) = data.get(key) {
            if entry.is_expired() {
                data.remove(key);
                self.counters.keys.fetch_sub(1, Ordering::Relaxed);
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                trace!(key = ?String::from_utf8_lossy(key), "Lazily expired key");
                return None;
            }
            // Race: another connection may have replaced the key
            return Some(entry.value.clone());
        }

        None
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &[u8]) -> bool {
        self.get_shard(key)
            .read()
            .get(key)
            .map(|e| !e.is_expired())
            .unwrap_or(false)
    }

    /// Returns the approximate number of keys in the database.
    ///
    /// This is an approximation because it uses relaxed atomic ordering.
    pub fn len(&self) -> u64 {
        self.counters.keys.load(Ordering::Relaxed)
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        let c = &self.counters;
        StorageStats {
            keys: c.keys.load(Ordering::Relaxed),
            get_ops: c.gets.load(Ordering::Relaxed),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            set_ops: c.sets.load(Ordering::Relaxed),
            expired: c.expired.load(Ordering::Relaxed),
        }
    }

    /// Cleans up expired keys from all shards.
    ///
    /// This is called by the background expiry sweeper.
    /// Returns the number of keys that were cleaned up.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let before = data.len();

            data.retain(|_, entry| !entry.is_expired());

            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.counters.keys.fetch_sub(cleaned, Ordering::Relaxed);
            self.counters.expired.fetch_add(cleaned, Ordering::Relaxed);
        }

        cleaned
    }
}

impl Cache for StorageEngine {
    type Item = ItemReader;
    type Txn = PendingSet;

    fn lookup(&self, key: &[u8]) -> Lookup<ItemReader> {
        match self.get(key) {
            Some(value) => Lookup::Found(ItemReader::new(value)),
            None => Lookup::NotFound,
        }
    }

    fn begin_set(
        &self,
        key: &[u8],
        size: usize,
        expiration: Expiration,
    ) -> Result<PendingSet, StorageError> {
        if size > self.max_item_size {
            return Err(StorageError::ItemTooLarge {
                size,
                max: self.max_item_size,
            });
        }

        Ok(PendingSet {
            shard: Arc::clone(self.get_shard(key)),
            counters: Arc::clone(&self.counters),
            key: Bytes::copy_from_slice(key),
            staged: BytesMut::with_capacity(size),
            size,
            expiration,
        })
    }
}

/// Read handle for a stored value.
///
/// Holds a reference-counted clone of the value, so the shard lock is not
/// held while the payload is written to the client.
#[derive(Debug)]
pub struct ItemReader {
    cursor: Cursor<Bytes>,
}

impl ItemReader {
    fn new(value: Bytes) -> Self {
        Self {
            cursor: Cursor::new(value),
        }
    }
}

impl CacheItem for ItemReader {
    fn size(&self) -> usize {
        self.cursor.get_ref().len()
    }
}

impl AsyncRead for ItemReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().cursor).poll_read(cx, buf)
    }
}

impl AsyncBufRead for ItemReader {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        Pin::new(&mut self.get_mut().cursor).poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::new(&mut self.get_mut().cursor).consume(amt)
    }
}

/// A `set` in progress.
///
/// Payload bytes are staged privately; [`SetTxn::commit`] inserts the
/// finished value into its shard in one step. Dropping a `PendingSet`
/// without committing leaves the cache untouched.
#[derive(Debug)]
pub struct PendingSet {
    shard: Arc<Shard>,
    counters: Arc<Counters>,
    key: Bytes,
    staged: BytesMut,
    size: usize,
    expiration: Expiration,
}

impl AsyncWrite for PendingSet {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let remaining = this.size - this.staged.len();
        if buf.len() > remaining {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload exceeds declared size",
            )));
        }
        this.staged.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl SetTxn for PendingSet {
    fn commit(self) {
        let PendingSet {
            shard,
            counters,
            key,
            staged,
            size,
            expiration,
        } = self;

        if staged.len() != size {
            debug!(
                key = ?String::from_utf8_lossy(&key),
                staged = staged.len(),
                size,
                "Discarding incomplete set"
            );
            return;
        }

        counters.sets.fetch_add(1, Ordering::Relaxed);
        let value = staged.freeze();
        match expiration {
            Expiration::Never => {
                shard.insert(&counters, key, Entry::new(value));
            }
            Expiration::After(ttl) => {
                shard.insert(&counters, key, Entry::with_ttl(value, ttl));
            }
            // Storing an already-expired item is the same as evicting the old one.
            Expiration::Expired => {
                if shard.remove(&counters, &key) {
                    counters.expired.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
