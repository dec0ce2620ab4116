//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the core key-value store for linekv.
//! All state lives in one `HashMap` behind a single `RwLock`.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: Every operation, including the read-modify-write of
//!    `incr_by`, runs inside one critical section on the same lock.
//! 2. **Generations**: Every write stamps the entry with a fresh number taken
//!    from a store-wide counter. Deferred expiry is keyed on that number, so a
//!    later overwrite or delete turns an old deferred deletion into a no-op.
//! 3. **Lazy Expiry**: An entry past its deadline is invisible to readers even
//!    if the scheduler has not removed it yet.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                StorageEngine                 │
//! │  ┌────────────────────────────────────────┐  │
//! │  │ RwLock                                 │  │
//! │  │   entries: HashMap<String, Entry>      │  │
//! │  │   next_generation: u64                 │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//!        ▲ shared reads          ▲ exclusive writes
//!   GET / EXISTS / snapshot   SET / DELETE / INCR / expiry
//! ```

use crate::storage::expiry::ExpiryRegistration;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;

/// Errors returned by store operations.
///
/// The `Display` text is what clients see on the wire.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The stored value is not a base-10 integer
    #[error("NON-INTEGER VALUE")]
    NonIntegerValue,

    /// The increment would leave the `i64` range
    #[error("INTEGER OVERFLOW")]
    Overflow,
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The actual value stored
    pub value: String,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
    /// Write generation this entry was created by
    pub generation: u64,
}

impl Entry {
    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

/// Lock-protected state.
#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

impl Inner {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Returns the live entry for `key`, dropping it first if it has expired.
    fn live_entry_mut(&mut self, key: &str, expired_count: &AtomicU64) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(Entry::is_expired) {
            self.entries.remove(key);
            expired_count.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        self.entries.get_mut(key)
    }
}

/// The main storage engine for linekv.
///
/// Wrap it in an `Arc` and share it between every connection task and the
/// expiry scheduler. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use linekv::storage::StorageEngine;
///
/// let engine = StorageEngine::new();
///
/// engine.set("name".to_string(), "linekv".to_string(), None);
/// assert_eq!(engine.get("name"), Some("linekv".to_string()));
///
/// assert_eq!(engine.incr_by("hits", 1), Ok(1));
/// assert!(engine.delete("hits"));
/// assert!(!engine.exists("hits"));
/// ```
#[derive(Debug, Default)]
pub struct StorageEngine {
    inner: RwLock<Inner>,

    /// Statistics: number of keys removed because their TTL elapsed
    expired_count: AtomicU64,
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        Self::default()
    }

    // A panic in one connection task must not take the store down for all
    // the others, so poisoned locks are recovered.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets a key, overwriting any previous value and TTL.
    ///
    /// With a `ttl` the entry expires after that duration and the returned
    /// registration should be handed to the
    /// [`ExpiryScheduler`](crate::storage::ExpiryScheduler). Any registration
    /// issued for an earlier write of the same key becomes stale. A `ttl`
    /// too large to express as an [`Instant`] leaves the key permanent.
    pub fn set(&self, key: String, value: String, ttl: Option<Duration>) -> Option<ExpiryRegistration> {
        let mut inner = self.write();
        let generation = inner.next_generation();
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));

        let registration = expires_at.map(|fire_at| ExpiryRegistration {
            fire_at,
            generation,
            key: key.clone(),
        });

        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                generation,
            },
        );

        registration
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An empty string
    /// is a regular value and comes back as `Some("")`.
    pub fn get(&self, key: &str) -> Option<String> {
        // Fast path: shared lock for live or missing keys
        {
            let inner = self.read();
            match inner.entries.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired - take the write lock to drop it. Another writer may have
        // replaced it in between, which live_entry_mut re-checks.
        let mut inner = self.write();
        inner
            .live_entry_mut(key, &self.expired_count)
            .map(|entry| entry.value.clone())
    }

    /// Deletes a key.
    ///
    /// Returns `true` if a live key was removed. Pending expiry for the key
    /// becomes a no-op.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.write();
        match inner.entries.remove(key) {
            Some(entry) if entry.is_expired() => {
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                false
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &str) -> bool {
        let inner = self.read();
        inner.entries.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Adds `delta` to the integer stored at `key` and returns the new value.
    ///
    /// A missing key counts as `0`. The whole read-modify-write happens under
    /// the write lock, so concurrent increments never lose updates. On error
    /// the stored value is left untouched. An existing TTL is kept.
    pub fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
        let mut inner = self.write();

        if let Some(entry) = inner.live_entry_mut(key, &self.expired_count) {
            let current: i64 = entry
                .value
                .parse()
                .map_err(|_| StorageError::NonIntegerValue)?;
            let new_value = current.checked_add(delta).ok_or(StorageError::Overflow)?;
            entry.value = new_value.to_string();
            return Ok(new_value);
        }

        let generation = inner.next_generation();
        inner.entries.insert(
            key.to_string(),
            Entry {
                value: delta.to_string(),
                expires_at: None,
                generation,
            },
        );
        Ok(delta)
    }

    /// Removes `key` only if it still carries `generation`.
    ///
    /// This is the re-validation step of a deferred expiry: if the key has
    /// been overwritten, deleted or re-created since the registration was
    /// issued, nothing happens.
    pub fn expire_if_generation(&self, key: &str, generation: u64) -> bool {
        let mut inner = self.write();
        if inner.entries.get(key).is_some_and(|e| e.generation == generation) {
            inner.entries.remove(key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, generation, "Expired key removed");
            true
        } else {
            false
        }
    }

    /// Returns true if `key` is still held by the write that had `generation`.
    pub fn is_current(&self, key: &str, generation: u64) -> bool {
        self.read()
            .entries
            .get(key)
            .is_some_and(|e| e.generation == generation)
    }

    /// Returns a point-in-time copy of every live key/value pair.
    ///
    /// Keys come back sorted. TTLs are not part of the view.
    pub fn snapshot_view(&self) -> BTreeMap<String, String> {
        let inner = self.read();
        let now = Instant::now();
        inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Loads entries as permanent keys, overwriting existing ones.
    ///
    /// Returns the number of entries loaded.
    pub fn restore<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut inner = self.write();
        let mut loaded = 0;
        for (key, value) in entries {
            let generation = inner.next_generation();
            inner.entries.insert(
                key,
                Entry {
                    value,
                    expires_at: None,
                    generation,
                },
            );
            loaded += 1;
        }
        loaded
    }

    /// Returns the number of stored entries, including expired ones not yet
    /// removed.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns store statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Number of entries currently stored
    pub keys: usize,
    /// Total keys removed by expiry
    pub expired: u64,
}
