//! Per-type wrapper cache.
//!
//! Maps a concrete request type to the single wrapper used for it. Entries
//! are never evicted: the set of request types in a process is fixed.
//!
//! # Get-or-create
//!
//! ```text
//! read lock ── hit ──────────────────────────────► Arc<W>
//!     │
//!    miss
//!     │
//!     ▼
//! build wrapper (no lock held)
//!     │
//!     ▼
//! write lock ── entry vacant ── insert ──────────► Arc<W> (ours)
//!     │
//!  occupied (another caller won the race)
//!     │
//!     ▼
//! discard ours ──────────────────────────────────► Arc<W> (theirs)
//! ```
//!
//! Callers only ever see wrappers that are fully built and installed, and
//! every caller for a given type converges on the same instance.

use std::any::TypeId;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Concurrent `TypeId` → `Arc<W>` map with get-or-create semantics.
pub struct WrapperCache<W: ?Sized> {
    entries: RwLock<HashMap<TypeId, Arc<W>>>,
    installed: AtomicU64,
    discarded: AtomicU64,
}

impl<W: ?Sized> WrapperCache<W> {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            installed: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Look up the wrapper for `key` without creating one.
    #[must_use]
    pub fn get(&self, key: TypeId) -> Option<Arc<W>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Return the cached wrapper for `key`, building it with `build` on first use.
    ///
    /// `build` runs without any lock held and may run on several threads for
    /// the same key; only the first result to be installed is kept.
    pub fn get_or_insert_with(&self, key: TypeId, build: impl FnOnce() -> Arc<W>) -> Arc<W> {
        if let Some(wrapper) = self.get(key) {
            return wrapper;
        }

        let candidate = build();

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match entries.entry(key) {
            Entry::Occupied(entry) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("Discarding wrapper built by a losing racer");
                Arc::clone(entry.get())
            },
            Entry::Vacant(entry) => {
                self.installed.fetch_add(1, Ordering::Relaxed);
                Arc::clone(entry.insert(candidate))
            },
        }
    }

    /// Whether a wrapper is cached for `key`.
    #[must_use]
    pub fn contains(&self, key: TypeId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    /// Number of cached types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wrappers installed since creation. Equals [`len`](Self::len) since
    /// entries are never replaced.
    #[must_use]
    pub fn installed(&self) -> u64 {
        self.installed.load(Ordering::Relaxed)
    }

    /// Wrappers built by a losing racer and thrown away.
    #[must_use]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

impl<W: ?Sized> Default for WrapperCache<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: ?Sized> std::fmt::Debug for WrapperCache<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperCache")
            .field("len", &self.len())
            .field("installed", &self.installed())
            .field("discarded", &self.discarded())
            .finish()
    }
}
