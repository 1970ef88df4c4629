//! Bounded in-process backend.
//!
//! Entries live in an insertion-ordered map. When a write pushes the map past
//! `max_entries`, a cleanup pass first drops entries that are no longer
//! useful ([`CacheEntry::is_evictable`]), then evicts the oldest inserted
//! entries until the map is back under the limit. This is FIFO, not LRU.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use cachet_core::{CacheEntry, CacheKey, Clock, SystemClock};
use indexmap::IndexMap;
use tracing::debug;

use crate::{Backend, BackendError, BackendResult, DeleteStatus};

/// Default entry limit.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// In-memory backend with FIFO eviction.
///
/// # Example
///
/// ```
/// use cachet_backend::MemoryBackend;
///
/// let backend = MemoryBackend::builder().max_entries(100).build();
/// assert!(backend.is_empty());
/// ```
pub struct MemoryBackend {
    entries: Mutex<IndexMap<CacheKey, CacheEntry>>,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("len", &self.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl MemoryBackend {
    /// Creates a builder.
    pub fn builder() -> MemoryBackendBuilder {
        MemoryBackendBuilder::default()
    }

    /// Number of resident entries, including loading markers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entries are resident.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.lock().keys().cloned().collect()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Configured entry limit.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict(&self, entries: &mut IndexMap<CacheKey, CacheEntry>) {
        let now = self.clock.now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_evictable(now));
        let cleaned = before - entries.len();

        let mut evicted = 0;
        while entries.len() > self.max_entries {
            if entries.shift_remove_index(0).is_none() {
                break;
            }
            evicted += 1;
        }
        debug!(cleaned, evicted, len = entries.len(), "memory backend eviction");
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn find(&self, key: &CacheKey) -> BackendResult<Option<CacheEntry>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> BackendResult<()> {
        let mut entries = self.lock();
        // Rewrites move to the back so that refreshed entries are evicted last.
        entries.shift_remove(key);
        entries.insert(key.clone(), entry);
        if entries.len() > self.max_entries {
            self.evict(&mut entries);
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        match self.lock().shift_remove(key) {
            Some(_) => Ok(DeleteStatus::Deleted(1)),
            None => Ok(DeleteStatus::Missing),
        }
    }

    fn name(&self) -> &str {
        "memory"
    }

    fn validate(&self) -> BackendResult<()> {
        if self.max_entries == 0 {
            return Err(BackendError::Misconfigured(
                "max_entries must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`MemoryBackend`].
pub struct MemoryBackendBuilder {
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryBackendBuilder {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            clock: Arc::new(SystemClock),
        }
    }
}

impl MemoryBackendBuilder {
    /// Maximum number of resident entries.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Clock used to decide which entries have expired during cleanup.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Builds the backend.
    pub fn build(self) -> MemoryBackend {
        MemoryBackend {
            entries: Mutex::new(IndexMap::with_capacity(self.max_entries.min(1024))),
            max_entries: self.max_entries,
            clock: self.clock,
        }
    }
}
