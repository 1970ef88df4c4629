//! Backend over a quota-limited string store.
//!
//! Models persistent key/value areas with a byte budget (browser-style
//! storage, small embedded stores). Entries are stored as JSON under a key
//! prefix. When a write fails with [`BackendError::QuotaExceeded`] the
//! backend frees space and retries:
//!
//! 1. drop every evictable entry ([`CacheEntry::is_evictable`])
//! 2. evict the entry with the oldest `created_at`, one at a time
//! 3. give up and drop the write for the offending key
//!
//! A quota failure never reaches the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use cachet_core::{CacheEntry, CacheKey, Clock, SystemClock};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{Backend, BackendError, BackendResult, DeleteStatus};

/// Default key prefix.
pub const DEFAULT_PREFIX: &str = "cachet:";

/// Synchronous string key/value area with limited capacity.
pub trait StorageArea: Send + Sync {
    /// Reads a value.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Writes a value. Fails with [`BackendError::QuotaExceeded`] when full.
    fn set_item(&self, key: &str, value: String) -> BackendResult<()>;

    /// Removes a value. Returns whether it existed.
    fn remove_item(&self, key: &str) -> bool;

    /// Every key in the area.
    fn keys(&self) -> Vec<String>;
}

/// In-memory [`StorageArea`] with a byte quota over keys and values.
#[derive(Debug)]
pub struct MemoryArea {
    items: Mutex<HashMap<String, String>>,
    quota_bytes: usize,
}

impl MemoryArea {
    /// Creates an area holding at most `quota_bytes` of keys and values.
    pub fn new(quota_bytes: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            quota_bytes,
        }
    }

    /// Bytes currently used.
    pub fn used_bytes(&self) -> usize {
        self.lock().iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StorageArea for MemoryArea {
    fn get_item(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: String) -> BackendResult<()> {
        let mut items = self.lock();
        let used: usize = items.iter().map(|(k, v)| k.len() + v.len()).sum();
        let replaced = items.get(key).map_or(0, |v| key.len() + v.len());
        if used - replaced + key.len() + value.len() > self.quota_bytes {
            return Err(BackendError::QuotaExceeded);
        }
        items.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}

/// Backend storing JSON entries in a [`StorageArea`].
///
/// # Example
///
/// ```
/// use cachet_backend::{MemoryArea, QuotaBackend};
///
/// let backend = QuotaBackend::new(MemoryArea::new(64 * 1024));
/// ```
pub struct QuotaBackend<A> {
    area: A,
    prefix: String,
    clock: Arc<dyn Clock>,
}

impl<A: fmt::Debug> fmt::Debug for QuotaBackend<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaBackend")
            .field("area", &self.area)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl<A: StorageArea> QuotaBackend<A> {
    /// Creates a backend using [`DEFAULT_PREFIX`] and the system clock.
    pub fn new(area: A) -> Self {
        Self {
            area,
            prefix: DEFAULT_PREFIX.to_owned(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the key prefix separating cache entries from other data.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the clock used to find expired entries.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The underlying area.
    pub fn area(&self) -> &A {
        &self.area
    }

    fn storage_key(&self, key: &CacheKey) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn own_entries(&self) -> Vec<(String, Option<CacheEntry>)> {
        self.area
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(&self.prefix))
            .map(|key| {
                let entry = self
                    .area
                    .get_item(&key)
                    .and_then(|raw| serde_json::from_str(&raw).ok());
                (key, entry)
            })
            .collect()
    }

    /// Drops unparsable and evictable entries. Returns how many were dropped.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut purged = 0;
        for (key, entry) in self.own_entries() {
            let evictable = entry.is_none_or(|entry| entry.is_evictable(now));
            if evictable && self.area.remove_item(&key) {
                purged += 1;
            }
        }
        purged
    }

    /// Evicts the entry with the oldest `created_at`, never `keep`.
    ///
    /// Entries without a timestamp count as oldest.
    fn evict_oldest(&self, keep: &str) -> bool {
        let oldest = self
            .own_entries()
            .into_iter()
            .filter(|(key, _)| key != keep)
            .min_by_key(|(_, entry)| entry.as_ref().and_then(CacheEntry::created_at));
        match oldest {
            Some((key, _)) => {
                debug!(key = %key, "quota backend evicting oldest entry");
                self.area.remove_item(&key)
            }
            None => false,
        }
    }

    fn write(&self, storage_key: &str, raw: String) -> BackendResult<()> {
        match self.area.set_item(storage_key, raw.clone()) {
            Err(BackendError::QuotaExceeded) => {}
            other => return other,
        }

        let purged = self.purge_expired(self.clock.now());
        if purged > 0 {
            match self.area.set_item(storage_key, raw.clone()) {
                Err(BackendError::QuotaExceeded) => {}
                other => return other,
            }
        }

        while self.evict_oldest(storage_key) {
            match self.area.set_item(storage_key, raw.clone()) {
                Err(BackendError::QuotaExceeded) => {}
                other => return other,
            }
        }

        // The entry alone exceeds the quota. Drop the write and the stale
        // value it was meant to replace.
        warn!(key = storage_key, "quota exceeded, dropping cache write");
        self.area.remove_item(storage_key);
        Ok(())
    }
}

#[async_trait]
impl<A: StorageArea> Backend for QuotaBackend<A> {
    async fn find(&self, key: &CacheKey) -> BackendResult<Option<CacheEntry>> {
        let storage_key = self.storage_key(key);
        let Some(raw) = self.area.get_item(&storage_key) else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(error) => {
                self.area.remove_item(&storage_key);
                Err(error.into())
            }
        }
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> BackendResult<()> {
        let raw = serde_json::to_string(&entry)?;
        self.write(&self.storage_key(key), raw)
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        if self.area.remove_item(&self.storage_key(key)) {
            Ok(DeleteStatus::Deleted(1))
        } else {
            Ok(DeleteStatus::Missing)
        }
    }

    fn name(&self) -> &str {
        "quota"
    }

    fn validate(&self) -> BackendResult<()> {
        let marker = format!("{}__validate__", self.prefix);
        self.area.set_item(&marker, String::new())?;
        self.area.remove_item(&marker);
        Ok(())
    }
}
