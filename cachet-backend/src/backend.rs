//! Backend traits.
//!
//! [`Backend`] is the raw storage contract. [`CacheBackend`] is implemented
//! for every backend and adds the behavior the engine relies on:
//!
//! - `get` turns expired entries into their next state and writes that back
//! - `store` / `delete` log failures instead of returning them

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use cachet_core::{CacheEntry, CacheKey, Transition};
use chrono::{DateTime, Utc};
use tracing::warn;

use crate::{BackendError, DeleteStatus};

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Raw key/entry storage.
#[async_trait]
pub trait Backend: Sync + Send {
    /// Raw lookup. No expiry logic.
    async fn find(&self, key: &CacheKey) -> BackendResult<Option<CacheEntry>>;

    /// Stores `entry` under `key`, replacing any previous entry.
    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> BackendResult<()>;

    /// Removes `key`.
    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus>;

    /// Backend name used in logs.
    fn name(&self) -> &str {
        "backend"
    }

    /// Setup-time capability check.
    ///
    /// Called once when the cache is built. An error aborts construction.
    fn validate(&self) -> BackendResult<()> {
        Ok(())
    }
}

#[async_trait]
impl Backend for &dyn Backend {
    async fn find(&self, key: &CacheKey) -> BackendResult<Option<CacheEntry>> {
        (*self).find(key).await
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> BackendResult<()> {
        (*self).set(key, entry).await
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        (*self).remove(key).await
    }

    fn name(&self) -> &str {
        (*self).name()
    }

    fn validate(&self) -> BackendResult<()> {
        (*self).validate()
    }
}

#[async_trait]
impl Backend for Box<dyn Backend> {
    async fn find(&self, key: &CacheKey) -> BackendResult<Option<CacheEntry>> {
        (**self).find(key).await
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> BackendResult<()> {
        (**self).set(key, entry).await
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        (**self).remove(key).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn validate(&self) -> BackendResult<()> {
        (**self).validate()
    }
}

#[async_trait]
impl Backend for Arc<dyn Backend + Send + 'static> {
    async fn find(&self, key: &CacheKey) -> BackendResult<Option<CacheEntry>> {
        (**self).find(key).await
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> BackendResult<()> {
        (**self).set(key, entry).await
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        (**self).remove(key).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn validate(&self) -> BackendResult<()> {
        (**self).validate()
    }
}

/// Engine-facing storage operations, implemented for every [`Backend`].
pub trait CacheBackend: Backend {
    /// Reads `key` and applies expiry transitions as of `now`.
    ///
    /// Never returns an expired `Cached` entry. Lookup failures are logged
    /// and reported as [`CacheEntry::Empty`].
    fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> impl Future<Output = CacheEntry> + Send {
        async move {
            let entry = match self.find(key).await {
                Ok(Some(entry)) => entry,
                Ok(None) => return CacheEntry::Empty,
                Err(error) => {
                    warn!(backend = self.name(), key = %key, %error, "cache lookup failed");
                    return CacheEntry::Empty;
                }
            };

            let (entry, transition) = entry.refresh(now);
            match transition {
                Transition::Unchanged => {}
                Transition::Update => {
                    self.store(key, entry.clone()).await;
                }
                Transition::Remove => self.delete(key).await,
            }
            entry
        }
    }

    /// Writes `entry`. Returns `false` if the backend failed.
    fn store(&self, key: &CacheKey, entry: CacheEntry) -> impl Future<Output = bool> + Send {
        async move {
            match self.set(key, entry).await {
                Ok(()) => true,
                Err(error) => {
                    warn!(backend = self.name(), key = %key, %error, "cache write failed");
                    false
                }
            }
        }
    }

    /// Removes `key`, logging failures.
    fn delete(&self, key: &CacheKey) -> impl Future<Output = ()> + Send {
        async move {
            if let Err(error) = self.remove(key).await {
                warn!(backend = self.name(), key = %key, %error, "cache remove failed");
            }
        }
    }
}

impl<T: Backend + ?Sized> CacheBackend for T {}
