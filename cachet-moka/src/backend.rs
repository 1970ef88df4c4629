//! Moka backend implementation.

use async_trait::async_trait;
use cachet_backend::{Backend, BackendResult, DeleteStatus};
use cachet_core::{CacheEntry, CacheKey};
use moka::future::Cache;

/// Storage backed by a [`moka::future::Cache`].
///
/// Build with [`MokaBackend::builder`].
#[derive(Clone)]
pub struct MokaBackend {
    pub(crate) cache: Cache<CacheKey, CacheEntry>,
    pub(crate) name: String,
}

impl std::fmt::Debug for MokaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaBackend")
            .field("name", &self.name)
            .field("cache", &self.cache)
            .finish()
    }
}

impl MokaBackend {
    /// Creates a builder with no capacity configured.
    pub fn builder() -> crate::builder::MokaBackendBuilder<crate::builder::NoCapacity> {
        crate::builder::MokaBackendBuilder::new()
    }

    /// The underlying Moka cache.
    pub fn cache(&self) -> &Cache<CacheKey, CacheEntry> {
        &self.cache
    }
}

#[async_trait]
impl Backend for MokaBackend {
    async fn find(&self, key: &CacheKey) -> BackendResult<Option<CacheEntry>> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &CacheKey, entry: CacheEntry) -> BackendResult<()> {
        self.cache.insert(key.clone(), entry).await;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> BackendResult<DeleteStatus> {
        match self.cache.remove(key).await {
            Some(_) => Ok(DeleteStatus::Deleted(1)),
            None => Ok(DeleteStatus::Missing),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
