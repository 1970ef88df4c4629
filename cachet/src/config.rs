//! Cache construction.
//!
//! ```
//! use cachet::{Cache, CachePolicy, PolicyConfig};
//! use cachet_backend::MemoryBackend;
//!
//! let cache: Cache<MemoryBackend, std::io::Error> = Cache::builder()
//!     .backend(MemoryBackend::builder().max_entries(500).build())
//!     .policy(PolicyConfig::default())
//!     .build()
//!     .unwrap();
//! # let _ = cache;
//! ```

use std::error::Error;
use std::sync::Arc;

use cachet_backend::Backend;
use cachet_core::{Clock, DefaultKeyGenerator, KeyGenerator, Location, SystemClock};
use tracing::debug;

use crate::cache::{Cache, CacheInner};
use crate::concurrency::WaitingRegistry;
use crate::error::ConfigError;
use crate::policy::CachePolicy;
use crate::vary::VaryRegistry;

/// Marker type for a builder field that has not been set.
///
/// When you see `NotSet` in a compiler error, it means you haven't called
/// [`CacheBuilder::backend`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NotSet;

/// Builder for [`Cache`].
pub struct CacheBuilder<B> {
    backend: B,
    policy: CachePolicy,
    key_generator: Arc<dyn KeyGenerator>,
    clock: Arc<dyn Clock>,
    location: Location,
}

impl Cache<NotSet, NotSet> {
    /// Starts building a cache.
    pub fn builder() -> CacheBuilder<NotSet> {
        CacheBuilder::new()
    }
}

impl CacheBuilder<NotSet> {
    /// Builder with default policy, key generator, clock and location.
    pub fn new() -> Self {
        Self {
            backend: NotSet,
            policy: CachePolicy::default(),
            key_generator: Arc::new(DefaultKeyGenerator),
            clock: Arc::new(SystemClock),
            location: Location::default(),
        }
    }
}

impl Default for CacheBuilder<NotSet> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> CacheBuilder<B> {
    /// Sets the storage backend.
    pub fn backend<NB: Backend>(self, backend: NB) -> CacheBuilder<NB> {
        CacheBuilder {
            backend,
            policy: self.policy,
            key_generator: self.key_generator,
            clock: self.clock,
            location: self.location,
        }
    }

    /// Sets the policy used by [`Cache::execute`].
    pub fn policy(mut self, policy: impl Into<CachePolicy>) -> Self {
        self.policy = policy.into();
        self
    }

    /// Replaces [`DefaultKeyGenerator`].
    pub fn key_generator(mut self, key_generator: impl KeyGenerator + 'static) -> Self {
        self.key_generator = Arc::new(key_generator);
        self
    }

    /// Replaces the system clock.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Whether `private` responses may be stored. Defaults to server.
    pub fn location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }
}

impl<B: Backend> CacheBuilder<B> {
    /// Validates the backend and builds the cache.
    pub fn build<E>(self) -> Result<Cache<B, E>, ConfigError>
    where
        E: Error + Send + Sync + 'static,
    {
        self.backend
            .validate()
            .map_err(|source| ConfigError::InvalidBackend {
                backend: self.backend.name().to_owned(),
                source,
            })?;
        debug!(backend = self.backend.name(), location = ?self.location, "cache built");

        Ok(Cache {
            inner: Arc::new(CacheInner {
                backend: self.backend,
                registry: WaitingRegistry::new(),
                vary: VaryRegistry::new(),
                policy: self.policy,
                key_generator: self.key_generator,
                clock: self.clock,
                location: self.location,
            }),
        })
    }
}
