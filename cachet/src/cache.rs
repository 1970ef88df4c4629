//! The engine entry point.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use cachet_backend::{Backend, CacheBackend};
use cachet_core::{CacheKey, Clock, KeyGenerator, Location, Request, Response, Upstream};
use tracing::{Instrument, debug, debug_span};

use crate::concurrency::WaitingRegistry;
use crate::context::CachedResponse;
use crate::error::CacheError;
use crate::fsm::{Execution, Settlement};
use crate::policy::CachePolicy;
use crate::vary::VaryRegistry;

/// HTTP response cache.
///
/// Cheap to clone; clones share storage and in-flight requests.
///
/// `E` is the transport error type.
pub struct Cache<B, E> {
    pub(crate) inner: Arc<CacheInner<B, E>>,
}

pub(crate) struct CacheInner<B, E> {
    pub(crate) backend: B,
    pub(crate) registry: WaitingRegistry<Settlement<E>>,
    pub(crate) vary: VaryRegistry,
    pub(crate) policy: CachePolicy,
    pub(crate) key_generator: Arc<dyn KeyGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) location: Location,
}

impl<B, E> Clone for Cache<B, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend, E> fmt::Debug for Cache<B, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("backend", &self.inner.backend.name())
            .field("policy", &self.inner.policy)
            .field("location", &self.inner.location)
            .finish()
    }
}

impl<B, E> Cache<B, E>
where
    B: Backend,
    E: Error + Send + Sync + 'static,
{
    /// Runs `request` through the cache with the default policy.
    ///
    /// `upstream` is called at most once, and only when neither storage nor
    /// an in-flight request can answer.
    pub async fn execute<U>(
        &self,
        request: Request,
        upstream: U,
    ) -> Result<CachedResponse, CacheError<E>>
    where
        U: Upstream<Request, Response = Result<Response, E>> + Send,
    {
        self.execute_with(request, &self.inner.policy, upstream).await
    }

    /// Runs `request` through the cache with a request-specific policy.
    pub async fn execute_with<U>(
        &self,
        request: Request,
        policy: &CachePolicy,
        upstream: U,
    ) -> Result<CachedResponse, CacheError<E>>
    where
        U: Upstream<Request, Response = Result<Response, E>> + Send,
    {
        let key = self.inner.key_generator.generate(&request);
        let span = debug_span!("cache.execute", key = %key, method = %request.method);
        Execution::new(&self.inner, policy, request, key, upstream)
            .run()
            .instrument(span)
            .await
    }

    /// Key the configured generator derives for `request`.
    pub fn key(&self, request: &Request) -> CacheKey {
        self.inner.key_generator.generate(request)
    }

    /// Removes `key` from storage.
    ///
    /// Invalidating a base key also forgets its learned `Vary` scheme, so the
    /// next request is keyed by the base key again and relearns it.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.inner.backend.delete(key).await;
        if !key.is_variant() && self.inner.vary.forget(key) {
            debug!(key = %key, "forgot vary scheme");
        }
    }

    /// Storage backend.
    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// In-flight requests.
    pub fn registry(&self) -> &WaitingRegistry<Settlement<E>> {
        &self.inner.registry
    }

    /// Learned `Vary` schemes.
    pub fn vary(&self) -> &VaryRegistry {
        &self.inner.vary
    }

    /// Default policy.
    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }
}
