//! Request phase: decide between storage, an in-flight request and the
//! transport.

use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

use cachet_backend::{Backend, CacheBackend};
use cachet_core::{
    CacheEntry, CacheKey, CachedValue, LoadingEntry, Request, Response, Upstream, Variant,
    interpret::format_http_date,
};
use http::HeaderValue;
use http::header::{IF_MODIFIED_SINCE, IF_NONE_MATCH};
use tracing::{debug, warn};

use super::{Execution, Settled, State};
use crate::concurrency::{ConcurrencyDecision, ConcurrencyError, WaitHandle};
use crate::context::CachedResponse;
use crate::error::CacheError;
use crate::metrics;
use crate::policy::VaryPolicy;

impl<B, E, U> Execution<'_, B, E, U>
where
    B: Backend,
    E: Error + Send + Sync + 'static,
    U: Upstream<Request, Response = Result<Response, E>> + Send,
{
    pub(super) async fn initial(&mut self) -> State<E> {
        let config = self.policy.config();
        if !config.enabled {
            debug!("cache disabled for request");
            return State::Response(self.bypass(false).await);
        }
        if !config.is_cacheable(&self.request.method) {
            debug!(method = %self.request.method, "method bypasses the cache");
            return State::Response(self.bypass(true).await);
        }
        State::PollCache {
            key: self.resolve_key(),
        }
    }

    /// Calls the transport without touching the entry for this request.
    /// Update directives still run when `with_updates` is set.
    async fn bypass(&mut self, with_updates: bool) -> Result<CachedResponse, CacheError<E>> {
        let started = Instant::now();
        let result = self.upstream.call(self.request.clone()).await;
        metrics::record_upstream_duration(
            started.elapsed(),
            result.as_ref().ok().map(|response| response.status.as_u16()),
        );
        match result {
            Ok(response) if response.status.is_success() => {
                if with_updates {
                    self.apply_updates(&response, self.inner.clock.now()).await;
                }
                Ok(CachedResponse::fetched(response, self.base_key.clone()))
            }
            Ok(response) => Err(CacheError::Status(response)),
            Err(error) => Err(CacheError::Upstream(Arc::new(error))),
        }
    }

    /// Base key, widened by the variant when the key is known to vary.
    fn resolve_key(&self) -> CacheKey {
        if self.base_key.is_id() {
            return self.base_key.clone();
        }
        let names = match &self.policy.config().vary {
            VaryPolicy::Disabled => None,
            VaryPolicy::Auto => self.inner.vary.scheme(&self.base_key),
            VaryPolicy::Headers(names) => Some(names.clone()),
        };
        match names {
            Some(names) if !names.is_empty() => {
                let variant = Variant::from_request(&names, &self.request.headers);
                self.base_key.with_variant(&variant)
            }
            _ => self.base_key.clone(),
        }
    }

    pub(super) async fn poll_cache(&mut self, key: CacheKey) -> State<E> {
        let now = self.inner.clock.now();
        let override_cache = self.policy.config().override_cache;
        match self.inner.backend.get(&key, now).await {
            CacheEntry::Cached(value) if !override_cache => {
                debug!(key = %key, "fresh hit");
                State::Response(Ok(CachedResponse::from_cache(value.response, key, false)))
            }
            CacheEntry::Empty => State::CheckConcurrency {
                key,
                previous: None,
                revalidate: false,
            },
            CacheEntry::Loading(loading) => {
                if !self.inner.registry.contains(&key) {
                    warn!(key = %key, "loading marker without an in-flight request");
                }
                let previous = loading.previous.map(|previous| *previous);
                State::CheckConcurrency {
                    revalidate: previous.is_some() && !override_cache,
                    key,
                    previous,
                }
            }
            entry if override_cache => {
                debug!(key = %key, "forced refetch");
                self.policy.run_hydrate(&entry);
                State::CheckConcurrency {
                    key,
                    previous: Some(entry),
                    revalidate: false,
                }
            }
            entry => State::CheckConcurrency {
                key,
                previous: Some(entry),
                revalidate: true,
            },
        }
    }

    pub(super) async fn check_concurrency(
        &mut self,
        key: CacheKey,
        previous: Option<CacheEntry>,
        revalidate: bool,
    ) -> State<E> {
        let guard = match self.inner.registry.check(&key, self.request.timeout) {
            ConcurrencyDecision::Await(handle) => {
                metrics::record_dedup_wait();
                return State::AwaitResponse { key, handle };
            }
            ConcurrencyDecision::Proceed(guard) => guard,
        };

        let now = self.inner.clock.now();
        // Another caller may have stored a response between the lookup and
        // the registration.
        if !self.policy.config().override_cache
            && let CacheEntry::Cached(value) = self.inner.backend.get(&key, now).await
        {
            debug!(key = %key, "entry appeared while registering");
            guard.resolve(Ok(Settled {
                response: value.response.clone(),
                key: key.clone(),
                stale: false,
                variant: value.variant.clone(),
            }));
            return State::Response(Ok(CachedResponse::from_cache(value.response, key, false)));
        }

        let deadline = self
            .request
            .timeout
            .or(self.policy.config().loading_timeout)
            .and_then(|timeout| chrono::Duration::from_std(timeout).ok())
            .and_then(|timeout| now.checked_add_signed(timeout));
        let marker = LoadingEntry::new(previous.clone(), deadline);
        self.inner
            .backend
            .store(&key, CacheEntry::Loading(marker))
            .await;

        let validators = previous
            .as_ref()
            .and_then(CacheEntry::value)
            .filter(|_| revalidate);
        let (request, revalidating) = self.outgoing(validators);
        debug!(key = %key, revalidating, "fetching from upstream");
        State::PollUpstream {
            key,
            guard,
            previous,
            request,
            revalidating,
        }
    }

    /// The request to send, with conditional headers when `previous` has
    /// validators.
    fn outgoing(&self, previous: Option<&CachedValue>) -> (Request, bool) {
        let mut request = self.request.clone();
        let Some(previous) = previous else {
            return (request, false);
        };
        let config = self.policy.config();
        let mut revalidating = false;

        if config.etag
            && let Some(etag) = previous.response.etag()
        {
            request.headers.insert(IF_NONE_MATCH, etag.clone());
            revalidating = true;
        }
        if config.modified_since {
            let since = match previous.response.last_modified() {
                Some(last_modified) => Some(last_modified.clone()),
                None => HeaderValue::from_str(&format_http_date(previous.created_at)).ok(),
            };
            if let Some(since) = since {
                request.headers.insert(IF_MODIFIED_SINCE, since);
                revalidating = true;
            }
        }
        (request, revalidating)
    }

    pub(super) async fn await_response(
        &mut self,
        key: CacheKey,
        handle: WaitHandle<super::Settlement<E>>,
    ) -> State<E> {
        match handle.wait(self.request.timeout).await {
            Ok(Ok(settled)) => {
                if let Some(variant) = &settled.variant
                    && !variant.matches(&self.request.headers)
                {
                    debug!(key = %key, "settled for another variant, retrying");
                    return State::Initial;
                }
                State::Response(Ok(CachedResponse::from_cache(
                    settled.response,
                    settled.key,
                    settled.stale,
                )))
            }
            Ok(Err(error)) => State::Response(Err(error)),
            Err(ConcurrencyError::Closed) => {
                debug!(key = %key, "in-flight request abandoned, retrying");
                State::Initial
            }
            Err(ConcurrencyError::Timeout) => State::Response(Err(CacheError::Timeout)),
        }
    }
}
