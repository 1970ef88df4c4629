//! Response phase: store what the transport returned and settle waiters.

use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cachet_backend::{Backend, CacheBackend};
use cachet_core::{
    CacheControl, CacheEntry, CacheKey, CachedValue, Interpretation, Request, Response, Upstream,
    Variant, VaryHeader, interpret,
};
use chrono::{DateTime, Utc};
use http::StatusCode;
use tracing::debug;

use super::{Execution, Settled, Settlement, State};
use crate::concurrency::FetchGuard;
use crate::context::CachedResponse;
use crate::error::CacheError;
use crate::metrics;
use crate::policy::{Failure, UpdateDirective, VaryPolicy};

type Guard<E> = FetchGuard<Settlement<E>>;

impl<B, E, U> Execution<'_, B, E, U>
where
    B: Backend,
    E: Error + Send + Sync + 'static,
    U: Upstream<Request, Response = Result<Response, E>> + Send,
{
    pub(super) async fn poll_upstream(
        &mut self,
        key: CacheKey,
        guard: Guard<E>,
        previous: Option<CacheEntry>,
        request: Request,
        revalidating: bool,
    ) -> State<E> {
        let started = Instant::now();
        let result = self.upstream.call(request).await;
        metrics::record_upstream_duration(
            started.elapsed(),
            result.as_ref().ok().map(|response| response.status.as_u16()),
        );

        match result {
            Ok(response)
                if response.status.is_success()
                    || (revalidating && response.status == StatusCode::NOT_MODIFIED) =>
            {
                self.on_success(key, guard, previous, response).await
            }
            Ok(response) => {
                let fallback = self.stale_fallback(previous.as_ref(), &Failure::Status(&response));
                self.on_failure(key, guard, previous, fallback, CacheError::Status(response))
                    .await
            }
            Err(error) => {
                let error = Arc::new(error);
                let fallback = self.stale_fallback(previous.as_ref(), &Failure::Transport(&*error));
                self.on_failure(key, guard, previous, fallback, CacheError::Upstream(error))
                    .await
            }
        }
    }

    async fn on_success(
        &mut self,
        key: CacheKey,
        guard: Guard<E>,
        previous: Option<CacheEntry>,
        response: Response,
    ) -> State<E> {
        let now = self.inner.clock.now();
        self.apply_updates(&response, now).await;

        let (response, cached) = match previous.as_ref().and_then(CacheEntry::value) {
            Some(value) if response.status == StatusCode::NOT_MODIFIED => {
                debug!(key = %key, "not modified");
                (value.response.clone().merge_not_modified(&response), true)
            }
            _ => (response, false),
        };

        if !self.policy.accepts(&response) {
            debug!(key = %key, status = %response.status, "response rejected by predicate");
            self.restore(&key, previous).await;
            return Self::settle(guard, key, response, None, cached);
        }

        let Some((ttl, stale_ttl)) = self.lifetime(&response, now) else {
            debug!(key = %key, "headers forbid storing the response");
            self.inner.backend.delete(&key).await;
            return Self::settle(guard, key, response, None, cached);
        };

        let mut value = CachedValue::new(response.clone(), now, ttl);
        value.stale_ttl = stale_ttl;
        value.must_revalidate =
            CacheControl::from_headers(&response.headers).is_some_and(|cc| cc.must_revalidate);

        let (target, entry) = self.place(&key, value);
        if target != key {
            // The marker was set on the base key before the variant was known.
            self.inner.backend.delete(&key).await;
        }
        let variant = entry.value().and_then(|value| value.variant.clone());
        debug!(key = %target, ?ttl, ?stale_ttl, "storing response");
        self.inner.backend.store(&target, entry).await;

        Self::settle(guard, target, response, variant, cached)
    }

    async fn on_failure(
        &mut self,
        key: CacheKey,
        guard: Guard<E>,
        previous: Option<CacheEntry>,
        fallback: Option<CachedValue>,
        error: CacheError<E>,
    ) -> State<E> {
        self.restore(&key, previous).await;

        let Some(value) = fallback else {
            debug!(key = %key, %error, "upstream failed");
            guard.resolve(Err(error.clone()));
            return State::Response(Err(error));
        };

        debug!(key = %key, %error, "upstream failed, serving stale");
        metrics::record_stale_fallback();
        guard.resolve(Ok(Settled {
            response: value.response.clone(),
            key: key.clone(),
            stale: true,
            variant: value.variant,
        }));
        State::Response(Ok(CachedResponse::from_cache(value.response, key, true)))
    }

    fn stale_fallback(
        &self,
        previous: Option<&CacheEntry>,
        failure: &Failure<'_>,
    ) -> Option<CachedValue> {
        let now = self.inner.clock.now();
        previous
            .and_then(CacheEntry::value)
            .filter(|value| self.policy.serve_stale(failure, value, now))
            .cloned()
    }

    /// Puts back what the loading marker replaced.
    async fn restore(&self, key: &CacheKey, previous: Option<CacheEntry>) {
        match previous.filter(|entry| entry.value().is_some()) {
            Some(entry) => {
                self.inner.backend.store(key, entry).await;
            }
            None => self.inner.backend.delete(key).await,
        }
    }

    pub(super) async fn apply_updates(&self, response: &Response, now: DateTime<Utc>) {
        for (target, directive) in self.policy.updates() {
            match directive {
                UpdateDirective::Delete => {
                    debug!(key = %target, "update directive: delete");
                    self.inner.backend.delete(target).await;
                }
                UpdateDirective::Transform(transform) => {
                    let current = self.inner.backend.get(target, now).await;
                    match transform(current, response) {
                        Some(entry) => {
                            debug!(key = %target, "update directive: replace");
                            self.inner.backend.store(target, entry).await;
                        }
                        None => {
                            debug!(key = %target, "update directive: delete");
                            self.inner.backend.delete(target).await;
                        }
                    }
                }
            }
        }
    }

    /// Freshness lifetime and stale window, or `None` when the response must
    /// not be stored.
    fn lifetime(
        &self,
        response: &Response,
        now: DateTime<Utc>,
    ) -> Option<(Duration, Option<Duration>)> {
        let config = self.policy.config();
        if !config.interpret_header {
            return Some((config.ttl, config.stale_ttl));
        }
        match interpret(&response.headers, self.inner.location, now) {
            Interpretation::DontCache => None,
            Interpretation::NotEnoughHeaders => Some((config.ttl, config.stale_ttl)),
            Interpretation::Cache { cache, stale } => Some((cache, stale.or(config.stale_ttl))),
        }
    }

    /// Where and in which state `value` is stored, following `Vary`.
    fn place(&self, key: &CacheKey, mut value: CachedValue) -> (CacheKey, CacheEntry) {
        if self.base_key.is_id() {
            return (key.clone(), CacheEntry::Cached(value));
        }
        let vary = self.policy.config().vary.clone();
        if vary == VaryPolicy::Disabled {
            return (key.clone(), CacheEntry::Cached(value));
        }

        match (VaryHeader::parse(&value.response.headers), vary) {
            (VaryHeader::Any, _) => {
                debug!(key = %key, "vary: *, stored for revalidation only");
                (key.clone(), CacheEntry::Stale(value))
            }
            (_, VaryPolicy::Headers(names)) => {
                let variant = Variant::from_request(&names, &self.request.headers);
                value.variant = (!variant.is_empty()).then_some(variant);
                (key.clone(), CacheEntry::Cached(value))
            }
            (VaryHeader::Names(names), _) => {
                self.inner.vary.learn(&self.base_key, &names);
                let variant = Variant::from_request(&names, &self.request.headers);
                let target = self.base_key.with_variant(&variant);
                value.variant = Some(variant);
                (target, CacheEntry::Cached(value))
            }
            (VaryHeader::None, _) => (key.clone(), CacheEntry::Cached(value)),
        }
    }

    fn settle(
        guard: Guard<E>,
        key: CacheKey,
        response: Response,
        variant: Option<Variant>,
        cached: bool,
    ) -> State<E> {
        guard.resolve(Ok(Settled {
            response: response.clone(),
            key: key.clone(),
            stale: false,
            variant,
        }));
        let mut result = CachedResponse::fetched(response, key);
        result.cached = cached;
        State::Response(Ok(result))
    }
}
