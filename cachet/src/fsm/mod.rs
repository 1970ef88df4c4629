//! Per-call state machine.
//!
//! One [`Cache::execute`](crate::Cache::execute) call walks these states:
//!
//! ```text
//! Initial ──► PollCache ──► Response (fresh hit)
//!                 │
//!                 ▼
//!          CheckConcurrency ──► AwaitResponse ──► Response
//!                 │                   │
//!                 ▼                   └──► Initial (owner gone / other variant)
//!            PollUpstream ──► Response
//! ```
//!
//! `Initial` also answers directly when the request bypasses the cache.

use std::error::Error;
use std::fmt;

use cachet_backend::Backend;
use cachet_core::{CacheEntry, CacheKey, Request, Response, Upstream, Variant};
use tracing::debug;

use crate::cache::CacheInner;
use crate::concurrency::{FetchGuard, WaitHandle};
use crate::context::CachedResponse;
use crate::error::CacheError;
use crate::metrics;
use crate::policy::CachePolicy;

mod request;
mod response;

/// What an owner hands to the callers waiting on its fetch.
#[derive(Debug, Clone)]
pub struct Settled {
    /// Response served to the owner.
    pub response: Response,
    /// Key the response was stored under.
    pub key: CacheKey,
    /// Whether a stale snapshot answered a failure.
    pub stale: bool,
    /// Variant the response was stored for, if keyed by `Vary`.
    pub variant: Option<Variant>,
}

/// Value shared through the waiting registry.
pub type Settlement<E> = Result<Settled, CacheError<E>>;

pub(crate) enum State<E> {
    Initial,
    PollCache {
        key: CacheKey,
    },
    CheckConcurrency {
        key: CacheKey,
        previous: Option<CacheEntry>,
        revalidate: bool,
    },
    AwaitResponse {
        key: CacheKey,
        handle: WaitHandle<Settlement<E>>,
    },
    PollUpstream {
        key: CacheKey,
        guard: FetchGuard<Settlement<E>>,
        previous: Option<CacheEntry>,
        request: Request,
        revalidating: bool,
    },
    Response(Result<CachedResponse, CacheError<E>>),
}

impl<E> fmt::Debug for State<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Initial => f.write_str("State::Initial"),
            State::PollCache { .. } => f.write_str("State::PollCache"),
            State::CheckConcurrency { .. } => f.write_str("State::CheckConcurrency"),
            State::AwaitResponse { .. } => f.write_str("State::AwaitResponse"),
            State::PollUpstream { .. } => f.write_str("State::PollUpstream"),
            State::Response(_) => f.write_str("State::Response"),
        }
    }
}

pub(crate) struct Execution<'a, B, E, U> {
    inner: &'a CacheInner<B, E>,
    policy: &'a CachePolicy,
    request: Request,
    base_key: CacheKey,
    upstream: U,
}

impl<'a, B, E, U> Execution<'a, B, E, U>
where
    B: Backend,
    E: Error + Send + Sync + 'static,
    U: Upstream<Request, Response = Result<Response, E>> + Send,
{
    pub(crate) fn new(
        inner: &'a CacheInner<B, E>,
        policy: &'a CachePolicy,
        request: Request,
        base_key: CacheKey,
        upstream: U,
    ) -> Self {
        Self {
            inner,
            policy,
            request,
            base_key,
            upstream,
        }
    }

    pub(crate) async fn run(mut self) -> Result<CachedResponse, CacheError<E>> {
        let mut state = State::Initial;
        loop {
            debug!("{:?}", &state);
            state = match state {
                State::Initial => self.initial().await,
                State::PollCache { key } => self.poll_cache(key).await,
                State::CheckConcurrency {
                    key,
                    previous,
                    revalidate,
                } => self.check_concurrency(key, previous, revalidate).await,
                State::AwaitResponse { key, handle } => self.await_response(key, handle).await,
                State::PollUpstream {
                    key,
                    guard,
                    previous,
                    request,
                    revalidating,
                } => {
                    self.poll_upstream(key, guard, previous, request, revalidating)
                        .await
                }
                State::Response(result) => {
                    if let Ok(response) = &result {
                        metrics::record_status(response.status(), self.inner.backend.name());
                    }
                    return result;
                }
            };
        }
    }
}
