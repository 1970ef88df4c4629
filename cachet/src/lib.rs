#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// The [`Cache`] type and its `execute` entry points.
mod cache;

/// Request deduplication.
///
/// The first caller for a key fetches; everyone else arriving while it is in
/// flight waits on [`WaitingRegistry`](concurrency::WaitingRegistry) for the
/// same settlement.
pub mod concurrency;

/// Cache construction.
///
/// [`CacheBuilder`] requires a backend before `build()` becomes available.
pub mod config;

/// Response augmentation: [`CachedResponse`] and [`CacheStatus`].
pub mod context;

/// Error types for cache operations.
///
/// - [`CacheError`] - what `execute` returns on failure
/// - [`ConfigError`] - what `build` returns when the backend is unusable
pub mod error;

/// Per-call state machine.
pub mod fsm;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and histograms for:
/// - Hits, misses and stale responses
/// - Deduplicated waits and stale-if-error fallbacks
/// - Upstream call timing
pub mod metrics;

/// Per-request policy.
pub mod policy;

/// Learned `Vary` schemes.
pub mod vary;

pub use cache::Cache;
pub use config::{CacheBuilder, NotSet};
pub use context::{CacheStatus, CachedResponse};
pub use error::{CacheError, ConfigError};
pub use policy::{CachePolicy, Failure, PolicyConfig, StaleIfError, UpdateDirective, VaryPolicy};

pub use cachet_core::{
    CacheEntry, CacheKey, CachedValue, Clock, DefaultKeyGenerator, KeyGenerator, Location,
    Predicate, Request, Response, Upstream, upstream_fn,
};

/// The `cachet` prelude.
///
/// ```rust
/// use cachet::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Cache, CacheError, CachePolicy, CacheStatus, PolicyConfig, Request, Response, Upstream};
}
