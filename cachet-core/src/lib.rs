#![warn(missing_docs)]
//! # cachet-core
//!
//! Core types for the cachet HTTP response cache.
//!
//! This crate holds everything the cache engine reasons about that is free of
//! shared state:
//!
//! - **Identify** requests ([`CacheKey`], [`KeyGenerator`])
//! - **Snapshot** requests and responses ([`Request`], [`Response`])
//! - **Model** the entry lifecycle ([`CacheEntry`], [`CachedValue`])
//! - **Interpret** cache-control headers ([`interpret`])
//! - **Decide** whether a response may be stored ([`Predicate`])
//! - **Call** the transport ([`Upstream`])
//!
//! Storage lives in `cachet-backend`, the engine in `cachet`.
//!
//! ## Feature Flags
//!
//! - `test-helpers` - Enable [`clock::MockClock`] for deterministic tests
//!

pub mod clock;
pub mod context;
pub mod entry;
pub mod interpret;
pub mod key;
pub mod predicate;
pub mod request;
pub mod response;
pub mod upstream;

pub use clock::{Clock, SystemClock};
pub use context::CacheStatus;
pub use entry::{CacheEntry, CachedValue, LoadingEntry, Transition};
pub use interpret::{CacheControl, Interpretation, Location, interpret};
pub use key::{CacheKey, DefaultKeyGenerator, KeyGenerator, KeyPart, Variant, VaryHeader};
pub use predicate::{
    And, FnPredicate, HeaderPredicate, Neutral, Not, Or, Predicate, PredicateExt, StatusRange,
    predicate_fn,
};
pub use request::Request;
pub use response::Response;
pub use upstream::{Upstream, UpstreamFn, upstream_fn};
