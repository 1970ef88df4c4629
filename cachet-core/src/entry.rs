//! Cache entry lifecycle.
//!
//! ```text
//!            mark loading            settle (store)
//!   Empty ───────────────► Loading ───────────────► Cached
//!     ▲                      │  ▲                     │
//!     │   deadline, no prev  │  │ revalidate          │ ttl elapsed
//!     └──────────────────────┘  │                     ▼
//!     ▲                         └──────────────── Stale
//!     │  ttl elapsed, no validator / must-revalidate  │
//!     └───────────────────────────────────────────────┘ outer bound, no validator
//! ```
//!
//! Transitions driven by time are applied lazily by [`CacheEntry::refresh`],
//! so storage never hands out an expired entry still marked `Cached`.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::key::Variant;
use crate::response::Response;

/// State of one cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CacheEntry {
    /// No data.
    Empty,
    /// A transport call for this key is in flight.
    Loading(LoadingEntry),
    /// A fresh response.
    Cached(CachedValue),
    /// An expired response kept for revalidation or error fallback.
    Stale(CachedValue),
}

/// In-flight marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadingEntry {
    /// Entry this marker replaced, restored if the fetch fails.
    pub previous: Option<Box<CacheEntry>>,
    /// After this instant the marker is considered orphaned.
    pub deadline: Option<DateTime<Utc>>,
}

impl LoadingEntry {
    /// Creates a marker. Only `Cached` and `Stale` entries are kept as previous.
    pub fn new(previous: Option<CacheEntry>, deadline: Option<DateTime<Utc>>) -> Self {
        let previous = previous
            .filter(|entry| entry.value().is_some())
            .map(Box::new);
        Self { previous, deadline }
    }

    /// Snapshot carried by the previous entry.
    pub fn previous_value(&self) -> Option<&CachedValue> {
        self.previous.as_deref().and_then(CacheEntry::value)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// A stored response with its freshness metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedValue {
    /// Stored snapshot.
    pub response: Response,
    /// When the snapshot was written.
    pub created_at: DateTime<Utc>,
    /// Freshness lifetime.
    pub ttl: Duration,
    /// Window after expiry during which the value may still be served stale.
    /// `None` leaves the window open.
    pub stale_ttl: Option<Duration>,
    /// Request header values this snapshot was stored under.
    pub variant: Option<Variant>,
    /// The response forbade stale reuse (`must-revalidate`).
    pub must_revalidate: bool,
}

impl CachedValue {
    /// Creates a value with no stale window, variant or `must-revalidate`.
    pub fn new(response: Response, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            response,
            created_at,
            ttl,
            stale_ttl: None,
            variant: None,
            must_revalidate: false,
        }
    }

    /// End of freshness. `None` means never.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        shift(self.created_at, self.ttl)
    }

    /// Outer bound of stale reuse. `None` means unbounded.
    pub fn stale_deadline(&self) -> Option<DateTime<Utc>> {
        let stale_ttl = self.stale_ttl?;
        shift(self.expires_at()?, stale_ttl)
    }

    /// Whether the value is still fresh at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_none_or(|expires| now < expires)
    }

    /// Whether expiry may turn this value stale instead of removing it.
    pub fn can_stale(&self) -> bool {
        !self.must_revalidate
            && (self.response.has_revalidation_material() || self.stale_ttl.is_some())
    }

    /// Whether expiry keeps this value for revalidation regardless of its
    /// stale window.
    pub fn keeps_validator(&self) -> bool {
        !self.must_revalidate && self.response.has_revalidation_material()
    }

    /// Whether `now` is before the outer bound of stale reuse.
    pub fn within_stale_window(&self, now: DateTime<Utc>) -> bool {
        self.stale_deadline().is_none_or(|deadline| now < deadline)
    }
}

fn shift(at: DateTime<Utc>, by: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
}

/// What [`CacheEntry::refresh`] requires storage to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Entry unchanged.
    Unchanged,
    /// Write the refreshed entry back.
    Update,
    /// Remove the key.
    Remove,
}

impl CacheEntry {
    /// Stored value of a `Cached` or `Stale` entry.
    pub fn value(&self) -> Option<&CachedValue> {
        match self {
            CacheEntry::Cached(value) | CacheEntry::Stale(value) => Some(value),
            CacheEntry::Empty | CacheEntry::Loading(_) => None,
        }
    }

    /// Consumes the entry, returning its stored value.
    pub fn into_value(self) -> Option<CachedValue> {
        match self {
            CacheEntry::Cached(value) | CacheEntry::Stale(value) => Some(value),
            CacheEntry::Empty | CacheEntry::Loading(_) => None,
        }
    }

    /// Creation time of the stored value, or of the value a marker replaced.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            CacheEntry::Cached(value) | CacheEntry::Stale(value) => Some(value.created_at),
            CacheEntry::Loading(loading) => loading.previous_value().map(|v| v.created_at),
            CacheEntry::Empty => None,
        }
    }

    /// Whether the entry is `Empty`.
    pub fn is_empty(&self) -> bool {
        matches!(self, CacheEntry::Empty)
    }

    /// Whether a storage cleanup pass may drop this entry at `now`.
    ///
    /// Matches the entries [`refresh`](Self::refresh) would remove, plus
    /// `Empty` and expired `Loading` markers.
    pub fn is_evictable(&self, now: DateTime<Utc>) -> bool {
        match self {
            CacheEntry::Empty => true,
            CacheEntry::Cached(value) => {
                !value.is_fresh(now)
                    && !value.keeps_validator()
                    && !(value.can_stale() && value.within_stale_window(now))
            }
            CacheEntry::Stale(value) => {
                !value.within_stale_window(now) && !value.response.has_revalidation_material()
            }
            CacheEntry::Loading(loading) => loading.is_expired(now),
        }
    }

    /// Applies time-driven transitions.
    ///
    /// - expired `Cached` becomes `Stale` when it carries a validator, or when
    ///   it may go stale and is still inside its stale window; otherwise it is
    ///   removed
    /// - `Loading` past its deadline falls back to its previous entry
    /// - `Stale` past its outer bound without a validator is removed
    pub fn refresh(self, now: DateTime<Utc>) -> (CacheEntry, Transition) {
        match self {
            CacheEntry::Empty => (CacheEntry::Empty, Transition::Unchanged),
            CacheEntry::Cached(value) if value.is_fresh(now) => {
                (CacheEntry::Cached(value), Transition::Unchanged)
            }
            CacheEntry::Cached(value) => {
                if value.keeps_validator() || (value.can_stale() && value.within_stale_window(now)) {
                    (CacheEntry::Stale(value), Transition::Update)
                } else {
                    (CacheEntry::Empty, Transition::Remove)
                }
            }
            CacheEntry::Stale(value) => {
                if value.within_stale_window(now) || value.response.has_revalidation_material() {
                    (CacheEntry::Stale(value), Transition::Unchanged)
                } else {
                    (CacheEntry::Empty, Transition::Remove)
                }
            }
            CacheEntry::Loading(loading) if loading.is_expired(now) => match loading.previous {
                Some(previous) => match previous.refresh(now) {
                    (CacheEntry::Empty, _) => (CacheEntry::Empty, Transition::Remove),
                    (entry, _) => (entry, Transition::Update),
                },
                None => (CacheEntry::Empty, Transition::Remove),
            },
            loading @ CacheEntry::Loading(_) => (loading, Transition::Unchanged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn value(response: Response, ttl_ms: u64) -> CachedValue {
        CachedValue::new(response, at(0), Duration::from_millis(ttl_ms))
    }

    #[test]
    fn test_fresh_until_ttl_elapses() {
        let value = value(Response::ok("x"), 7000);
        assert!(value.is_fresh(at(6999)));
        assert!(!value.is_fresh(at(7000)));
        assert!(!value.is_fresh(at(7001)));
    }

    #[test]
    fn test_expired_with_etag_goes_stale() {
        let entry = CacheEntry::Cached(value(Response::ok("x").with_header("etag", "\"a\""), 10));
        let (entry, transition) = entry.refresh(at(11));
        assert_eq!(transition, Transition::Update);
        assert!(matches!(entry, CacheEntry::Stale(_)));
    }

    #[test]
    fn test_expired_without_material_is_removed() {
        let entry = CacheEntry::Cached(value(Response::ok("x"), 10));
        assert_eq!(entry.refresh(at(11)), (CacheEntry::Empty, Transition::Remove));
    }

    #[test]
    fn test_must_revalidate_forbids_stale() {
        let mut value = value(Response::ok("x").with_header("etag", "\"a\""), 10);
        value.must_revalidate = true;
        let (entry, transition) = CacheEntry::Cached(value).refresh(at(11));
        assert_eq!(entry, CacheEntry::Empty);
        assert_eq!(transition, Transition::Remove);
    }

    #[test]
    fn test_explicit_stale_window_bounds_stale_reuse() {
        let mut value = value(Response::ok("x"), 10);
        value.stale_ttl = Some(Duration::from_millis(20));
        let (entry, _) = CacheEntry::Cached(value).refresh(at(15));
        assert!(matches!(entry, CacheEntry::Stale(_)));

        let (entry, transition) = entry.refresh(at(30));
        assert_eq!(entry, CacheEntry::Empty);
        assert_eq!(transition, Transition::Remove);
    }

    #[test]
    fn test_stale_past_outer_bound_keeps_validator() {
        let mut value = value(Response::ok("x").with_header("etag", "\"a\""), 10);
        value.stale_ttl = Some(Duration::from_millis(5));
        let (entry, transition) = CacheEntry::Stale(value).refresh(at(100));
        assert!(matches!(entry, CacheEntry::Stale(_)));
        assert_eq!(transition, Transition::Unchanged);
    }

    #[test]
    fn test_expired_past_outer_bound_keeps_validator_unread() {
        let mut value = value(Response::ok("x").with_header("etag", "\"a\""), 10);
        value.stale_ttl = Some(Duration::from_millis(5));

        let read_early = CacheEntry::Cached(value.clone()).refresh(at(12)).0.refresh(at(100)).0;
        let read_late = CacheEntry::Cached(value.clone()).refresh(at(100)).0;

        assert!(matches!(read_late, CacheEntry::Stale(_)));
        assert_eq!(read_early, read_late);
        assert!(!CacheEntry::Cached(value).is_evictable(at(100)));
    }

    #[test]
    fn test_expired_loading_falls_back_to_previous() {
        let previous = CacheEntry::Stale(value(Response::ok("x").with_header("etag", "\"a\""), 10));
        let loading = CacheEntry::Loading(LoadingEntry::new(Some(previous.clone()), Some(at(50))));

        let (entry, transition) = loading.clone().refresh(at(49));
        assert_eq!(transition, Transition::Unchanged);
        assert_eq!(entry, loading);

        let (entry, transition) = loading.refresh(at(50));
        assert_eq!(transition, Transition::Update);
        assert_eq!(entry, previous);
    }

    #[test]
    fn test_expired_loading_without_previous_is_removed() {
        let loading = CacheEntry::Loading(LoadingEntry::new(None, Some(at(5))));
        assert_eq!(loading.refresh(at(5)), (CacheEntry::Empty, Transition::Remove));
    }

    #[test]
    fn test_loading_keeps_only_stored_values_as_previous() {
        let nested = CacheEntry::Loading(LoadingEntry::new(None, None));
        let loading = LoadingEntry::new(Some(nested), None);
        assert_eq!(loading.previous, None);
    }

    #[test]
    fn test_evictable_entries() {
        let fresh = CacheEntry::Cached(value(Response::ok("x"), 10));
        assert!(!fresh.is_evictable(at(5)));
        assert!(fresh.is_evictable(at(10)));
        assert!(CacheEntry::Empty.is_evictable(at(0)));

        let revalidatable = CacheEntry::Cached(value(Response::ok("x").with_header("etag", "\"a\""), 10));
        assert!(!revalidatable.is_evictable(at(100)));

        let loading = CacheEntry::Loading(LoadingEntry::new(None, Some(at(5))));
        assert!(!loading.is_evictable(at(4)));
        assert!(loading.is_evictable(at(5)));
    }

    #[test]
    fn test_serde_uses_state_tag() {
        let entry = CacheEntry::Cached(value(Response::ok("x"), 10));
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["state"], "cached");
        let back: CacheEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);

        let json = serde_json::to_value(CacheEntry::Empty).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "empty" }));
    }
}
