//! Builder for configuring [`MokaBackend`].

use std::time::{Duration, Instant};

use cachet_core::{CacheEntry, CacheKey};
use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::future::CacheBuilder;
use moka::policy::EvictionPolicy;

use crate::backend::MokaBackend;

/// Expiration policy derived from the entry itself.
///
/// Only values whose eventual fate is removal get a physical expiry:
///
/// - values that may not go stale expire with their TTL
/// - values kept stale only by an explicit window expire at its outer bound
///
/// Values carrying a validator and loading markers never expire here; the
/// lazy transitions of `CacheBackend::get` handle them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Expiration;

impl Expiry<CacheKey, CacheEntry> for Expiration {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Self::calculate_ttl(entry)
    }

    fn expire_after_update(
        &self,
        _key: &CacheKey,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // A replaced entry gets its own lifetime, not the remainder of the old one.
        Self::calculate_ttl(entry)
    }
}

impl Expiration {
    fn calculate_ttl(entry: &CacheEntry) -> Option<Duration> {
        let value = entry.value()?;
        if value.response.has_revalidation_material() && !value.must_revalidate {
            return None;
        }
        let deadline = if value.can_stale() {
            value.stale_deadline()?
        } else {
            value.expires_at()?
        };
        Some(until(deadline))
    }
}

fn until(deadline: DateTime<Utc>) -> Duration {
    let millis = (deadline - Utc::now()).num_milliseconds();
    if millis <= 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(millis as u64)
    }
}

/// Builder state before a capacity is chosen.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCapacity;

/// Builder state holding the entry-count bound.
#[derive(Debug, Clone, Copy)]
pub struct EntryCapacity(pub(crate) u64);

/// Configures a [`MokaBackend`].
///
/// `build()` is only available once [`max_entries`](Self::max_entries) has
/// been called.
///
/// ```
/// use cachet_moka::{EvictionPolicy, MokaBackend};
///
/// let backend = MokaBackend::builder()
///     .name("responses")
///     .max_entries(1_000)
///     .eviction_policy(EvictionPolicy::lru())
///     .build();
/// ```
pub struct MokaBackendBuilder<Cap> {
    capacity: Cap,
    name: String,
    eviction_policy: Option<EvictionPolicy>,
}

impl MokaBackendBuilder<NoCapacity> {
    /// Starts without a capacity; call [`max_entries`](Self::max_entries) next.
    pub fn new() -> Self {
        Self {
            capacity: NoCapacity,
            name: "moka".to_owned(),
            eviction_policy: None,
        }
    }

    /// Bounds the number of resident entries, loading markers included.
    pub fn max_entries(self, capacity: u64) -> MokaBackendBuilder<EntryCapacity> {
        MokaBackendBuilder {
            capacity: EntryCapacity(capacity),
            name: self.name,
            eviction_policy: self.eviction_policy,
        }
    }
}

impl Default for MokaBackendBuilder<NoCapacity> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Cap> MokaBackendBuilder<Cap> {
    /// Sets the name reported in logs. Defaults to `"moka"`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the eviction policy. Defaults to TinyLFU.
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }
}

impl MokaBackendBuilder<EntryCapacity> {
    /// Builds the backend.
    pub fn build(self) -> MokaBackend {
        let policy = self
            .eviction_policy
            .unwrap_or_else(EvictionPolicy::tiny_lfu);
        let cache = CacheBuilder::new(self.capacity.0)
            .eviction_policy(policy)
            .expire_after(Expiration)
            .build();

        MokaBackend {
            cache,
            name: self.name,
        }
    }
}
