//! Metrics declaration and recording.
//!
//! Everything here compiles to no-ops unless the `metrics` feature is on.

use std::time::Duration;

use cachet_core::CacheStatus;

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
lazy_static! {
    /// Track number of fresh hits.
    pub static ref CACHE_HIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cachet_cache_hit_total",
            "Total number of cache hit events."
        );
        "cachet_cache_hit_total"
    };
    /// Track number of responses fetched from the transport.
    pub static ref CACHE_MISS_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cachet_cache_miss_total",
            "Total number of cache miss events."
        );
        "cachet_cache_miss_total"
    };
    /// Track number of stale responses served after a failure.
    pub static ref CACHE_STALE_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cachet_cache_stale_total",
            "Total number of cache stale events."
        );
        "cachet_cache_stale_total"
    };
    /// Track number of callers that joined an in-flight request.
    pub static ref DEDUP_WAIT_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cachet_dedup_wait_total",
            "Total number of callers that waited for an in-flight request."
        );
        "cachet_dedup_wait_total"
    };
    /// Track number of failures answered from a previous snapshot.
    pub static ref STALE_FALLBACK_COUNTER: &'static str = {
        metrics::describe_counter!(
            "cachet_stale_fallback_total",
            "Total number of upstream failures answered with a stale snapshot."
        );
        "cachet_stale_fallback_total"
    };
    /// Histogram of transport call durations.
    pub static ref UPSTREAM_DURATION: &'static str = {
        metrics::describe_histogram!(
            "cachet_upstream_duration_seconds",
            metrics::Unit::Seconds,
            "Duration of upstream requests in seconds."
        );
        "cachet_upstream_duration_seconds"
    };
}

/// Records the outcome of one `execute` call.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_status(status: CacheStatus, backend: &str) {
    let counter = match status {
        CacheStatus::Hit => *CACHE_HIT_COUNTER,
        CacheStatus::Miss => *CACHE_MISS_COUNTER,
        CacheStatus::Stale => *CACHE_STALE_COUNTER,
    };
    metrics::counter!(counter, "backend" => backend.to_string()).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_status(_status: CacheStatus, _backend: &str) {}

/// Records a caller joining an in-flight request.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_dedup_wait() {
    metrics::counter!(*DEDUP_WAIT_COUNTER).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_dedup_wait() {}

/// Records an upstream failure answered with a stale snapshot.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_stale_fallback() {
    metrics::counter!(*STALE_FALLBACK_COUNTER).increment(1);
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_stale_fallback() {}

/// Records how long the transport took.
#[cfg(feature = "metrics")]
#[inline]
pub fn record_upstream_duration(duration: Duration, status: Option<u16>) {
    let status = status.map_or_else(|| "error".to_owned(), |code| code.to_string());
    metrics::histogram!(*UPSTREAM_DURATION, "status" => status).record(duration.as_secs_f64());
}

/// No-op version when metrics feature is disabled.
#[cfg(not(feature = "metrics"))]
#[inline]
pub fn record_upstream_duration(_duration: Duration, _status: Option<u16>) {}
