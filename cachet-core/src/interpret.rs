//! Cache-control header interpretation.
//!
//! [`interpret`] turns response headers into a caching decision:
//!
//! 1. `Cache-Control`
//!    - `no-cache` / `no-store`, or `private` held by a server, gives
//!      [`Interpretation::DontCache`]
//!    - `immutable` caches for [`IMMUTABLE_TTL`]
//!    - `max-age` minus `Age` (floored at zero) gives the cache duration;
//!      the stale window comes from `max-stale`, else `stale-while-revalidate`
//! 2. `Expires` in the future gives the remaining time; past or unparsable
//!    gives [`Interpretation::DontCache`]
//! 3. otherwise [`Interpretation::NotEnoughHeaders`]
//!
//! `max-stale` wins over `stale-while-revalidate` when both are present.
//! Revalidation here is always synchronous, so the client-driven window is
//! the one honored. This is a deliberate simplification of RFC 9111.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use http::HeaderMap;
use http::header::{AGE, CACHE_CONTROL, EXPIRES};
use serde::{Deserialize, Serialize};

/// Duration used for `immutable` responses.
pub const IMMUTABLE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Where the cache runs. `private` responses may only be kept client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// Shared cache, e.g. inside a server rendering on behalf of many users.
    #[default]
    Server,
    /// Private cache owned by a single user agent.
    Client,
}

/// Outcome of [`interpret`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpretation {
    /// The response must not be stored.
    DontCache,
    /// No usable header. Fall back to the configured TTL.
    NotEnoughHeaders,
    /// Store for `cache`, optionally serving stale for `stale` afterwards.
    Cache {
        /// Freshness lifetime.
        cache: Duration,
        /// Stale reuse window after expiry.
        stale: Option<Duration>,
    },
}

/// Parsed `Cache-Control` directives relevant to caching decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// `no-cache`
    pub no_cache: bool,
    /// `no-store`
    pub no_store: bool,
    /// `private`
    pub private: bool,
    /// `immutable`
    pub immutable: bool,
    /// `must-revalidate`
    pub must_revalidate: bool,
    /// `max-age`, seconds.
    pub max_age: Option<u64>,
    /// `max-stale`, seconds.
    pub max_stale: Option<u64>,
    /// `stale-while-revalidate`, seconds.
    pub stale_while_revalidate: Option<u64>,
}

impl CacheControl {
    /// Parses one `Cache-Control` value. Unknown directives are ignored.
    pub fn parse(header: &str) -> Self {
        let mut control = CacheControl::default();
        for directive in header.split(',') {
            let directive = directive.trim().to_ascii_lowercase();
            if directive.is_empty() {
                continue;
            }
            let (name, value) = match directive.split_once('=') {
                Some((name, value)) => (name.trim(), Some(value.trim().trim_matches('"'))),
                None => (directive.as_str(), None),
            };
            let seconds = value.and_then(|v| v.parse::<u64>().ok());
            match name {
                "no-cache" => control.no_cache = true,
                "no-store" => control.no_store = true,
                "private" => control.private = true,
                "immutable" => control.immutable = true,
                "must-revalidate" => control.must_revalidate = true,
                "max-age" => control.max_age = seconds.or(control.max_age),
                "max-stale" => control.max_stale = seconds.or(control.max_stale),
                "stale-while-revalidate" => {
                    control.stale_while_revalidate = seconds.or(control.stale_while_revalidate)
                }
                _ => {}
            }
        }
        control
    }

    /// Parses every `Cache-Control` value of a header map.
    ///
    /// Returns `None` when the header is absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let values: Vec<&str> = headers
            .get_all(CACHE_CONTROL)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(Self::parse(&values.join(",")))
    }

    /// Stale window, `max-stale` first.
    pub fn stale(&self) -> Option<Duration> {
        self.max_stale
            .or(self.stale_while_revalidate)
            .map(Duration::from_secs)
    }
}

/// Interprets response headers into a caching decision.
pub fn interpret(headers: &HeaderMap, location: Location, now: DateTime<Utc>) -> Interpretation {
    if let Some(control) = CacheControl::from_headers(headers) {
        if control.no_cache || control.no_store {
            return Interpretation::DontCache;
        }
        if control.private && location == Location::Server {
            return Interpretation::DontCache;
        }
        if control.immutable {
            return Interpretation::Cache {
                cache: IMMUTABLE_TTL,
                stale: control.stale(),
            };
        }
        if let Some(max_age) = control.max_age {
            let age = headers
                .get(AGE)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .unwrap_or(0);
            return Interpretation::Cache {
                cache: Duration::from_secs(max_age.saturating_sub(age)),
                stale: control.stale(),
            };
        }
    }

    if let Some(expires) = headers.get(EXPIRES) {
        let Some(expires) = expires.to_str().ok().and_then(parse_http_date) else {
            return Interpretation::DontCache;
        };
        return match (expires - now).to_std() {
            Ok(cache) => Interpretation::Cache { cache, stale: None },
            Err(_) => Interpretation::DontCache,
        };
    }

    Interpretation::NotEnoughHeaders
}

/// Parses an HTTP date in IMF-fixdate, RFC 850 or asctime form.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Formats an instant as an IMF-fixdate (`Wed, 21 Oct 2015 07:28:00 GMT`).
pub fn format_http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
