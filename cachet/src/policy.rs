//! Per-request cache policy.
//!
//! [`PolicyConfig`] holds everything that can be loaded from a config file.
//! [`CachePolicy`] wraps it with the parts that are code: the cache
//! predicate, update directives and callbacks.
//!
//! ```
//! use std::time::Duration;
//! use cachet::policy::{CachePolicy, PolicyConfig, VaryPolicy};
//!
//! let policy = CachePolicy::new(PolicyConfig {
//!     ttl: Duration::from_secs(60),
//!     vary: VaryPolicy::Headers(vec!["authorization".to_owned()]),
//!     ..Default::default()
//! });
//! assert_eq!(policy.config().ttl, Duration::from_secs(60));
//! ```

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cachet_core::{CacheEntry, CacheKey, CachedValue, Neutral, Predicate, Response};
use chrono::{DateTime, Utc};
use http::Method;
use serde::{Deserialize, Serialize};

/// Whether a previous snapshot may answer a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StaleIfError {
    /// Failures always propagate.
    Disabled,
    /// Serve the snapshot while it is inside its stale window.
    #[default]
    Enabled,
    /// Serve the snapshot until `created_at + window`.
    Window(Duration),
}

impl StaleIfError {
    /// Whether `value` may be served at `now`.
    pub fn allows(&self, value: &CachedValue, now: DateTime<Utc>) -> bool {
        match self {
            StaleIfError::Disabled => false,
            StaleIfError::Enabled => !value.must_revalidate && value.within_stale_window(now),
            // A window past the representable range is unbounded.
            StaleIfError::Window(window) => chrono::Duration::from_std(*window)
                .ok()
                .and_then(|window| value.created_at.checked_add_signed(window))
                .is_none_or(|deadline| now < deadline),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StaleIfErrorRepr {
    Flag(bool),
    Window(#[serde(with = "humantime_serde")] Duration),
}

impl Serialize for StaleIfError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            StaleIfError::Disabled => StaleIfErrorRepr::Flag(false),
            StaleIfError::Enabled => StaleIfErrorRepr::Flag(true),
            StaleIfError::Window(window) => StaleIfErrorRepr::Window(*window),
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StaleIfError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match StaleIfErrorRepr::deserialize(deserializer)? {
            StaleIfErrorRepr::Flag(true) => StaleIfError::Enabled,
            StaleIfErrorRepr::Flag(false) => StaleIfError::Disabled,
            StaleIfErrorRepr::Window(window) => StaleIfError::Window(window),
        })
    }
}

/// How responses that carry `Vary` are keyed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaryPolicy {
    /// Ignore `Vary`.
    Disabled,
    /// Learn the header list from the first response per base key.
    #[default]
    Auto,
    /// Key every request by these headers up front.
    Headers(Vec<String>),
}

/// Loadable part of the policy.
///
/// Every field has a default, so a config file only names what it changes:
///
/// ```
/// use std::time::Duration;
/// use cachet::policy::PolicyConfig;
///
/// let config: PolicyConfig = serde_json::from_str(r#"{ "ttl": "30s" }"#).unwrap();
/// assert_eq!(config.ttl, Duration::from_secs(30));
/// assert!(config.etag);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// When `false` every request goes straight to the transport.
    pub enabled: bool,
    /// Lifetime used when headers are ignored or say nothing.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Stale window used when headers do not provide one.
    #[serde(with = "humantime_serde")]
    pub stale_ttl: Option<Duration>,
    /// Methods eligible for caching.
    #[serde(with = "methods")]
    pub methods: Vec<Method>,
    /// Derive lifetimes from `Cache-Control` / `Expires`.
    pub interpret_header: bool,
    /// Send `If-None-Match` when revalidating.
    pub etag: bool,
    /// Send `If-Modified-Since` when revalidating.
    pub modified_since: bool,
    /// Failure fallback.
    pub stale_if_error: StaleIfError,
    /// `Vary` handling.
    pub vary: VaryPolicy,
    /// Skip fresh hits and always fetch.
    #[serde(rename = "override")]
    pub override_cache: bool,
    /// Upper bound for a loading marker when the request has no timeout.
    #[serde(with = "humantime_serde")]
    pub loading_timeout: Option<Duration>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(5 * 60),
            stale_ttl: None,
            methods: vec![Method::GET, Method::HEAD],
            interpret_header: true,
            etag: true,
            modified_since: false,
            stale_if_error: StaleIfError::Enabled,
            vary: VaryPolicy::Auto,
            override_cache: false,
            loading_timeout: None,
        }
    }
}

impl PolicyConfig {
    /// Whether requests with `method` go through the cache.
    pub fn is_cacheable(&self, method: &Method) -> bool {
        self.enabled && self.methods.contains(method)
    }
}

mod methods {
    use http::Method;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(methods: &[Method], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(methods.iter().map(Method::as_str))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Method>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .into_iter()
            .map(|name| {
                Method::from_bytes(name.to_ascii_uppercase().as_bytes())
                    .map_err(|_| D::Error::custom(format!("invalid method `{name}`")))
            })
            .collect()
    }
}

/// What went wrong with an upstream call.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// The transport returned an error.
    Transport(&'a (dyn Error + Send + Sync + 'static)),
    /// The transport answered with a rejected status.
    Status(&'a Response),
}

type StaleIfErrorFn = dyn Fn(&Failure<'_>, &CachedValue) -> bool + Send + Sync;
type TransformFn = dyn Fn(CacheEntry, &Response) -> Option<CacheEntry> + Send + Sync;
type HydrateFn = dyn Fn(&CacheEntry) + Send + Sync;

/// Change applied to another key after a successful response.
#[derive(Clone)]
pub enum UpdateDirective {
    /// Remove the key.
    Delete,
    /// Replace the key with the result of the function. `None` removes it.
    Transform(Arc<TransformFn>),
}

impl UpdateDirective {
    /// Builds a [`UpdateDirective::Transform`].
    pub fn transform<F>(f: F) -> Self
    where
        F: Fn(CacheEntry, &Response) -> Option<CacheEntry> + Send + Sync + 'static,
    {
        UpdateDirective::Transform(Arc::new(f))
    }
}

impl fmt::Debug for UpdateDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateDirective::Delete => f.write_str("Delete"),
            UpdateDirective::Transform(_) => f.write_str("Transform(..)"),
        }
    }
}

/// Full policy for a request.
#[derive(Clone)]
pub struct CachePolicy {
    config: PolicyConfig,
    predicate: Arc<dyn Predicate>,
    stale_if_error: Option<Arc<StaleIfErrorFn>>,
    update: Vec<(CacheKey, UpdateDirective)>,
    hydrate: Option<Arc<HydrateFn>>,
}

impl fmt::Debug for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePolicy")
            .field("config", &self.config)
            .field("predicate", &self.predicate)
            .field("stale_if_error", &self.stale_if_error.is_some())
            .field("update", &self.update)
            .field("hydrate", &self.hydrate.is_some())
            .finish()
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::new(PolicyConfig::default())
    }
}

impl From<PolicyConfig> for CachePolicy {
    fn from(config: PolicyConfig) -> Self {
        Self::new(config)
    }
}

impl CachePolicy {
    /// Policy with no predicate, directives or callbacks.
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            predicate: Arc::new(Neutral),
            stale_if_error: None,
            update: Vec::new(),
            hydrate: None,
        }
    }

    /// Only responses accepted by `predicate` are stored.
    pub fn predicate(mut self, predicate: impl Predicate + 'static) -> Self {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Decides stale-if-error per failure instead of [`PolicyConfig::stale_if_error`].
    pub fn stale_if_error_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Failure<'_>, &CachedValue) -> bool + Send + Sync + 'static,
    {
        self.stale_if_error = Some(Arc::new(f));
        self
    }

    /// Applies `directive` to `key` after every successful response.
    pub fn update(mut self, key: CacheKey, directive: UpdateDirective) -> Self {
        self.update.push((key, directive));
        self
    }

    /// Called with the current entry before a forced refetch replaces it.
    pub fn hydrate<F>(mut self, f: F) -> Self
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        self.hydrate = Some(Arc::new(f));
        self
    }

    /// Forces a refetch even when a fresh entry exists.
    pub fn override_cache(mut self, value: bool) -> Self {
        self.config.override_cache = value;
        self
    }

    /// The loadable settings.
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Mutable access to the loadable settings.
    pub fn config_mut(&mut self) -> &mut PolicyConfig {
        &mut self.config
    }

    pub(crate) fn accepts(&self, response: &Response) -> bool {
        self.predicate.check(response)
    }

    pub(crate) fn updates(&self) -> &[(CacheKey, UpdateDirective)] {
        &self.update
    }

    pub(crate) fn run_hydrate(&self, entry: &CacheEntry) {
        if let Some(hydrate) = &self.hydrate {
            hydrate(entry);
        }
    }

    pub(crate) fn serve_stale(
        &self,
        failure: &Failure<'_>,
        value: &CachedValue,
        now: DateTime<Utc>,
    ) -> bool {
        match &self.stale_if_error {
            Some(decide) => decide(failure, value),
            None => self.config.stale_if_error.allows(value, now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PolicyConfig::default();
        assert!(config.is_cacheable(&Method::GET));
        assert!(config.is_cacheable(&Method::HEAD));
        assert!(!config.is_cacheable(&Method::POST));
        assert_eq!(config.stale_if_error, StaleIfError::Enabled);
        assert_eq!(config.vary, VaryPolicy::Auto);
    }

    #[test]
    fn test_disabled_policy_caches_nothing() {
        let config = PolicyConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!config.is_cacheable(&Method::GET));
    }

    #[test]
    fn test_window_bounds_stale_use() {
        let created = Utc::now();
        let value = CachedValue::new(Response::ok("x"), created, Duration::from_secs(10));
        let window = StaleIfError::Window(Duration::from_secs(60));

        assert!(window.allows(&value, created + chrono::Duration::seconds(59)));
        assert!(!window.allows(&value, created + chrono::Duration::seconds(60)));
        assert!(!StaleIfError::Disabled.allows(&value, created));
    }

    #[test]
    fn test_window_beyond_date_range_is_unbounded() {
        let created = Utc::now();
        let value = CachedValue::new(Response::ok("x"), created, Duration::from_secs(10));
        let window = StaleIfError::Window(Duration::from_secs(10_000_000_000_000));

        assert!(window.allows(&value, created));
        assert!(window.allows(&value, created + chrono::Duration::days(365 * 100)));
    }

    #[test]
    fn test_enabled_respects_must_revalidate() {
        let created = Utc::now();
        let mut value = CachedValue::new(
            Response::ok("x").with_header("etag", "\"a\""),
            created,
            Duration::from_secs(10),
        );
        let later = created + chrono::Duration::seconds(30);
        assert!(StaleIfError::Enabled.allows(&value, later));

        value.must_revalidate = true;
        assert!(!StaleIfError::Enabled.allows(&value, later));
    }

    #[test]
    fn test_predicate_override() {
        let created = Utc::now();
        let value = CachedValue::new(Response::ok("x"), created, Duration::from_secs(10));
        let policy = CachePolicy::default()
            .stale_if_error_with(|failure, _| matches!(failure, Failure::Status(r) if r.status.is_server_error()));

        let unavailable = Response::new(http::StatusCode::SERVICE_UNAVAILABLE, "");
        let not_found = Response::new(http::StatusCode::NOT_FOUND, "");
        assert!(policy.serve_stale(&Failure::Status(&unavailable), &value, created));
        assert!(!policy.serve_stale(&Failure::Status(&not_found), &value, created));
    }
}
