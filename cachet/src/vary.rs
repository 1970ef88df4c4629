//! Learned `Vary` schemes.
//!
//! With [`VaryPolicy::Auto`](crate::policy::VaryPolicy::Auto) the header list
//! is unknown until the first response for a base key arrives. The registry
//! remembers it so later requests compute their variant key up front.

use cachet_core::CacheKey;
use dashmap::DashMap;
use tracing::debug;

/// Header names per base key.
#[derive(Debug, Default)]
pub struct VaryRegistry {
    schemes: DashMap<CacheKey, Vec<String>>,
}

impl VaryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Header names learned for `base`.
    pub fn scheme(&self, base: &CacheKey) -> Option<Vec<String>> {
        self.schemes.get(base).map(|names| names.clone())
    }

    /// Records the header names `base` varies on.
    pub fn learn(&self, base: &CacheKey, names: &[String]) {
        let mut names: Vec<String> = names.iter().map(|name| name.to_ascii_lowercase()).collect();
        names.sort();
        names.dedup();
        debug!(key = %base, ?names, "learned vary scheme");
        self.schemes.insert(base.clone(), names);
    }

    /// Forgets the scheme for `base`.
    pub fn forget(&self, base: &CacheKey) -> bool {
        self.schemes.remove(base).is_some()
    }
}
