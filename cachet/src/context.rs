//! What `execute` hands back.

use cachet_core::{CacheKey, Response};

pub use cachet_core::CacheStatus;

/// A response plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// The response, from storage or the transport.
    pub response: Response,
    /// Key the response was stored or looked up under.
    pub id: CacheKey,
    /// `true` when the transport produced no new body for this caller.
    pub cached: bool,
    /// `true` when a stale snapshot answered a failed request.
    pub stale: bool,
}

impl CachedResponse {
    pub(crate) fn fetched(response: Response, id: CacheKey) -> Self {
        Self {
            response,
            id,
            cached: false,
            stale: false,
        }
    }

    pub(crate) fn from_cache(response: Response, id: CacheKey, stale: bool) -> Self {
        Self {
            response,
            id,
            cached: true,
            stale,
        }
    }

    /// Hit, miss or stale.
    pub fn status(&self) -> CacheStatus {
        CacheStatus::from_flags(self.cached, self.stale)
    }

    /// Drops the cache metadata.
    pub fn into_response(self) -> Response {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        let key = CacheKey::new("k");
        let fetched = CachedResponse::fetched(Response::ok("a"), key.clone());
        assert_eq!(fetched.status(), CacheStatus::Miss);

        let hit = CachedResponse::from_cache(Response::ok("a"), key.clone(), false);
        assert_eq!(hit.status(), CacheStatus::Hit);

        let stale = CachedResponse::from_cache(Response::ok("a"), key, true);
        assert_eq!(stale.status(), CacheStatus::Stale);
    }
}
