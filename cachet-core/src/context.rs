//! Cache status reported alongside every response.

/// Whether a response was served from storage, fetched, or served stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheStatus {
    /// Served from a stored entry (fresh hit, revalidated entry or shared
    /// in-flight result).
    Hit,
    /// Fetched from the transport.
    #[default]
    Miss,
    /// Served from an expired entry because the transport failed.
    Stale,
}

impl CacheStatus {
    /// Returns the status as a string slice.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Stale => "stale",
        }
    }

    /// Derives the status from the `cached` / `stale` response flags.
    pub const fn from_flags(cached: bool, stale: bool) -> Self {
        match (cached, stale) {
            (_, true) => CacheStatus::Stale,
            (true, false) => CacheStatus::Hit,
            (false, false) => CacheStatus::Miss,
        }
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
