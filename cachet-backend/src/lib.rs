//! Storage contract for the cachet HTTP response cache.
//!
//! Implement [`Backend`] (`find` / `set` / `remove`) to plug in your own
//! storage. Every backend automatically gets [`CacheBackend`], which applies
//! lazy expiry transitions on read and swallows storage faults so they never
//! fail a request.
//!
//! Two reference backends are included:
//!
//! - [`MemoryBackend`] - bounded in-process map with FIFO eviction
//! - [`QuotaBackend`] - JSON entries in a byte-limited string store, evicting
//!   oldest entries when a write exceeds the quota
mod backend;
mod error;
pub mod memory;
pub mod quota;

pub use backend::{Backend, BackendResult, CacheBackend};
pub use error::BackendError;
pub use memory::MemoryBackend;
pub use quota::{MemoryArea, QuotaBackend, StorageArea};

/// Status of deleting result.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteStatus {
    /// Record successfully deleted.
    Deleted(u32),
    /// Record already missing.
    Missing,
}
