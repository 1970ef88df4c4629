#![warn(missing_docs)]
//! In-memory storage backend for cachet using [Moka](https://github.com/moka-rs/moka).
//!
//! Unlike [`MemoryBackend`](cachet_backend::MemoryBackend), which evicts in
//! insertion order, Moka evicts with TinyLFU and drops entries on its own
//! once they can no longer be served or revalidated.
//!
//! ```
//! use cachet_moka::MokaBackend;
//!
//! let backend = MokaBackend::builder()
//!     .max_entries(10_000)
//!     .build();
//! ```

mod backend;
mod builder;

pub use backend::MokaBackend;
pub use builder::{EntryCapacity, MokaBackendBuilder, NoCapacity};
pub use moka::policy::EvictionPolicy;
