//! Caching layer
//!
//! TTL-bounded key/value entries for splat metadata and mirrored paths, and
//! the on-disk mirror of downloaded assets.

pub mod mirror;
pub mod store;

pub use mirror::MirrorStore;
pub use store::{CacheStore, MemoryCacheStore};
