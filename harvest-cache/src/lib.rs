//! In-process response cache for harvest.
//!
//! This crate keeps results of expensive network fetches around for a while so
//! repeated requests for the same product page do not hit the target site
//! again. Entries expire after a time-to-live and the cache is bounded by a
//! hard capacity with least-recently-used eviction.
//!
//! - [`ResponseCache`]: TTL + LRU key/value store
//! - [`cache_key`]: canonical key derivation for a logical call
//! - [`CacheSweeper`]: periodic background cleanup of expired entries

mod cache;
mod error;
mod key;
mod memory;
mod sweeper;

pub use cache::{CacheEntry, CacheStats, MemoryUsage};
pub use error::CacheError;
pub use key::cache_key;
pub use memory::{ResponseCache, DEFAULT_MAX_SIZE, DEFAULT_TTL};
pub use sweeper::{CacheSweeper, DEFAULT_CLEANUP_INTERVAL};
