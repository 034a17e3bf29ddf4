use serde::Serialize;
use std::time::{Duration, Instant};

/// A cached value together with its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached payload
    pub data: T,
    /// When this entry was stored
    pub timestamp: Instant,
    /// How long the entry stays valid after `timestamp`
    pub ttl: Duration,
    /// Number of cache hits served by this entry
    pub access_count: u64,
    /// When this entry was last read or written
    pub last_accessed: Instant,
    // position in the recency index
    pub(crate) tick: u64,
}

impl<T> CacheEntry<T> {
    pub(crate) fn new(data: T, ttl: Duration, tick: u64) -> Self {
        let now = Instant::now();
        Self {
            data,
            timestamp: now,
            ttl,
            access_count: 0,
            last_accessed: now,
            tick,
        }
    }

    pub fn age(&self) -> Duration {
        self.timestamp.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.age() > self.ttl
    }

    /// Older than `max_age`, independently of the entry's own ttl.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }
}

/// Point-in-time counters of a [`crate::ResponseCache`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    /// Percentage of lookups that were hits, rounded to two decimals
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_cleanups: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryUsage {
    pub estimated_size_bytes: usize,
    pub estimated_size_mb: f64,
    pub entry_count: usize,
}
