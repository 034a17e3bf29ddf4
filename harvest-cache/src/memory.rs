//! In-memory TTL + LRU cache. A single mutex guards both the entry map and the
//! recency index; every operation is a short, bounded critical section.
use crate::{CacheEntry, CacheStats, MemoryUsage};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_MAX_SIZE: usize = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

// Used by `memory_usage` for values that fail to serialize.
const UNSERIALIZABLE_ENTRY_ESTIMATE: usize = 1000;

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expired_cleanups: u64,
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    // access tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    next_tick: u64,
    counters: Counters,
}

impl<V> CacheState<V> {
    fn tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn evict_lru(&mut self) {
        if let Some((_, key)) = self.recency.pop_first() {
            if self.entries.remove(&key).is_some() {
                self.counters.evictions += 1;
                debug!(key = %key, "evicted least recently used entry");
            }
        }
    }
}

/// Thread-safe key/value cache with per-entry TTL and LRU eviction.
///
/// Expired entries are logically absent: [`ResponseCache::get`] treats them as
/// misses and drops them on the spot, while [`ResponseCache::cleanup_expired`]
/// sweeps the rest.
#[derive(Debug)]
pub struct ResponseCache<V> {
    max_size: usize,
    default_ttl: Duration,
    state: Mutex<CacheState<V>>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                counters: Counters::default(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState<V>> {
        // A panic while holding the lock cannot leave the maps half-updated in
        // a way later calls can't cope with, so keep serving.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state();

        let Some(expired) = state.entries.get(key).map(|e| e.is_expired()) else {
            state.counters.misses += 1;
            return None;
        };

        if expired {
            state.remove(key);
            state.counters.misses += 1;
            state.counters.expired_cleanups += 1;
            debug!(key = %key, "cache entry expired");
            return None;
        }

        let tick = state.tick();
        let entry = state.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        entry.access_count += 1;
        entry.last_accessed = std::time::Instant::now();
        let data = entry.data.clone();

        state.recency.remove(&old_tick);
        state.recency.insert(tick, key.to_string());
        state.counters.hits += 1;
        Some(data)
    }

    /// Store `value` under `key` with the default ttl.
    pub fn set(&self, key: &str, value: V) {
        self.set_with_ttl(key, value, self.default_ttl)
    }

    pub fn set_with_ttl(&self, key: &str, value: V, ttl: Duration) {
        if self.max_size == 0 {
            return;
        }
        let mut state = self.state();

        if state.remove(key).is_none() && state.entries.len() >= self.max_size {
            state.evict_lru();
        }

        let tick = state.tick();
        state
            .entries
            .insert(key.to_string(), CacheEntry::new(value, ttl, tick));
        state.recency.insert(tick, key.to_string());
    }

    pub fn delete(&self, key: &str) -> bool {
        self.state().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.recency.clear();
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut state = self.state();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove(key);
        }
        state.counters.expired_cleanups += expired.len() as u64;
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        let counters = &state.counters;
        let total = counters.hits + counters.misses;
        let hit_rate = if total > 0 {
            let rate = counters.hits as f64 / total as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };

        CacheStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hit_rate,
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            expired_cleanups: counters.expired_cleanups,
        }
    }
}

impl<V: Clone + Serialize> ResponseCache<V> {
    /// Rough size of the cached payloads, measured as their JSON length.
    pub fn memory_usage(&self) -> MemoryUsage {
        let state = self.state();
        let estimated_size_bytes = state
            .entries
            .values()
            .map(|entry| {
                serde_json::to_vec(&entry.data)
                    .map(|bytes| bytes.len())
                    .unwrap_or(UNSERIALIZABLE_ENTRY_ESTIMATE)
            })
            .sum::<usize>();

        MemoryUsage {
            estimated_size_bytes,
            estimated_size_mb: ((estimated_size_bytes as f64 / 1024.0 / 1024.0)
                * 100.0)
                .round()
                / 100.0,
            entry_count: state.entries.len(),
        }
    }
}

impl<V: Clone> Default for ResponseCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }
}
