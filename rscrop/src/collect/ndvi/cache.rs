use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::geo_core::BoundsKey;

/// Counters exposed on the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

/// Filled slot: the value and the instant its fetch finished
type Slot<V> = Arc<OnceLock<(V, Instant)>>;

struct Entry<V> {
    slot: Slot<V>,
    last_used: u64,
}

struct Inner<V> {
    entries: HashMap<BoundsKey, Entry<V>>,
    tick: u64,
    stats: CacheStats,
}

/// Bounded LRU cache with TTL, keyed strictly by rounded bounds.
///
/// Each key owns a `OnceLock` slot: concurrent misses on one key run a
/// single fetch and the other callers wait for its value. The map lock is
/// released before fetching, so other keys never wait on it.
pub struct SampleCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> SampleCache<V> {
    /// `capacity == 0` disables caching
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        SampleCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
            capacity,
            ttl,
        }
    }

    /// Return the cached value for `key`, or run `fetch` once and store it.
    /// The boolean is true when the value came from the cache (including
    /// values produced by another caller's in-flight fetch).
    pub fn get_or_insert_with<F>(&self, key: BoundsKey, fetch: F) -> (V, bool)
    where
        F: FnOnce() -> V,
    {
        if self.capacity == 0 {
            self.inner.lock().stats.misses += 1;
            return (fetch(), false);
        }

        let slot = {
            let mut inner = self.inner.lock();
            inner.tick += 1;
            let tick = inner.tick;

            let expired = inner
                .entries
                .get(&key)
                .and_then(|e| e.slot.get())
                .map_or(false, |(_, filled)| filled.elapsed() >= self.ttl);
            if expired {
                inner.entries.remove(&key);
                inner.stats.expirations += 1;
                debug!(key = %key, "cache entry expired");
            }

            if let Some(entry) = inner.entries.get_mut(&key) {
                entry.last_used = tick;
                entry.slot.clone()
            } else {
                if inner.entries.len() >= self.capacity {
                    evict_least_recent(&mut inner);
                }
                let slot = Arc::new(OnceLock::new());
                inner.entries.insert(
                    key,
                    Entry {
                        slot: slot.clone(),
                        last_used: tick,
                    },
                );
                slot
            }
        };

        let mut fetched = false;
        let value = slot
            .get_or_init(|| {
                fetched = true;
                (fetch(), Instant::now())
            })
            .0
            .clone();

        let mut inner = self.inner.lock();
        if fetched {
            inner.stats.misses += 1;
        } else {
            inner.stats.hits += 1;
            debug!(key = %key, "cache hit");
        }
        (value, !fetched)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate(&self, key: &BoundsKey) {
        self.inner.lock().entries.remove(key);
    }

    /// Remove `key` only while its stored value satisfies `is_stale`.
    /// Entries still being fetched, or refilled by another caller with a
    /// value that fails the check, stay in place.
    pub fn invalidate_if<F>(&self, key: &BoundsKey, is_stale: F) -> bool
    where
        F: FnOnce(&V) -> bool,
    {
        let mut inner = self.inner.lock();
        let stale = inner
            .entries
            .get(key)
            .and_then(|e| e.slot.get())
            .map_or(false, |(value, _)| is_stale(value));
        if stale {
            inner.entries.remove(key);
        }
        stale
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }
}

fn evict_least_recent<V>(inner: &mut Inner<V>) {
    let oldest = inner
        .entries
        .iter()
        .min_by_key(|(_, e)| e.last_used)
        .map(|(k, _)| *k);
    if let Some(key) = oldest {
        inner.entries.remove(&key);
        inner.stats.evictions += 1;
        debug!(key = %key, "cache entry evicted");
    }
}
