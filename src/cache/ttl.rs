//! Bounded in-memory cache with per-entry time-to-live.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Counters for monitoring hit rates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    /// Hit rate in 0.0..=1.0.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    /// Recency tick, also the key into `Inner::recency`.
    tick: u64,
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// tick -> key, oldest first.
    recency: BTreeMap<u64, K>,
    next_tick: u64,
    stats: CacheStats,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some((_, key)) = self.recency.pop_first() else {
            return false;
        };
        self.entries.remove(&key);
        self.stats.evictions += 1;
        true
    }
}

/// Thread-safe LRU cache whose entries expire `ttl` after insertion.
///
/// Expiry is lazy: an expired entry is dropped by the lookup that finds it.
/// When the cache is full, `set` evicts the least recently used entry.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    max_entries: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                next_tick: 0,
                stats: CacheStats::default(),
            }),
            max_entries,
            ttl,
        }
    }

    /// Negative and NaN TTLs become zero; TTLs too large for a `Duration`
    /// (infinity included) saturate to `Duration::MAX`.
    pub fn with_ttl_seconds(max_entries: usize, ttl_seconds: f64) -> Self {
        let ttl = Duration::try_from_secs_f64(ttl_seconds.max(0.0)).unwrap_or(Duration::MAX);
        Self::new(max_entries, ttl)
    }

    // A panic while holding the lock cannot leave the maps half-updated in a
    // way that matters to callers, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns a clone of the live value for `key`, if any.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();

        let expired = match inner.entries.get(key) {
            None => {
                inner.stats.misses += 1;
                return None;
            }
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
        };

        if expired {
            inner.remove(key);
            inner.stats.expirations += 1;
            inner.stats.misses += 1;
            return None;
        }

        let tick = inner.bump();
        let entry = inner.entries.get_mut(key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let value = entry.value.clone();
        inner.recency.remove(&old_tick);
        inner.recency.insert(tick, key.clone());
        inner.stats.hits += 1;
        Some(value)
    }

    /// Inserts or replaces `key`, evicting the least recently used entry
    /// when the cache is full.
    pub fn set(&self, key: K, value: V) {
        if self.max_entries == 0 {
            return;
        }

        let mut inner = self.lock();
        inner.remove(&key);
        while inner.entries.len() >= self.max_entries {
            if !inner.evict_lru() {
                break;
            }
        }

        let tick = inner.bump();
        inner.recency.insert(tick, key.clone());
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                tick,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.recency.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
