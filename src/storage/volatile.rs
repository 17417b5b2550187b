use lru::LruCache;
use parking_lot::Mutex;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Ephemeral TTL-aware cache (memcached-like). `add` is the atomic
/// set-if-absent primitive the distributed mutex is built on.
pub trait VolatileStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>);
    fn delete(&self, key: &str);
    /// Atomically sets the key only when absent. Returns false if it exists.
    fn add(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool;
}

struct CacheEntry {
    value: Value,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }
}

/// In-memory reference implementation: bounded LRU with per-entry expiry,
/// matching the eviction behavior of a memory cache cluster.
pub struct InMemoryVolatileStore {
    entries: Mutex<LruCache<String, CacheEntry>>,
}

impl InMemoryVolatileStore {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap();
        InMemoryVolatileStore {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn entry(value: Value, ttl: Option<Duration>) -> CacheEntry {
        CacheEntry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }
}

impl Default for InMemoryVolatileStore {
    fn default() -> Self {
        Self::new(16384)
    }
}

impl VolatileStore for InMemoryVolatileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if !entry.expired() => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let mut entries = self.entries.lock();
        entries.put(key.to_string(), Self::entry(value, ttl));
    }

    fn delete(&self, key: &str) {
        self.entries.lock().pop(key);
    }

    fn add(&self, key: &str, value: Value, ttl: Option<Duration>) -> bool {
        let mut entries = self.entries.lock();
        let occupied = match entries.get(key) {
            Some(entry) if !entry.expired() => true,
            Some(_) => {
                entries.pop(key);
                false
            }
            None => false,
        };
        if occupied {
            return false;
        }
        entries.put(key.to_string(), Self::entry(value, ttl));
        true
    }
}
