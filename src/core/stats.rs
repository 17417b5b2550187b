use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Cache families tracked separately, mirroring the distinct caches the
/// layer maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFamily {
    Object,
    Dynamic,
    List,
    Relation,
}

/// Hit/miss counters for every cache family.
#[derive(Debug, Default)]
pub struct CacheCounters {
    pub object_hits: AtomicU64,
    pub object_misses: AtomicU64,
    pub dynamic_hits: AtomicU64,
    pub dynamic_misses: AtomicU64,
    pub list_hits: AtomicU64,
    pub list_misses: AtomicU64,
    pub relation_hits: AtomicU64,
    pub relation_misses: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        CacheCounters::default()
    }

    pub fn record(&self, family: CacheFamily, hit: bool) {
        let counter = match (family, hit) {
            (CacheFamily::Object, true) => &self.object_hits,
            (CacheFamily::Object, false) => &self.object_misses,
            (CacheFamily::Dynamic, true) => &self.dynamic_hits,
            (CacheFamily::Dynamic, false) => &self.dynamic_misses,
            (CacheFamily::List, true) => &self.list_hits,
            (CacheFamily::List, false) => &self.list_misses,
            (CacheFamily::Relation, true) => &self.relation_hits,
            (CacheFamily::Relation, false) => &self.relation_misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            object_hits: self.object_hits.load(Ordering::Relaxed),
            object_misses: self.object_misses.load(Ordering::Relaxed),
            dynamic_hits: self.dynamic_hits.load(Ordering::Relaxed),
            dynamic_misses: self.dynamic_misses.load(Ordering::Relaxed),
            list_hits: self.list_hits.load(Ordering::Relaxed),
            list_misses: self.list_misses.load(Ordering::Relaxed),
            relation_hits: self.relation_hits.load(Ordering::Relaxed),
            relation_misses: self.relation_misses.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub object_hits: u64,
    pub object_misses: u64,
    pub dynamic_hits: u64,
    pub dynamic_misses: u64,
    pub list_hits: u64,
    pub list_misses: u64,
    pub relation_hits: u64,
    pub relation_misses: u64,
}

impl CacheStats {
    pub fn list_hit_rate(&self) -> f64 {
        let total = self.list_hits + self.list_misses;
        if total == 0 {
            0.0
        } else {
            self.list_hits as f64 / total as f64
        }
    }
}
