use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How `save()` resolves a field that was changed both locally and by
/// another writer since this copy was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictPolicy {
    /// Silently keep the externally written value.
    RemoteWins,
    /// Silently overwrite the externally written value.
    LocalWins,
    /// Fail with a Concurrency error naming every conflicting field.
    Raise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Key prefix segregating all entity storage of this dataset.
    pub namespace: String,

    /// TTL of cached entity records in the volatile store.
    pub object_ttl: Duration,
    /// Base TTL for cached query results.
    pub list_ttl_base: Duration,
    /// Random extra TTL added per cached query result, avoiding
    /// synchronized expiry across entries.
    pub list_ttl_jitter: Duration,

    /// Guids per primary-key index chunk.
    pub page_size: usize,

    /// TTL of a held distributed lock (crash self-expiry).
    pub lock_ttl: Duration,
    /// Poll interval while waiting on a distributed lock.
    pub lock_poll: Duration,
    /// Default wait window for index/cache-link lock acquisition.
    pub lock_wait: Duration,

    pub conflict_policy: ConflictPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            namespace: "hybrid".to_string(),
            object_ttl: Duration::from_secs(300),
            list_ttl_base: Duration::from_secs(300),
            list_ttl_jitter: Duration::from_secs(300),
            page_size: 5000,
            lock_ttl: Duration::from_secs(60),
            lock_poll: Duration::from_millis(10),
            lock_wait: Duration::from_secs(60),
            conflict_policy: ConflictPolicy::LocalWins,
        }
    }
}
