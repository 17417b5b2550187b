use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Durable key-value store: the source of truth for entity records, the
/// cache-link maps and nothing else. Values are JSON text.
pub trait PersistentStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn delete(&self, key: &str);
    fn exists(&self, key: &str) -> bool;
    /// All keys starting with `prefix`, used for index self-healing.
    fn prefix(&self, prefix: &str) -> Vec<String>;
}

/// In-memory reference implementation backed by an ordered map so prefix
/// scans are range scans.
pub struct InMemoryPersistentStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryPersistentStore {
    pub fn new() -> Self {
        InMemoryPersistentStore {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for InMemoryPersistentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PersistentStore for InMemoryPersistentStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn delete(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    fn prefix(&self, prefix: &str) -> Vec<String> {
        let entries = self.entries.read();
        entries
            .range::<String, _>((Bound::Included(prefix.to_string()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect()
    }
}
