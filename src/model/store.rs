use std::collections::HashMap;
use std::sync::Arc;

use crate::core::config::{Config, ConflictPolicy};
use crate::core::error::Result;
use crate::core::stats::{CacheCounters, CacheStats};
use crate::core::types::FieldValue;
use crate::model::object::DataObject;
use crate::query::ast::Query;
use crate::query::list::{self, ListResult};
use crate::schema::registry::TypeRegistry;
use crate::storage::mutex::DistributedMutex;
use crate::storage::persistent::PersistentStore;
use crate::storage::volatile::VolatileStore;

/// Shared handle to everything the layer needs: configuration, the two
/// store clients, the type registry and the cache counters. Injected into
/// every component instead of living in process-wide globals, so tests can
/// build and tear down isolated instances.
pub struct Context {
    pub config: Config,
    pub persistent: Arc<dyn PersistentStore>,
    pub volatile: Arc<dyn VolatileStore>,
    pub registry: TypeRegistry,
    pub counters: CacheCounters,
}

impl Context {
    /// Storage key of an entity record.
    pub fn data_key(&self, type_name: &str, guid: &str) -> String {
        format!("{}_data_{}_{}", self.config.namespace, type_name, guid)
    }

    /// Prefix under which every record of a type lives.
    pub fn data_prefix(&self, type_name: &str) -> String {
        format!("{}_data_{}_", self.config.namespace, type_name)
    }

    /// Key of a cached query result or reverse-relation entry.
    pub fn list_key(&self, suffix: &str) -> String {
        format!("{}_list_{}", self.config.namespace, suffix)
    }

    /// Key of the cache-dependency map of a type.
    pub fn cachelink_key(&self, type_name: &str) -> String {
        format!("{}_listcache_{}", self.config.namespace, type_name)
    }

    /// Chunk-list pointer of the primary-key index of a type.
    pub fn pk_key(&self, type_name: &str) -> String {
        format!("{}_primarykeys_{}", self.config.namespace, type_name)
    }

    /// Key of the cached structural-relation map of a type.
    pub fn relations_key(&self, type_name: &str) -> String {
        format!("{}_relations_{}", self.config.namespace, type_name)
    }

    /// Distributed mutex for a named shared resource.
    pub fn mutex(&self, name: &str) -> DistributedMutex {
        DistributedMutex::new(
            self.volatile.clone(),
            format!("{}_lock_{}", self.config.namespace, name),
            self.config.lock_ttl,
            self.config.lock_poll,
        )
    }
}

/// Entry point of the hybrid object layer.
pub struct ObjectStore {
    ctx: Arc<Context>,
}

impl ObjectStore {
    pub fn new(
        config: Config,
        persistent: Arc<dyn PersistentStore>,
        volatile: Arc<dyn VolatileStore>,
        registry: TypeRegistry,
    ) -> Self {
        ObjectStore {
            ctx: Arc::new(Context {
                config,
                persistent,
                volatile,
                registry,
                counters: CacheCounters::new(),
            }),
        }
    }

    /// New unsaved instance with a fresh guid and blueprint defaults.
    pub fn create(&self, type_name: &str) -> Result<DataObject> {
        DataObject::new(self.ctx.clone(), type_name, None, self.ctx.config.conflict_policy)
    }

    /// New unsaved instance pre-seeded with initial property values.
    pub fn create_with(
        &self,
        type_name: &str,
        data: HashMap<String, FieldValue>,
    ) -> Result<DataObject> {
        DataObject::new(
            self.ctx.clone(),
            type_name,
            Some(data),
            self.ctx.config.conflict_policy,
        )
    }

    pub fn load(&self, type_name: &str, guid: &str) -> Result<DataObject> {
        DataObject::load(
            self.ctx.clone(),
            type_name,
            guid,
            self.ctx.config.conflict_policy,
        )
    }

    pub fn load_with_policy(
        &self,
        type_name: &str,
        guid: &str,
        policy: ConflictPolicy,
    ) -> Result<DataObject> {
        DataObject::load(self.ctx.clone(), type_name, guid, policy)
    }

    /// Runs a predicate-tree query; see `query::list`.
    pub fn query(&self, query: &Query) -> Result<ListResult> {
        list::run(&self.ctx, query, None)
    }

    /// Same, with a caller-chosen cache key instead of the content hash.
    pub fn query_keyed(&self, query: &Query, key: &str) -> Result<ListResult> {
        list::run(&self.ctx, query, Some(key))
    }

    pub fn stats(&self) -> CacheStats {
        self.ctx.counters.snapshot()
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }
}
