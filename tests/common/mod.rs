#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hybridal::core::config::Config;
use hybridal::core::types::FieldValue;
use hybridal::model::store::ObjectStore;
use hybridal::schema::registry::TypeRegistry;
use hybridal::schema::schema::{
    DynamicDef, EntityType, PropertyDef, PropertyKind, RelationDef,
};
use hybridal::storage::persistent::InMemoryPersistentStore;
use hybridal::storage::volatile::InMemoryVolatileStore;

/// One isolated store with the test blueprint, plus handles to the
/// backing stores and a call counter for the `used_size` dynamic.
pub struct Fixture {
    pub store: ObjectStore,
    pub persistent: Arc<InMemoryPersistentStore>,
    pub volatile: Arc<InMemoryVolatileStore>,
    pub used_size_calls: Arc<AtomicU64>,
}

pub fn fixture() -> Fixture {
    fixture_with(Config::default())
}

pub fn fixture_with(config: Config) -> Fixture {
    let persistent = Arc::new(InMemoryPersistentStore::new());
    let volatile = Arc::new(InMemoryVolatileStore::default());
    let used_size_calls = Arc::new(AtomicU64::new(0));
    let registry = registry(used_size_calls.clone());
    let store = ObjectStore::new(config, persistent.clone(), volatile.clone(), registry);
    Fixture {
        store,
        persistent,
        volatile,
        used_size_calls,
    }
}

/// machine <- emachine, disk. Disks relate to machines three ways (plain,
/// storage, one-to-one) and to themselves through parent/children.
fn registry(used_size_calls: Arc<AtomicU64>) -> TypeRegistry {
    let machine = EntityType::new("machine")
        .with_property(PropertyDef::new("name", PropertyKind::Str).mandatory())
        .with_property(PropertyDef::new("description", PropertyKind::Str))
        .with_relation(RelationDef::new("the_disk", Some("disk"), "machines"));

    let emachine = EntityType::new("emachine")
        .extends("machine")
        .with_property(PropertyDef::new("extended", PropertyKind::Str));

    let disk = EntityType::new("disk")
        .with_property(PropertyDef::new("name", PropertyKind::Str).mandatory())
        .with_property(PropertyDef::new("description", PropertyKind::Str))
        .with_property(
            PropertyDef::new("size", PropertyKind::Float).with_default(FieldValue::Float(0.0)),
        )
        .with_property(
            PropertyDef::new("order", PropertyKind::Int).with_default(FieldValue::Int(0)),
        )
        .with_property(PropertyDef::new(
            "type",
            PropertyKind::Enum(vec!["ONE".to_string(), "TWO".to_string()]),
        ))
        .with_relation(RelationDef::new("machine", Some("machine"), "disks"))
        .with_relation(RelationDef::new("storage", Some("machine"), "stored_disks"))
        .with_relation(RelationDef::new("one", Some("machine"), "one").one_to_one())
        .with_relation(RelationDef::new("parent", None, "children"))
        .with_dynamic(DynamicDef::new(
            "used_size",
            PropertyKind::Int,
            Duration::from_secs(5),
            move |object| {
                used_size_calls.fetch_add(1, Ordering::Relaxed);
                match object.data().get("order") {
                    Some(FieldValue::Int(order)) => FieldValue::Int(order * 100),
                    _ => FieldValue::Int(0),
                }
            },
        ));

    TypeRegistry::new()
        .register(machine)
        .register(emachine)
        .register(disk)
        .finish()
        .expect("test blueprint must resolve")
}

pub fn seed(pairs: &[(&str, FieldValue)]) -> HashMap<String, FieldValue> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub fn str_value(s: &str) -> FieldValue {
    FieldValue::Str(s.to_string())
}
