use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;
use std::sync::Arc;

use hybridal::core::config::Config;
use hybridal::core::types::FieldValue;
use hybridal::model::store::ObjectStore;
use hybridal::query::ast::{Operator, Predicate, Query, QueryNode};
use hybridal::schema::registry::TypeRegistry;
use hybridal::schema::schema::{EntityType, PropertyDef, PropertyKind, RelationDef};
use hybridal::storage::persistent::InMemoryPersistentStore;
use hybridal::storage::volatile::InMemoryVolatileStore;

fn build_store() -> ObjectStore {
    let registry = TypeRegistry::new()
        .register(
            EntityType::new("machine")
                .with_property(PropertyDef::new("name", PropertyKind::Str).mandatory()),
        )
        .register(
            EntityType::new("disk")
                .with_property(PropertyDef::new("name", PropertyKind::Str).mandatory())
                .with_property(
                    PropertyDef::new("size", PropertyKind::Int).with_default(FieldValue::Int(0)),
                )
                .with_relation(RelationDef::new("machine", Some("machine"), "disks")),
        )
        .finish()
        .unwrap();
    ObjectStore::new(
        Config::default(),
        Arc::new(InMemoryPersistentStore::new()),
        Arc::new(InMemoryVolatileStore::new(1 << 20)),
        registry,
    )
}

fn populate(store: &ObjectStore, disks: usize) {
    let mut machine = store.create("machine").unwrap();
    machine
        .set("name", FieldValue::Str("host".to_string()))
        .unwrap();
    machine.save().unwrap();
    for i in 0..disks {
        let mut data = HashMap::new();
        data.insert("name".to_string(), FieldValue::Str(format!("disk-{}", i)));
        data.insert("size".to_string(), FieldValue::Int(i as i64));
        let mut disk = store.create_with("disk", data).unwrap();
        if i % 2 == 0 {
            disk.set_relation("machine", Some(&machine)).unwrap();
        }
        disk.save().unwrap();
    }
}

/// Full scan with a property predicate, at several dataset sizes.
fn bench_scan_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_count");
    for disks in [100usize, 1000, 5000].iter() {
        let store = build_store();
        populate(&store, *disks);
        let query = Query::count(
            "disk",
            QueryNode::Predicate(Predicate::new(
                "size",
                Operator::GreaterThan,
                FieldValue::Int((*disks / 2) as i64),
            )),
        );
        group.bench_with_input(BenchmarkId::from_parameter(disks), disks, |b, _| {
            b.iter(|| {
                black_box(store.query_keyed(&query, "bench_uncached").unwrap());
                // Drop the entry so every iteration pays for the scan.
                store
                    .context()
                    .volatile
                    .delete(&store.context().list_key("bench_uncached"));
            });
        });
    }
    group.finish();
}

/// The same query served from the result cache.
fn bench_cached_count(c: &mut Criterion) {
    let store = build_store();
    populate(&store, 1000);
    let query = Query::count(
        "disk",
        QueryNode::Predicate(Predicate::new(
            "size",
            Operator::GreaterThan,
            FieldValue::Int(500),
        )),
    );
    store.query(&query).unwrap();
    c.bench_function("cached_count", |b| {
        b.iter(|| black_box(store.query(&query).unwrap()));
    });
}

/// Object load served by the volatile cache.
fn bench_cached_load(c: &mut Criterion) {
    let store = build_store();
    let mut disk = store.create("disk").unwrap();
    disk.set("name", FieldValue::Str("probe".to_string()))
        .unwrap();
    disk.save().unwrap();
    let guid = disk.guid().to_string();
    store.load("disk", &guid).unwrap();
    c.bench_function("cached_load", |b| {
        b.iter(|| black_box(store.load("disk", &guid).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_scan_count,
    bench_cached_count,
    bench_cached_load
);
criterion_main!(benches);
