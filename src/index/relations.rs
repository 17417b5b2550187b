//! Structural relation map and the reverse-relation index.
//!
//! Reverse sets answer "which instances of type R point at object O
//! through relation r". They are built by scanning the owning type
//! without holding the lock; every entry carries a random version token
//! so the merge step can detect entries rewritten during the scan and
//! leave them alone.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::CacheFamily;
use crate::core::types::FieldValue;
use crate::index::primary_keys;
use crate::model::object::DataObject;
use crate::model::store::Context;
use crate::query::invalidation;
use crate::query::list::list_ttl;

/// One relation as seen from its target type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignRelation {
    /// Type declaring the relation.
    pub remote_type: String,
    /// Relation (foreign key) field on the declaring type.
    pub remote_key: String,
    /// Accessor name on the target type.
    pub accessor: String,
    pub one_to_one: bool,
}

/// Result of a reverse-relation lookup.
pub struct RelationSet {
    pub guids: Vec<String>,
    pub from_cache: bool,
}

/// Every relation pointing at the given type, derived from the registry
/// and cached in the volatile store.
pub fn foreign_relations(ctx: &Context, type_name: &str) -> Result<Vec<ForeignRelation>> {
    let cache_key = ctx.relations_key(type_name);
    if let Some(value) = ctx.volatile.get(&cache_key) {
        ctx.counters.record(CacheFamily::Relation, true);
        return Ok(serde_json::from_value(value)?);
    }
    ctx.counters.record(CacheFamily::Relation, false);

    let mut found = Vec::new();
    for remote in ctx.registry.types() {
        for relation in &remote.relations {
            if remote.relation_target(relation) == type_name {
                found.push(ForeignRelation {
                    remote_type: remote.name.clone(),
                    remote_key: relation.name.clone(),
                    accessor: relation.foreign_key.clone(),
                    one_to_one: relation.one_to_one,
                });
            }
        }
    }
    ctx.volatile
        .set(&cache_key, serde_json::to_value(&found)?, None);
    Ok(found)
}

fn set_key(ctx: &Context, owner_type: &str, owner_guid: &str, accessor: &str) -> String {
    ctx.list_key(&format!("{}_{}_{}", owner_type, owner_guid, accessor))
}

/// Guids of every `remote_type` instance whose `remote_key` relation
/// points at `owner_guid`. Served from the reverse index when present,
/// rebuilt by a full scan of the owning type otherwise; one rebuild
/// refreshes the entries of every owner of the relation, plus the
/// sibling entries the scan passes by.
pub fn reverse_set(
    ctx: &Arc<Context>,
    remote_type: &str,
    remote_key: &str,
    owner_type: &str,
    accessor: &str,
    owner_guid: &str,
) -> Result<RelationSet> {
    let wanted = set_key(ctx, owner_type, owner_guid, accessor);
    if let Some(entry) = ctx.volatile.get(&wanted) {
        ctx.counters.record(CacheFamily::Relation, true);
        return Ok(RelationSet {
            guids: parse_set(&entry)?,
            from_cache: true,
        });
    }
    ctx.counters.record(CacheFamily::Relation, false);

    let remote = ctx.registry.resolve(remote_type)?;

    // Scan without the lock. Versions are recorded the moment a key is
    // first touched so a concurrent rebuild finishing during our scan is
    // detected at merge time.
    let mut sets: HashMap<String, Vec<String>> = HashMap::new();
    let mut versions: HashMap<String, Option<u64>> = HashMap::new();
    let mut set_fields: HashMap<String, String> = HashMap::new();
    sets.insert(wanted.clone(), Vec::new());
    versions.insert(wanted.clone(), entry_version(ctx, &wanted));
    set_fields.insert(wanted.clone(), remote_key.to_string());

    // One rebuild warms the whole relation: every owner gets an entry,
    // including owners nothing points at.
    for guid in primary_keys::get(ctx, owner_type)? {
        let key = set_key(ctx, owner_type, &guid, accessor);
        versions
            .entry(key.clone())
            .or_insert_with(|| entry_version(ctx, &key));
        set_fields
            .entry(key.clone())
            .or_insert_with(|| remote_key.to_string());
        sets.entry(key).or_default();
    }

    for guid in primary_keys::get(ctx, &remote.name)? {
        let object = match DataObject::load(
            ctx.clone(),
            &remote.name,
            &guid,
            ctx.config.conflict_policy,
        ) {
            Ok(object) => object,
            Err(e) if e.kind == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        for relation in &remote.relations {
            let target_type = remote.relation_target(relation).to_string();
            if let Some(FieldValue::Str(target_guid)) = object.data().get(&relation.name) {
                let key = set_key(ctx, &target_type, target_guid, &relation.foreign_key);
                versions
                    .entry(key.clone())
                    .or_insert_with(|| entry_version(ctx, &key));
                set_fields
                    .entry(key.clone())
                    .or_insert_with(|| relation.name.clone());
                sets.entry(key).or_default().push(guid.clone());
            }
        }
    }

    // Entries must be registered before they are written, so a save
    // landing in between still purges them.
    let registrations: Vec<(String, Vec<String>)> = sets
        .keys()
        .map(|key| (key.clone(), vec![set_fields[key].clone()]))
        .collect();
    invalidation::register_many(ctx, &remote.name, &registrations)?;

    let mut mutex = ctx.mutex(&format!("relations_{}", remote.name));
    mutex.acquire(ctx.config.lock_wait)?;
    let mut result = Vec::new();
    let mut written = Vec::new();
    for (key, mut guids) in sets {
        if entry_version(ctx, &key) != versions[&key] {
            // Rewritten while we were scanning; that copy is newer.
            if key == wanted {
                if let Some(entry) = ctx.volatile.get(&wanted) {
                    result = parse_set(&entry)?;
                }
            }
            continue;
        }
        guids.sort();
        if key == wanted {
            result = guids.clone();
        }
        let entry = json!({
            "version": rand::random::<u64>(),
            "built_at": Utc::now().to_rfc3339(),
            "guids": guids,
        });
        ctx.volatile.set(&key, entry, Some(list_ttl(ctx)));
        written.push(key);
    }
    mutex.release();

    // A save landing mid-scan removes the registration; its entry must
    // not survive either.
    for key in written {
        if !invalidation::registered(ctx, &remote.name, &key)? {
            ctx.volatile.delete(&key);
        }
    }

    Ok(RelationSet {
        guids: result,
        from_cache: false,
    })
}

fn entry_version(ctx: &Context, key: &str) -> Option<u64> {
    ctx.volatile
        .get(key)
        .and_then(|entry| entry.get("version").and_then(Value::as_u64))
}

fn parse_set(entry: &Value) -> Result<Vec<String>> {
    entry
        .get("guids")
        .and_then(Value::as_array)
        .map(|guids| {
            guids
                .iter()
                .filter_map(|g| g.as_str().map(|s| s.to_string()))
                .collect()
        })
        .ok_or_else(|| Error::new(ErrorKind::Parse, "corrupt reverse-relation entry"))
}
