//! Dependency map between cached lists and the fields they were computed
//! from. One map per entity type, mirrored in both stores; the persistent
//! copy is authoritative and survives cache eviction.
//!
//! Saving or deleting an instance invalidates every list registered under
//! one of the changed fields or under the `__all` wildcard.

use serde_json::{json, Value};
use std::collections::HashMap;

use crate::core::error::{Error, ErrorKind, Result};
use crate::model::store::Context;

fn mutex_name(type_name: &str) -> String {
    format!("listcache_{}", type_name)
}

fn load_map(ctx: &Context, type_name: &str) -> Result<HashMap<String, Vec<String>>> {
    let key = ctx.cachelink_key(type_name);
    let value = match ctx.volatile.get(&key) {
        Some(value) => Some(value),
        None => match ctx.persistent.get(&key) {
            Some(raw) => Some(serde_json::from_str(&raw)?),
            None => None,
        },
    };
    let Some(value) = value else {
        return Ok(HashMap::new());
    };
    let entries = value
        .as_object()
        .ok_or_else(|| Error::new(ErrorKind::Parse, "corrupt list dependency map"))?;
    let mut map = HashMap::with_capacity(entries.len());
    for (list_key, fields) in entries {
        let fields = fields
            .as_array()
            .ok_or_else(|| Error::new(ErrorKind::Parse, "corrupt list dependency map"))?
            .iter()
            .filter_map(|f| f.as_str().map(|s| s.to_string()))
            .collect();
        map.insert(list_key.clone(), fields);
    }
    Ok(map)
}

fn store_map(ctx: &Context, type_name: &str, map: &HashMap<String, Vec<String>>) {
    let key = ctx.cachelink_key(type_name);
    let value = Value::Object(
        map.iter()
            .map(|(list_key, fields)| (list_key.clone(), json!(fields)))
            .collect(),
    );
    ctx.persistent.set(&key, value.to_string());
    ctx.volatile.set(&key, value, None);
}

/// Registers a cached list under the fields it depends on. Happens before
/// the backing scan runs, so a concurrent save can already see it.
pub fn register(ctx: &Context, type_name: &str, list_key: &str, fields: &[String]) -> Result<()> {
    register_many(ctx, type_name, &[(list_key.to_string(), fields.to_vec())])
}

/// Batch form of `register`, one lock round-trip for many entries.
pub fn register_many(
    ctx: &Context,
    type_name: &str,
    entries: &[(String, Vec<String>)],
) -> Result<()> {
    let mut mutex = ctx.mutex(&mutex_name(type_name));
    mutex.acquire(ctx.config.lock_wait)?;
    let mut map = load_map(ctx, type_name)?;
    for (list_key, fields) in entries {
        map.insert(list_key.clone(), fields.clone());
    }
    store_map(ctx, type_name, &map);
    mutex.release();
    Ok(())
}

/// Whether the list is still registered. A scan whose registration
/// disappeared raced a save and must not cache its result.
pub fn registered(ctx: &Context, type_name: &str, list_key: &str) -> Result<bool> {
    Ok(load_map(ctx, type_name)?.contains_key(list_key))
}

/// Drops every cached list depending on one of the changed fields (or on
/// `__all`) and removes its registration.
pub fn invalidate(ctx: &Context, type_name: &str, changed: &[String]) -> Result<()> {
    let mut mutex = ctx.mutex(&mutex_name(type_name));
    mutex.acquire(ctx.config.lock_wait)?;
    let mut map = load_map(ctx, type_name)?;
    let doomed: Vec<String> = map
        .iter()
        .filter(|(_, fields)| fields.iter().any(|f| changed.iter().any(|c| c == f)))
        .map(|(list_key, _)| list_key.clone())
        .collect();
    for list_key in &doomed {
        ctx.volatile.delete(list_key);
        map.remove(list_key);
    }
    if !doomed.is_empty() {
        store_map(ctx, type_name, &map);
    }
    mutex.release();
    Ok(())
}
