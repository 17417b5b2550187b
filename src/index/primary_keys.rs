//! Paged guid index per entity type, kept in the volatile store.
//!
//! The pointer entry lists the chunk keys; each chunk holds at most
//! `page_size` guids. When any piece is missing the full set is rebuilt
//! from a persistent prefix scan, but never written back here: only
//! mutations repage the index.

use serde_json::{json, Value};
use std::collections::BTreeSet;

use crate::core::error::{Error, ErrorKind, Result};
use crate::model::store::Context;

fn chunk_key(pointer: &str, offset: usize) -> String {
    format!("{}_{}", pointer, offset)
}

fn mutex_name(type_name: &str) -> String {
    format!("primarykeys_{}", type_name)
}

/// Every guid of the given type, sorted. Served from the chunked index
/// when complete, from a persistent prefix scan otherwise.
pub fn get(ctx: &Context, type_name: &str) -> Result<Vec<String>> {
    let pointer = ctx.pk_key(type_name);
    if let Some(Value::Array(chunks)) = ctx.volatile.get(&pointer) {
        let mut guids = Vec::new();
        let mut complete = true;
        for chunk in &chunks {
            let key = chunk.as_str().ok_or_else(|| {
                Error::new(ErrorKind::Parse, format!("corrupt index pointer {}", pointer))
            })?;
            match ctx.volatile.get(key) {
                Some(Value::Array(entries)) => {
                    for entry in entries {
                        match entry.as_str() {
                            Some(guid) => guids.push(guid.to_string()),
                            None => complete = false,
                        }
                    }
                }
                // An evicted chunk invalidates the whole read.
                _ => {
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            return Ok(guids);
        }
    }
    Ok(scan(ctx, type_name))
}

/// Registers a guid, repaging the chunked index under the type mutex.
pub fn add(ctx: &Context, type_name: &str, guid: &str) -> Result<()> {
    let mut mutex = ctx.mutex(&mutex_name(type_name));
    mutex.acquire(ctx.config.lock_wait)?;
    let mut guids: BTreeSet<String> = get(ctx, type_name)?.into_iter().collect();
    guids.insert(guid.to_string());
    let result = write(ctx, type_name, &guids);
    mutex.release();
    result
}

/// Removes a guid, repaging the chunked index under the type mutex.
pub fn remove(ctx: &Context, type_name: &str, guid: &str) -> Result<()> {
    let mut mutex = ctx.mutex(&mutex_name(type_name));
    mutex.acquire(ctx.config.lock_wait)?;
    let mut guids: BTreeSet<String> = get(ctx, type_name)?.into_iter().collect();
    guids.remove(guid);
    let result = write(ctx, type_name, &guids);
    mutex.release();
    result
}

fn write(ctx: &Context, type_name: &str, guids: &BTreeSet<String>) -> Result<()> {
    let pointer = ctx.pk_key(type_name);
    let page_size = ctx.config.page_size.max(1);

    let stale: Vec<String> = match ctx.volatile.get(&pointer) {
        Some(Value::Array(chunks)) => chunks
            .iter()
            .filter_map(|c| c.as_str().map(|s| s.to_string()))
            .collect(),
        _ => Vec::new(),
    };

    let sorted: Vec<&String> = guids.iter().collect();
    let mut chunk_keys = Vec::new();
    for (index, page) in sorted.chunks(page_size).enumerate() {
        let key = chunk_key(&pointer, index * page_size);
        let entries: Vec<Value> = page.iter().map(|g| json!(g)).collect();
        ctx.volatile.set(&key, Value::Array(entries), None);
        chunk_keys.push(key);
    }
    if chunk_keys.is_empty() {
        // Keep an empty first chunk so readers can tell "empty" from
        // "evicted".
        let key = chunk_key(&pointer, 0);
        ctx.volatile.set(&key, json!([]), None);
        chunk_keys.push(key);
    }

    for old in stale {
        if !chunk_keys.contains(&old) {
            ctx.volatile.delete(&old);
        }
    }
    let pointer_value: Vec<Value> = chunk_keys.iter().map(|k| json!(k)).collect();
    ctx.volatile.set(&pointer, Value::Array(pointer_value), None);
    Ok(())
}

fn scan(ctx: &Context, type_name: &str) -> Vec<String> {
    let prefix = ctx.data_prefix(type_name);
    let mut guids: Vec<String> = ctx
        .persistent
        .prefix(&prefix)
        .into_iter()
        .filter_map(|key| key.strip_prefix(&prefix).map(|g| g.to_string()))
        .collect();
    guids.sort();
    guids
}
