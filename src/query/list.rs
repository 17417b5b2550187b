//! Query execution: full scan of a type's primary keys with predicate
//! evaluation per instance, fronted by the invalidation-tracked result
//! cache.
//!
//! Dependencies are derived from the predicate paths against the schema
//! and registered before the scan starts. After the scan the registration
//! is checked again; a result whose registration was dropped by a
//! concurrent save is returned but not cached.

use rand::Rng;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::CacheFamily;
use crate::core::types::FieldValue;
use crate::index::primary_keys;
use crate::model::object::DataObject;
use crate::model::store::Context;
use crate::query::ast::{Operator, Predicate, Query, QueryNode, Select};
use crate::query::invalidation;
use crate::schema::registry::ResolvedType;

/// Payload of a query result.
#[derive(Debug, Clone, PartialEq)]
pub enum ListData {
    Count(usize),
    Identifiers(Vec<String>),
}

#[derive(Debug)]
pub struct ListResult {
    pub data: ListData,
    pub from_cache: bool,
    /// Volatile key the result lives (or would live) under.
    pub key: String,
}

pub fn run(ctx: &Arc<Context>, query: &Query, key: Option<&str>) -> Result<ListResult> {
    let type_def = ctx.registry.resolve(&query.object)?;
    let suffix = match key {
        Some(key) => key.to_string(),
        None => query.cache_suffix(),
    };
    let list_key = ctx.list_key(&suffix);

    if let Some(cached) = ctx.volatile.get(&list_key) {
        if let Some(data) = parse_cached(query.select, &cached) {
            ctx.counters.record(CacheFamily::List, true);
            return Ok(ListResult {
                data,
                from_cache: true,
                key: list_key,
            });
        }
    }
    ctx.counters.record(CacheFamily::List, false);

    // Derive and register dependencies before touching any data, so a
    // save racing the scan already knows about this list. A result that
    // can never be cached needs no registration.
    let deps = derive_dependencies(ctx, &type_def, &query.filter)?;
    if deps.cacheable {
        for (dep_type, fields) in &deps.fields {
            let fields: Vec<String> = fields.iter().cloned().collect();
            invalidation::register(ctx, dep_type, &list_key, &fields)?;
        }
    }

    let guids = primary_keys::get(ctx, &type_def.name)?;
    let mut matched = Vec::new();
    for guid in &guids {
        let object = match DataObject::load(
            ctx.clone(),
            &type_def.name,
            guid,
            ctx.config.conflict_policy,
        ) {
            Ok(object) => object,
            // Index entries may outlive their record briefly.
            Err(e) if e.kind == ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if matches(&object, &query.filter)? {
            matched.push(guid.clone());
        }
    }

    // Only cache when every registration survived the scan and the type
    // had any instances at all.
    let mut cacheable = deps.cacheable && !guids.is_empty();
    if cacheable {
        for dep_type in deps.fields.keys() {
            if !invalidation::registered(ctx, dep_type, &list_key)? {
                cacheable = false;
                break;
            }
        }
    }
    let data = match query.select {
        Select::Count => ListData::Count(matched.len()),
        Select::Identifiers => ListData::Identifiers(matched),
    };
    if cacheable {
        ctx.volatile
            .set(&list_key, cached_json(&data), Some(list_ttl(ctx)));
    }
    Ok(ListResult {
        data,
        from_cache: false,
        key: list_key,
    })
}

pub(crate) fn list_ttl(ctx: &Context) -> Duration {
    let jitter = ctx.config.list_ttl_jitter.as_secs();
    let extra = if jitter > 0 {
        rand::thread_rng().gen_range(0..jitter)
    } else {
        0
    };
    ctx.config.list_ttl_base + Duration::from_secs(extra)
}

fn cached_json(data: &ListData) -> Value {
    match data {
        ListData::Count(count) => json!({"select": "COUNT", "count": count}),
        ListData::Identifiers(guids) => json!({"select": "IDENTIFIERS", "identifiers": guids}),
    }
}

fn parse_cached(select: Select, value: &Value) -> Option<ListData> {
    match select {
        Select::Count => value
            .get("count")
            .and_then(Value::as_u64)
            .map(|c| ListData::Count(c as usize)),
        Select::Identifiers => value.get("identifiers").and_then(Value::as_array).map(|a| {
            ListData::Identifiers(
                a.iter()
                    .filter_map(|g| g.as_str().map(|s| s.to_string()))
                    .collect(),
            )
        }),
    }
}

struct Dependencies {
    /// Fields per entity type that can change this list's content.
    fields: HashMap<String, HashSet<String>>,
    /// False when a dynamic property is involved.
    cacheable: bool,
}

fn derive_dependencies(
    ctx: &Context,
    root: &Arc<ResolvedType>,
    filter: &QueryNode,
) -> Result<Dependencies> {
    let mut deps = Dependencies {
        fields: HashMap::new(),
        cacheable: true,
    };
    // List membership itself depends on instance creation and deletion.
    deps.fields
        .entry(root.name.clone())
        .or_default()
        .insert("__all".to_string());
    walk_node(ctx, root, filter, &mut deps)?;
    Ok(deps)
}

fn walk_node(
    ctx: &Context,
    root: &Arc<ResolvedType>,
    node: &QueryNode,
    deps: &mut Dependencies,
) -> Result<()> {
    match node {
        QueryNode::And(items) | QueryNode::Or(items) => {
            for item in items {
                walk_node(ctx, root, item, deps)?;
            }
            Ok(())
        }
        QueryNode::Predicate(predicate) => walk_path(ctx, root, &predicate.path, deps),
    }
}

fn walk_path(
    ctx: &Context,
    root: &Arc<ResolvedType>,
    path: &[String],
    deps: &mut Dependencies,
) -> Result<()> {
    let mut current = root.clone();
    for (index, segment) in path.iter().enumerate() {
        let terminal = index == path.len() - 1;
        if !terminal {
            let relation = current.relation(segment).ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!("{} is not a relation of {}", segment, current.name),
                )
            })?;
            let target = current.relation_target(relation).to_string();
            deps.fields
                .entry(current.name.clone())
                .or_default()
                .insert(segment.clone());
            let next = ctx.registry.resolve(&target)?;
            deps.fields
                .entry(next.name.clone())
                .or_default()
                .insert("__all".to_string());
            current = next;
            continue;
        }
        if segment == "guid" {
            continue;
        }
        if current.property(segment).is_some() || current.relation(segment).is_some() {
            deps.fields
                .entry(current.name.clone())
                .or_default()
                .insert(segment.clone());
        } else if let Some(relation) = segment
            .strip_suffix("_guid")
            .filter(|r| current.relation(r).is_some())
        {
            deps.fields
                .entry(current.name.clone())
                .or_default()
                .insert(relation.to_string());
        } else if current.dynamic(segment).is_some() {
            // Computed values have no invalidation signal.
            deps.cacheable = false;
        } else {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("no field {} on type {}", segment, current.name),
            ));
        }
    }
    Ok(())
}

fn matches(object: &DataObject, node: &QueryNode) -> Result<bool> {
    match node {
        QueryNode::And(items) => {
            for item in items {
                if !matches(object, item)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        QueryNode::Or(items) => {
            for item in items {
                if matches(object, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        QueryNode::Predicate(predicate) => evaluate(object, predicate),
    }
}

fn evaluate(object: &DataObject, predicate: &Predicate) -> Result<bool> {
    let value = match resolve_path(object, &predicate.path)? {
        Some(value) => value,
        // A null link along the path fails the predicate.
        None => return Ok(false),
    };
    Ok(match predicate.op {
        Operator::Equals => value.loose_eq(&predicate.value),
        Operator::NotEquals => !value.loose_eq(&predicate.value),
        Operator::LessThan => matches!(value.compare(&predicate.value), Some(Ordering::Less)),
        Operator::GreaterThan => matches!(value.compare(&predicate.value), Some(Ordering::Greater)),
        Operator::In => match &predicate.value {
            FieldValue::List(options) => options.iter().any(|option| value.loose_eq(option)),
            _ => false,
        },
    })
}

fn resolve_path(object: &DataObject, path: &[String]) -> Result<Option<FieldValue>> {
    let (last, rest) = path
        .split_last()
        .ok_or_else(|| Error::new(ErrorKind::Parse, "empty predicate path"))?;
    let mut loaded: Option<DataObject> = None;
    for segment in rest {
        let current = loaded.as_ref().unwrap_or(object);
        match current.related(segment)? {
            Some(next) => loaded = Some(next),
            None => return Ok(None),
        }
    }
    let current = loaded.as_ref().unwrap_or(object);
    current.query_value(last).map(Some)
}
