use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::ConflictPolicy;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::stats::CacheFamily;
use crate::core::types::{map_from_json, map_to_json, FieldValue};
use crate::index::primary_keys;
use crate::index::relations;
use crate::model::store::Context;
use crate::query::invalidation;
use crate::schema::registry::ResolvedType;

/// A single persistent entity instance.
///
/// The field dictionary holds every property plus one slot per relation
/// (the related guid, or Null). `original` is the snapshot as loaded and
/// is only replaced by `save()` or `discard()`.
#[derive(Clone)]
pub struct DataObject {
    ctx: Arc<Context>,
    type_def: Arc<ResolvedType>,
    guid: String,
    key: String,
    data: HashMap<String, FieldValue>,
    original: HashMap<String, FieldValue>,
    from_cache: Option<bool>,
    policy: ConflictPolicy,
    unsaved: bool,
    // Instances loaded through relation accessors, kept so a recursive
    // save can reach local edits made on them.
    related: HashMap<String, DataObject>,
    foreign_lists: HashMap<String, Vec<DataObject>>,
}

impl std::fmt::Debug for DataObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataObject")
            .field("type_def", &self.type_def.name)
            .field("guid", &self.guid)
            .field("key", &self.key)
            .field("data", &self.data)
            .field("original", &self.original)
            .field("from_cache", &self.from_cache)
            .field("policy", &self.policy)
            .field("unsaved", &self.unsaved)
            .field("related", &self.related)
            .field("foreign_lists", &self.foreign_lists)
            .finish()
    }
}

impl DataObject {
    /// Creates a new unsaved instance with a fresh guid, applying the
    /// optional seed data over the blueprint defaults.
    pub(crate) fn new(
        ctx: Arc<Context>,
        type_name: &str,
        seed: Option<HashMap<String, FieldValue>>,
        policy: ConflictPolicy,
    ) -> Result<Self> {
        let type_def = ctx.registry.resolve(type_name)?;
        let guid = Uuid::new_v4().to_string();
        let key = ctx.data_key(&type_def.name, &guid);

        let mut data = HashMap::new();
        for property in &type_def.properties {
            data.insert(property.name.clone(), property.default.clone());
        }
        for relation in &type_def.relations {
            data.insert(relation.name.clone(), FieldValue::Null);
        }

        let mut object = DataObject {
            ctx,
            type_def,
            guid,
            key,
            original: data.clone(),
            data,
            from_cache: None,
            policy,
            unsaved: true,
            related: HashMap::new(),
            foreign_lists: HashMap::new(),
        };
        if let Some(seed) = seed {
            for (name, value) in seed {
                object.set(&name, value)?;
            }
        }
        Ok(object)
    }

    /// Loads an instance by guid: volatile cache first, persistent store
    /// on a miss (re-caching the record afterwards).
    pub(crate) fn load(
        ctx: Arc<Context>,
        type_name: &str,
        guid: &str,
        policy: ConflictPolicy,
    ) -> Result<Self> {
        if Uuid::parse_str(guid).is_err() {
            return Err(Error::new(
                ErrorKind::InvalidIdentifier,
                format!("malformed guid {}", guid),
            ));
        }
        let type_def = ctx.registry.resolve(type_name)?;
        let key = ctx.data_key(&type_def.name, guid);

        let (mut data, from_cache) = match ctx.volatile.get(&key) {
            Some(value) => {
                ctx.counters.record(CacheFamily::Object, true);
                (map_from_json(&value)?, true)
            }
            None => {
                ctx.counters.record(CacheFamily::Object, false);
                let raw = ctx.persistent.get(&key).ok_or_else(|| {
                    Error::new(
                        ErrorKind::NotFound,
                        format!("no {} with guid {}", type_def.name, guid),
                    )
                })?;
                let value: Value = serde_json::from_str(&raw)?;
                let data = map_from_json(&value)?;
                ctx.volatile
                    .set(&key, map_to_json(&data), Some(ctx.config.object_ttl));
                (data, false)
            }
        };

        // Fields added to the blueprint after this record was written get
        // their defaults.
        for property in &type_def.properties {
            data.entry(property.name.clone())
                .or_insert_with(|| property.default.clone());
        }
        for relation in &type_def.relations {
            data.entry(relation.name.clone()).or_insert(FieldValue::Null);
        }

        Ok(DataObject {
            ctx,
            type_def,
            guid: guid.to_string(),
            key,
            original: data.clone(),
            data,
            from_cache: Some(from_cache),
            policy,
            unsaved: false,
            related: HashMap::new(),
            foreign_lists: HashMap::new(),
        })
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn type_name(&self) -> &str {
        &self.type_def.name
    }

    /// Whether the last load was served from the volatile cache; None for
    /// instances that were never loaded.
    pub fn loaded_from_cache(&self) -> Option<bool> {
        self.from_cache
    }

    pub fn is_dirty(&self) -> bool {
        self.data != self.original
    }

    pub fn data(&self) -> &HashMap<String, FieldValue> {
        &self.data
    }

    /// Reads a property, a `<relation>_guid` shortcut, `guid`, or a
    /// dynamic property. Reading a relation name yields the related guid.
    pub fn get(&self, name: &str) -> Result<FieldValue> {
        if name == "guid" {
            return Ok(FieldValue::Str(self.guid.clone()));
        }
        if self.type_def.property(name).is_some() {
            return Ok(self.data.get(name).cloned().unwrap_or(FieldValue::Null));
        }
        if let Some(relation) = name.strip_suffix("_guid") {
            if self.type_def.relation(relation).is_some() {
                return self.relation_guid(relation);
            }
        }
        if self.type_def.relation(name).is_some() {
            return Ok(self.data.get(name).cloned().unwrap_or(FieldValue::Null));
        }
        if self.type_def.dynamic(name).is_some() {
            return self.dynamic_value(name);
        }
        Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("no field {} on type {}", name, self.type_def.name),
        ))
    }

    /// Sets a property value, validating against the declared type.
    /// Null is always accepted.
    pub fn set(&mut self, name: &str, value: FieldValue) -> Result<()> {
        if let Some(property) = self.type_def.property(name) {
            if !property.kind.accepts(&value) {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!(
                        "property {}.{} does not accept {:?}",
                        self.type_def.name, name, value
                    ),
                ));
            }
            self.data.insert(name.to_string(), value);
            return Ok(());
        }
        if self.type_def.relation(name).is_some() {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("relation {} must be set through set_relation", name),
            ));
        }
        if self.type_def.dynamic(name).is_some() {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("dynamic property {} is read-only", name),
            ));
        }
        Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("no field {} on type {}", name, self.type_def.name),
        ))
    }

    /// Points a relation at another instance (or clears it). The reverse
    /// side of a one-to-one relation cannot be assigned.
    pub fn set_relation(&mut self, name: &str, other: Option<&DataObject>) -> Result<()> {
        let relation = match self.type_def.relation(name) {
            Some(relation) => relation.clone(),
            None => {
                // A foreign accessor name means the caller is on the wrong
                // side of the relation.
                let foreign = relations::foreign_relations(&self.ctx, &self.type_def.name)?;
                if foreign.iter().any(|f| f.accessor == name) {
                    return Err(Error::new(
                        ErrorKind::InvalidOperation,
                        format!(
                            "{} is the reverse side of a relation and must be set from the owning side",
                            name
                        ),
                    ));
                }
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("no relation {} on type {}", name, self.type_def.name),
                ));
            }
        };
        match other {
            Some(other) => {
                let target = self.type_def.relation_target(&relation);
                if other.type_def.name != target {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch,
                        format!(
                            "relation {}.{} expects {}, got {}",
                            self.type_def.name, name, target, other.type_def.name
                        ),
                    ));
                }
                self.data
                    .insert(name.to_string(), FieldValue::Str(other.guid.clone()));
                self.related.insert(name.to_string(), other.clone());
            }
            None => {
                self.data.insert(name.to_string(), FieldValue::Null);
                self.related.remove(name);
            }
        }
        Ok(())
    }

    /// The `<relation>_guid` accessor.
    pub fn relation_guid(&self, name: &str) -> Result<FieldValue> {
        self.type_def.relation(name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("no relation {} on type {}", name, self.type_def.name),
            )
        })?;
        Ok(self.data.get(name).cloned().unwrap_or(FieldValue::Null))
    }

    /// Loads the instance a relation points at, if any. Returns a fresh
    /// copy; use `related_mut` to edit through this instance.
    pub fn related(&self, name: &str) -> Result<Option<DataObject>> {
        let relation = self.type_def.relation(name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("no relation {} on type {}", name, self.type_def.name),
            )
        })?;
        let target = self.type_def.relation_target(relation).to_string();
        match self.data.get(name) {
            Some(FieldValue::Str(guid)) => Ok(Some(DataObject::load(
                self.ctx.clone(),
                &target,
                guid,
                self.policy,
            )?)),
            _ => Ok(None),
        }
    }

    /// Like `related`, but caches the loaded instance on this one so a
    /// recursive save picks up edits made through the returned reference.
    pub fn related_mut(&mut self, name: &str) -> Result<Option<&mut DataObject>> {
        let guid = match self.data.get(name) {
            Some(FieldValue::Str(guid)) => guid.clone(),
            _ => {
                self.related.remove(name);
                return Ok(None);
            }
        };
        let cached = matches!(self.related.get(name), Some(existing) if existing.guid == guid);
        if !cached {
            let loaded = self.related(name)?.ok_or_else(|| {
                Error::new(
                    ErrorKind::NotFound,
                    format!("relation {} points at a missing record", name),
                )
            })?;
            self.related.insert(name.to_string(), loaded);
        }
        Ok(self.related.get_mut(name))
    }

    /// Resolves a reverse relation: every instance of the declaring type
    /// whose relation points at this one. Loaded instances are cached on
    /// this object (for recursive save) and reconciled against the
    /// reverse-relation index on every call.
    pub fn foreign_list(&mut self, accessor: &str) -> Result<&Vec<DataObject>> {
        self.refresh_foreign_list(accessor)?;
        self.foreign_lists.get(accessor).ok_or_else(|| {
            Error::new(ErrorKind::Internal, format!("lost foreign list {}", accessor))
        })
    }

    pub fn foreign_list_mut(&mut self, accessor: &str) -> Result<&mut Vec<DataObject>> {
        self.refresh_foreign_list(accessor)?;
        self.foreign_lists.get_mut(accessor).ok_or_else(|| {
            Error::new(ErrorKind::Internal, format!("lost foreign list {}", accessor))
        })
    }

    fn refresh_foreign_list(&mut self, accessor: &str) -> Result<()> {
        let foreign = self.foreign_relation(accessor)?;
        let set = relations::reverse_set(
            &self.ctx,
            &foreign.remote_type,
            &foreign.remote_key,
            &self.type_def.name,
            accessor,
            &self.guid,
        )?;
        let mut previous: HashMap<String, DataObject> = self
            .foreign_lists
            .remove(accessor)
            .unwrap_or_default()
            .into_iter()
            .map(|object| (object.guid.clone(), object))
            .collect();
        let mut members = Vec::with_capacity(set.guids.len());
        for guid in &set.guids {
            if let Some(existing) = previous.remove(guid) {
                members.push(existing);
                continue;
            }
            match DataObject::load(self.ctx.clone(), &foreign.remote_type, guid, self.policy) {
                Ok(object) => members.push(object),
                // Stale index entry for a record deleted meanwhile.
                Err(e) if e.kind == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        self.foreign_lists.insert(accessor.to_string(), members);
        Ok(())
    }

    /// Reverse side of a one-to-one relation.
    pub fn foreign_one(&mut self, accessor: &str) -> Result<Option<DataObject>> {
        let list = self.foreign_list(accessor)?;
        Ok(list.first().cloned())
    }

    /// Guid accessor for the reverse side of a one-to-one relation.
    pub fn foreign_one_guid(&mut self, accessor: &str) -> Result<FieldValue> {
        let list = self.foreign_list(accessor)?;
        Ok(list
            .first()
            .map(|object| FieldValue::Str(object.guid.clone()))
            .unwrap_or(FieldValue::Null))
    }

    fn foreign_relation(&self, accessor: &str) -> Result<relations::ForeignRelation> {
        let foreign = relations::foreign_relations(&self.ctx, &self.type_def.name)?;
        foreign
            .into_iter()
            .find(|f| f.accessor == accessor)
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidOperation,
                    format!(
                        "no reverse relation {} towards type {}",
                        accessor, self.type_def.name
                    ),
                )
            })
    }

    /// Evaluates a dynamic property, serving it from its TTL cache entry
    /// when possible.
    pub fn dynamic_value(&self, name: &str) -> Result<FieldValue> {
        let dynamic = self.type_def.dynamic(name).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("no dynamic property {} on type {}", name, self.type_def.name),
            )
        })?;
        let cache_key = format!("{}_{}", self.key, name);
        if let Some(value) = self.ctx.volatile.get(&cache_key) {
            self.ctx.counters.record(CacheFamily::Dynamic, true);
            return Ok(FieldValue::from_json(&value));
        }
        self.ctx.counters.record(CacheFamily::Dynamic, false);
        let value = (dynamic.compute)(self);
        self.ctx
            .volatile
            .set(&cache_key, value.to_json(), Some(dynamic.ttl));
        Ok(value)
    }

    pub fn save(&mut self) -> Result<()> {
        self.save_internal(false)
    }

    /// Saves this instance plus every related instance loaded through it
    /// that carries unsaved edits.
    pub fn save_recursive(&mut self) -> Result<()> {
        self.save_internal(true)
    }

    fn save_internal(&mut self, recursive: bool) -> Result<()> {
        if recursive {
            let mut related = std::mem::take(&mut self.related);
            let mut lists = std::mem::take(&mut self.foreign_lists);
            let children = related
                .values_mut()
                .chain(lists.values_mut().flatten())
                .filter(|child| child.is_dirty())
                .try_for_each(|child| child.save_internal(false));
            self.related = related;
            self.foreign_lists = lists;
            children?;
        }

        self.validate()?;

        // Read the current stored record for conflict detection.
        let stored = match self.ctx.persistent.get(&self.key) {
            Some(raw) => {
                let value: Value = serde_json::from_str(&raw)?;
                Some(map_from_json(&value)?)
            }
            None => None,
        };
        if stored.is_none() && !self.unsaved {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!(
                    "cannot save {} {}: record no longer exists",
                    self.type_def.name, self.guid
                ),
            ));
        }
        let stored = stored.unwrap_or_default();

        let mut merged = HashMap::new();
        let mut conflicts = Vec::new();
        for field in self.field_names() {
            let local = self.data.get(&field).cloned().unwrap_or(FieldValue::Null);
            let snapshot = self
                .original
                .get(&field)
                .cloned()
                .unwrap_or(FieldValue::Null);
            let remote = stored.get(&field).cloned();
            let value = if local != snapshot {
                match remote {
                    // Another process wrote this field since we loaded it.
                    Some(remote_value) if remote_value != snapshot => match self.policy {
                        ConflictPolicy::Raise => {
                            conflicts.push(field.clone());
                            remote_value
                        }
                        ConflictPolicy::RemoteWins => remote_value,
                        ConflictPolicy::LocalWins => local,
                    },
                    _ => local,
                }
            } else {
                // Untouched locally: silently refresh to the stored value.
                remote.unwrap_or(local)
            };
            merged.insert(field, value);
        }
        if !conflicts.is_empty() {
            conflicts.sort();
            return Err(Error::new(
                ErrorKind::Concurrency,
                format!(
                    "field conflicts while saving {}: {}",
                    self.type_def.name,
                    conflicts.join(", ")
                ),
            ));
        }

        let mut changed: Vec<String> = merged
            .iter()
            .filter(|(name, value)| self.original.get(*name) != Some(value))
            .map(|(name, _)| name.clone())
            .collect();
        // A brand new record changes list membership, which only the
        // wildcard dependency captures.
        if self.unsaved {
            changed.push("__all".to_string());
        }

        self.ctx
            .persistent
            .set(&self.key, map_to_json(&merged).to_string());
        self.data = merged.clone();
        self.original = merged;

        // Drop the cached record and its dynamic-property entries.
        self.ctx.volatile.delete(&self.key);
        for dynamic in &self.type_def.dynamics {
            self.ctx
                .volatile
                .delete(&format!("{}_{}", self.key, dynamic.name));
        }

        if self.unsaved {
            primary_keys::add(&self.ctx, &self.type_def.name, &self.guid)?;
            self.unsaved = false;
        }

        invalidation::invalidate(&self.ctx, &self.type_def.name, &changed)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for property in &self.type_def.properties {
            let value = self.data.get(&property.name).unwrap_or(&FieldValue::Null);
            if !property.kind.accepts(value) {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!(
                        "property {}.{} does not accept {:?}",
                        self.type_def.name, property.name, value
                    ),
                ));
            }
        }
        let mut missing = Vec::new();
        for property in &self.type_def.properties {
            if property.mandatory
                && self
                    .data
                    .get(&property.name)
                    .map(|v| v.is_null())
                    .unwrap_or(true)
            {
                missing.push(property.name.clone());
            }
        }
        for relation in &self.type_def.relations {
            if relation.mandatory
                && self
                    .data
                    .get(&relation.name)
                    .map(|v| v.is_null())
                    .unwrap_or(true)
            {
                missing.push(relation.name.clone());
            }
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(Error::new(
                ErrorKind::MissingMandatoryFields,
                format!("missing mandatory fields: {}", missing.join(", ")),
            ));
        }
        Ok(())
    }

    /// Deletes the persisted record. Fails with LinkedObject while other
    /// instances still reference this one, unless `abandon` nulls those
    /// foreign keys (referencing instances are never cascade-deleted).
    pub fn delete(&mut self, abandon: bool) -> Result<()> {
        if !self.ctx.persistent.exists(&self.key) {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("no {} with guid {}", self.type_def.name, self.guid),
            ));
        }

        for foreign in relations::foreign_relations(&self.ctx, &self.type_def.name)? {
            let set = relations::reverse_set(
                &self.ctx,
                &foreign.remote_type,
                &foreign.remote_key,
                &self.type_def.name,
                &foreign.accessor,
                &self.guid,
            )?;
            let mut referers = Vec::new();
            for guid in &set.guids {
                match DataObject::load(self.ctx.clone(), &foreign.remote_type, guid, self.policy) {
                    Ok(object) => {
                        // The index may lag behind saves; confirm the link.
                        if object.data.get(&foreign.remote_key)
                            == Some(&FieldValue::Str(self.guid.clone()))
                        {
                            referers.push(object);
                        }
                    }
                    Err(e) if e.kind == ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
            if referers.is_empty() {
                continue;
            }
            if !abandon {
                return Err(Error::new(
                    ErrorKind::LinkedObject,
                    format!(
                        "{} instances still linked through {}.{}",
                        referers.len(),
                        foreign.remote_type,
                        foreign.remote_key
                    ),
                ));
            }
            for mut referer in referers {
                referer.data
                    .insert(foreign.remote_key.clone(), FieldValue::Null);
                referer.save()?;
            }
        }

        self.ctx.persistent.delete(&self.key);
        self.ctx.volatile.delete(&self.key);
        for dynamic in &self.type_def.dynamics {
            self.ctx
                .volatile
                .delete(&format!("{}_{}", self.key, dynamic.name));
        }
        primary_keys::remove(&self.ctx, &self.type_def.name, &self.guid)?;

        let mut fields: Vec<String> = self.field_names();
        fields.push("__all".to_string());
        invalidation::invalidate(&self.ctx, &self.type_def.name, &fields)?;
        Ok(())
    }

    /// Reloads field state from the durable source, dropping unsaved edits.
    pub fn discard(&mut self) -> Result<()> {
        let fresh = DataObject::load(self.ctx.clone(), &self.type_def.name, &self.guid, self.policy)?;
        self.data = fresh.data;
        self.original = fresh.original;
        self.from_cache = fresh.from_cache;
        self.unsaved = false;
        self.related.clear();
        self.foreign_lists.clear();
        Ok(())
    }

    /// Serializes the instance to a JSON object: guid, properties and
    /// `<relation>_guid` fields. With `depth > 0` the related instances
    /// are embedded (at depth - 1) under the relation name instead.
    pub fn export(&self, depth: usize) -> Result<Value> {
        let mut object = serde_json::Map::new();
        object.insert("guid".to_string(), Value::String(self.guid.clone()));
        for property in &self.type_def.properties {
            let value = self
                .data
                .get(&property.name)
                .cloned()
                .unwrap_or(FieldValue::Null);
            object.insert(property.name.clone(), value.to_json());
        }
        for relation in &self.type_def.relations {
            let guid = self
                .data
                .get(&relation.name)
                .cloned()
                .unwrap_or(FieldValue::Null);
            if depth == 0 {
                object.insert(format!("{}_guid", relation.name), guid.to_json());
            } else {
                let embedded = match self.related(&relation.name)? {
                    Some(related) => related.export(depth - 1)?,
                    None => Value::Null,
                };
                object.insert(relation.name.clone(), embedded);
            }
        }
        Ok(Value::Object(object))
    }

    /// Copies property values from another instance of the same type.
    /// Relations are copied only when requested; include/exclude filter
    /// the property set.
    pub fn copy_from(
        &mut self,
        other: &DataObject,
        include: Option<&[&str]>,
        exclude: Option<&[&str]>,
        include_relations: bool,
    ) -> Result<()> {
        if self.type_def.name != other.type_def.name {
            return Err(Error::new(
                ErrorKind::TypeMismatch,
                format!(
                    "cannot copy {} into {}",
                    other.type_def.name, self.type_def.name
                ),
            ));
        }
        let wanted = |name: &str| match (include, exclude) {
            (Some(include), _) => include.contains(&name),
            (None, Some(exclude)) => !exclude.contains(&name),
            (None, None) => true,
        };
        for property in &self.type_def.properties {
            if wanted(&property.name) {
                let value = other
                    .data
                    .get(&property.name)
                    .cloned()
                    .unwrap_or(FieldValue::Null);
                self.data.insert(property.name.clone(), value);
            }
        }
        if include_relations {
            for relation in &self.type_def.relations {
                let value = other
                    .data
                    .get(&relation.name)
                    .cloned()
                    .unwrap_or(FieldValue::Null);
                self.data.insert(relation.name.clone(), value);
            }
        }
        Ok(())
    }

    /// Field value as seen by the query engine: terminal path segments
    /// may be properties, dynamics, relation guids or guid shortcuts.
    pub(crate) fn query_value(&self, name: &str) -> Result<FieldValue> {
        self.get(name)
    }

    fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .type_def
            .properties
            .iter()
            .map(|p| p.name.clone())
            .collect();
        names.extend(self.type_def.relations.iter().map(|r| r.name.clone()));
        names
    }
}
