use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::{Error, ErrorKind, Result};
use crate::schema::schema::{DynamicDef, EntityType, PropertyDef, RelationDef};

/// Fully resolved entity type: the most-derived registered subtype with
/// the merged schema of its whole inheritance chain. Relation targets are
/// resolved to derived type names as well.
#[derive(Debug, Clone)]
pub struct ResolvedType {
    /// Name of the most-derived type; also the storage type-name.
    pub name: String,
    /// All names along the chain (base first) that resolve to this type.
    pub aliases: Vec<String>,
    pub properties: Vec<PropertyDef>,
    pub relations: Vec<RelationDef>,
    pub dynamics: Vec<DynamicDef>,
}

impl ResolvedType {
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn dynamic(&self, name: &str) -> Option<&DynamicDef> {
        self.dynamics.iter().find(|d| d.name == name)
    }

    /// Resolved target type of a relation; self-relations point back at
    /// the owning type.
    pub fn relation_target<'a>(&'a self, relation: &'a RelationDef) -> &'a str {
        relation.target.as_deref().unwrap_or(&self.name)
    }
}

/// Registry of every entity type known to the process. Built once at
/// startup; resolving a base type name transparently yields the single
/// most-derived registered subtype.
pub struct TypeRegistry {
    registered: Vec<EntityType>,
    resolved: HashMap<String, Arc<ResolvedType>>,
    distinct: Vec<Arc<ResolvedType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            registered: Vec::new(),
            resolved: HashMap::new(),
            distinct: Vec::new(),
        }
    }

    pub fn register(mut self, entity_type: EntityType) -> Self {
        self.registered.push(entity_type);
        self
    }

    /// Resolves inheritance chains and relation targets. Fails on an
    /// unknown base type or a base extended by more than one subtype.
    pub fn finish(mut self) -> Result<Self> {
        let mut children: HashMap<String, String> = HashMap::new();
        let by_name: HashMap<String, usize> = self
            .registered
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();

        for entity_type in &self.registered {
            if let Some(base) = &entity_type.extends {
                if !by_name.contains_key(base) {
                    return Err(Error::new(
                        ErrorKind::Internal,
                        format!("type {} extends unregistered type {}", entity_type.name, base),
                    ));
                }
                if children
                    .insert(base.clone(), entity_type.name.clone())
                    .is_some()
                {
                    return Err(Error::new(
                        ErrorKind::Internal,
                        format!("type {} is extended by multiple subtypes", base),
                    ));
                }
            }
        }

        // Leaf name for every registered name.
        let mut leaf_of: HashMap<String, String> = HashMap::new();
        for entity_type in &self.registered {
            let mut leaf = entity_type.name.clone();
            while let Some(child) = children.get(&leaf) {
                leaf = child.clone();
            }
            leaf_of.insert(entity_type.name.clone(), leaf);
        }

        for entity_type in &self.registered {
            let leaf = &leaf_of[&entity_type.name];
            if self.resolved.contains_key(&entity_type.name) {
                continue;
            }
            if let Some(existing) = self.resolved.get(leaf).cloned() {
                self.resolved.insert(entity_type.name.clone(), existing);
                continue;
            }

            // Merge the chain base-first into the leaf schema.
            let mut chain = Vec::new();
            let mut cursor = leaf.clone();
            loop {
                let index = by_name[&cursor];
                chain.push(index);
                match &self.registered[index].extends {
                    Some(base) => cursor = base.clone(),
                    None => break,
                }
            }
            chain.reverse();

            let mut merged = ResolvedType {
                name: leaf.clone(),
                aliases: Vec::new(),
                properties: Vec::new(),
                relations: Vec::new(),
                dynamics: Vec::new(),
            };
            for index in chain {
                let layer = &self.registered[index];
                merged.aliases.push(layer.name.clone());
                merged.properties.extend(layer.properties.iter().cloned());
                merged.dynamics.extend(layer.dynamics.iter().cloned());
                for relation in &layer.relations {
                    let mut relation = relation.clone();
                    if let Some(target) = &relation.target {
                        let target_leaf = leaf_of.get(target).ok_or_else(|| {
                            Error::new(
                                ErrorKind::Internal,
                                format!(
                                    "relation {}.{} targets unregistered type {}",
                                    layer.name, relation.name, target
                                ),
                            )
                        })?;
                        relation.target = Some(target_leaf.clone());
                    }
                    merged.relations.push(relation);
                }
            }

            let merged = Arc::new(merged);
            for alias in &merged.aliases {
                self.resolved.insert(alias.clone(), merged.clone());
            }
            self.distinct.push(merged);
        }

        Ok(self)
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<ResolvedType>> {
        self.resolved.get(name).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::NotImplemented,
                format!("unknown entity type {}", name),
            )
        })
    }

    /// Every distinct resolved type, each appearing once.
    pub fn types(&self) -> &[Arc<ResolvedType>] {
        &self.distinct
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
