use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::types::FieldValue;
use crate::model::object::DataObject;

/// Declared type of a property. `Null` is accepted by every kind.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    /// Closed set of allowed string values.
    Enum(Vec<String>),
}

impl PropertyKind {
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Null) => true,
            (PropertyKind::Str, FieldValue::Str(_)) => true,
            (PropertyKind::Int, FieldValue::Int(_)) => true,
            // A float property takes whole numbers too.
            (PropertyKind::Float, FieldValue::Int(_)) => true,
            (PropertyKind::Float, FieldValue::Float(_)) => true,
            (PropertyKind::Bool, FieldValue::Bool(_)) => true,
            (PropertyKind::List, FieldValue::List(_)) => true,
            (PropertyKind::Dict, FieldValue::Dict(_)) => true,
            (PropertyKind::Enum(allowed), FieldValue::Str(s)) => allowed.iter().any(|a| a == s),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    pub default: FieldValue,
    pub mandatory: bool,
    pub description: String,
}

impl PropertyDef {
    pub fn new(name: &str, kind: PropertyKind) -> Self {
        PropertyDef {
            name: name.to_string(),
            kind,
            default: FieldValue::Null,
            mandatory: false,
            description: String::new(),
        }
    }

    pub fn with_default(mut self, default: FieldValue) -> Self {
        self.default = default;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

#[derive(Debug, Clone)]
pub struct RelationDef {
    pub name: String,
    /// Target entity type; `None` relates to the owning type itself.
    pub target: Option<String>,
    /// Accessor name under which the target type sees this relation back.
    pub foreign_key: String,
    pub one_to_one: bool,
    pub mandatory: bool,
}

impl RelationDef {
    pub fn new(name: &str, target: Option<&str>, foreign_key: &str) -> Self {
        RelationDef {
            name: name.to_string(),
            target: target.map(|t| t.to_string()),
            foreign_key: foreign_key.to_string(),
            one_to_one: false,
            mandatory: false,
        }
    }

    pub fn one_to_one(mut self) -> Self {
        self.one_to_one = true;
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }
}

pub type DynamicFn = Arc<dyn Fn(&DataObject) -> FieldValue + Send + Sync>;

/// Computed property: evaluated on demand, cached in the volatile store for
/// `ttl`, never persisted.
#[derive(Clone)]
pub struct DynamicDef {
    pub name: String,
    pub kind: PropertyKind,
    pub ttl: Duration,
    pub compute: DynamicFn,
}

impl DynamicDef {
    pub fn new<F>(name: &str, kind: PropertyKind, ttl: Duration, compute: F) -> Self
    where
        F: Fn(&DataObject) -> FieldValue + Send + Sync + 'static,
    {
        DynamicDef {
            name: name.to_string(),
            kind,
            ttl,
            compute: Arc::new(compute),
        }
    }
}

impl fmt::Debug for DynamicDef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DynamicDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Blueprint of an entity type as registered: properties, relations and
/// dynamic properties, plus an optional base type it extends.
#[derive(Debug, Clone)]
pub struct EntityType {
    pub name: String,
    pub extends: Option<String>,
    pub properties: Vec<PropertyDef>,
    pub relations: Vec<RelationDef>,
    pub dynamics: Vec<DynamicDef>,
}

impl EntityType {
    pub fn new(name: &str) -> Self {
        EntityType {
            name: name.to_string(),
            extends: None,
            properties: Vec::new(),
            relations: Vec::new(),
            dynamics: Vec::new(),
        }
    }

    pub fn extends(mut self, base: &str) -> Self {
        self.extends = Some(base.to_string());
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_relation(mut self, relation: RelationDef) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_dynamic(mut self, dynamic: DynamicDef) -> Self {
        self.dynamics.push(dynamic);
        self
    }
}
