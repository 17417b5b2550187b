use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::core::error::{Error, ErrorKind, Result};

/// Value stored in a single entity field.
///
/// Relation fields hold the related guid as `Str`, or `Null` when unset.
/// The untagged representation matches the flat JSON records on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FieldValue>),
    Dict(HashMap<String, FieldValue>),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Equality with numeric coercion: `Int(1)` equals `Float(1.0)`.
    pub fn loose_eq(&self, other: &FieldValue) -> bool {
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Ordering for LT/GT filters. Numbers compare cross-variant,
    /// strings lexicographically; anything else is incomparable.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (FieldValue::Str(a), FieldValue::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Str(s) => Value::String(s.clone()),
            FieldValue::Int(i) => Value::Number(Number::from(*i)),
            FieldValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            FieldValue::Dict(map) => {
                let mut object = Map::new();
                for (key, value) in map {
                    object.insert(key.clone(), value.to_json());
                }
                Value::Object(object)
            }
        }
    }

    pub fn from_json(value: &Value) -> FieldValue {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => FieldValue::Str(s.clone()),
            Value::Array(items) => {
                FieldValue::List(items.iter().map(FieldValue::from_json).collect())
            }
            Value::Object(object) => {
                let mut map = HashMap::new();
                for (key, value) in object {
                    map.insert(key.clone(), FieldValue::from_json(value));
                }
                FieldValue::Dict(map)
            }
        }
    }
}

/// Serializes a field dictionary to the flat JSON object persisted per entity.
pub fn map_to_json(map: &HashMap<String, FieldValue>) -> Value {
    let mut object = Map::new();
    for (key, value) in map {
        object.insert(key.clone(), value.to_json());
    }
    Value::Object(object)
}

pub fn map_from_json(value: &Value) -> Result<HashMap<String, FieldValue>> {
    let object = value.as_object().ok_or_else(|| {
        Error::new(
            ErrorKind::Parse,
            "entity record is not a flat JSON object".to_string(),
        )
    })?;
    let mut map = HashMap::new();
    for (key, value) in object {
        map.insert(key.clone(), FieldValue::from_json(value));
    }
    Ok(map)
}
