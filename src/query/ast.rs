use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::core::types::FieldValue;

/// Shape of the query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Select {
    Count,
    Identifiers,
}

impl Select {
    pub fn as_str(&self) -> &'static str {
        match self {
            Select::Count => "COUNT",
            Select::Identifiers => "IDENTIFIERS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    GreaterThan,
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "EQUALS",
            Operator::NotEquals => "NOT_EQUALS",
            Operator::LessThan => "LT",
            Operator::GreaterThan => "GT",
            Operator::In => "IN",
        }
    }
}

/// Leaf comparison against a (possibly relation-traversing) field path.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub path: Vec<String>,
    pub op: Operator,
    pub value: FieldValue,
}

impl Predicate {
    /// `path` is dot-separated, e.g. `"the_disk.size"`.
    pub fn new(path: &str, op: Operator, value: FieldValue) -> Self {
        Predicate {
            path: path.split('.').map(|s| s.to_string()).collect(),
            op,
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub enum QueryNode {
    /// True when every item matches; an empty list matches everything.
    And(Vec<QueryNode>),
    /// True when any item matches; an empty list matches nothing.
    Or(Vec<QueryNode>),
    Predicate(Predicate),
}

#[derive(Debug, Clone)]
pub struct Query {
    pub object: String,
    pub select: Select,
    pub filter: QueryNode,
}

impl Query {
    pub fn count(object: &str, filter: QueryNode) -> Self {
        Query {
            object: object.to_string(),
            select: Select::Count,
            filter,
        }
    }

    pub fn identifiers(object: &str, filter: QueryNode) -> Self {
        Query {
            object: object.to_string(),
            select: Select::Identifiers,
            filter,
        }
    }

    /// Canonical JSON form, also the hashing input for the cache key.
    pub fn to_json(&self) -> Value {
        json!({
            "object": self.object,
            "select": self.select.as_str(),
            "filter": node_json(&self.filter),
        })
    }

    /// Content-derived cache key: hex SHA-256 of the canonical JSON.
    pub fn cache_suffix(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_json().to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

fn node_json(node: &QueryNode) -> Value {
    match node {
        QueryNode::And(items) => json!({
            "combinator": "AND",
            "items": items.iter().map(node_json).collect::<Vec<_>>(),
        }),
        QueryNode::Or(items) => json!({
            "combinator": "OR",
            "items": items.iter().map(node_json).collect::<Vec<_>>(),
        }),
        QueryNode::Predicate(p) => json!([
            p.path.join("."),
            p.op.as_str(),
            p.value.to_json(),
        ]),
    }
}
