//! JSON form of a query, the shape external callers submit.
//!
//! Anything outside the supported grammar fails with NotImplemented at
//! parse time rather than surfacing halfway through a scan.

use serde_json::Value;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::FieldValue;
use crate::query::ast::{Operator, Predicate, Query, QueryNode, Select};

/// Parses `{"object": ..., "select": ..., "filter": ...}`.
pub fn parse_query(value: &Value) -> Result<Query> {
    let object = value
        .get("object")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::new(ErrorKind::Parse, "query is missing an object type"))?;
    let select = match value.get("select").and_then(Value::as_str) {
        Some("COUNT") => Select::Count,
        Some("IDENTIFIERS") => Select::Identifiers,
        Some(other) => {
            return Err(Error::new(
                ErrorKind::NotImplemented,
                format!("unsupported select {}", other),
            ))
        }
        None => return Err(Error::new(ErrorKind::Parse, "query is missing a select")),
    };
    let filter = value
        .get("filter")
        .ok_or_else(|| Error::new(ErrorKind::Parse, "query is missing a filter"))?;
    Ok(Query {
        object: object.to_string(),
        select,
        filter: parse_node(filter)?,
    })
}

fn parse_node(value: &Value) -> Result<QueryNode> {
    match value {
        // Predicates are ["path", "OPERATOR", operand] triples.
        Value::Array(triple) => {
            if triple.len() != 3 {
                return Err(Error::new(
                    ErrorKind::Parse,
                    format!("predicate must have 3 elements, got {}", triple.len()),
                ));
            }
            let path = triple[0]
                .as_str()
                .ok_or_else(|| Error::new(ErrorKind::Parse, "predicate path must be a string"))?;
            let op = match triple[1].as_str() {
                Some("EQUALS") => Operator::Equals,
                Some("NOT_EQUALS") => Operator::NotEquals,
                Some("LT") => Operator::LessThan,
                Some("GT") => Operator::GreaterThan,
                Some("IN") => Operator::In,
                Some(other) => {
                    return Err(Error::new(
                        ErrorKind::NotImplemented,
                        format!("unsupported operator {}", other),
                    ))
                }
                None => {
                    return Err(Error::new(
                        ErrorKind::Parse,
                        "predicate operator must be a string",
                    ))
                }
            };
            Ok(QueryNode::Predicate(Predicate::new(
                path,
                op,
                FieldValue::from_json(&triple[2]),
            )))
        }
        Value::Object(map) => {
            let combinator = map.get("combinator").and_then(Value::as_str);
            let items = map
                .get("items")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::new(ErrorKind::Parse, "combinator node needs items"))?;
            let parsed: Result<Vec<QueryNode>> = items.iter().map(parse_node).collect();
            match combinator {
                Some("AND") => Ok(QueryNode::And(parsed?)),
                Some("OR") => Ok(QueryNode::Or(parsed?)),
                Some(other) => Err(Error::new(
                    ErrorKind::NotImplemented,
                    format!("unsupported combinator {}", other),
                )),
                None => Err(Error::new(ErrorKind::Parse, "combinator node needs a combinator")),
            }
        }
        _ => Err(Error::new(
            ErrorKind::Parse,
            "filter nodes must be objects or predicate triples",
        )),
    }
}
