mod common;

use serde_json::json;

use common::{fixture, fixture_with, seed, str_value, Fixture};
use hybridal::core::config::Config;
use hybridal::core::error::ErrorKind;
use hybridal::core::types::FieldValue;
use hybridal::query::ast::{Operator, Predicate, Query, QueryNode};
use hybridal::query::invalidation;
use hybridal::query::list::ListData;
use hybridal::query::parser::parse_query;

fn predicate(path: &str, op: Operator, value: FieldValue) -> QueryNode {
    QueryNode::Predicate(Predicate::new(path, op, value))
}

fn count(f: &Fixture, query: &Query) -> usize {
    match f.store.query(query).unwrap().data {
        ListData::Count(count) => count,
        other => panic!("expected a count, got {:?}", other),
    }
}

/// Five disks named d0..d4 with sizes 0..4, d0/d1/d2 on one machine.
fn populate(f: &Fixture) -> (String, Vec<String>) {
    let mut machine = f
        .store
        .create_with("machine", seed(&[("name", str_value("host"))]))
        .unwrap();
    machine.save().unwrap();
    let mut guids = Vec::new();
    for i in 0..5i64 {
        let mut disk = f
            .store
            .create_with(
                "disk",
                seed(&[
                    ("name", str_value(&format!("d{}", i))),
                    ("size", FieldValue::Int(i)),
                ]),
            )
            .unwrap();
        if i < 3 {
            disk.set_relation("machine", Some(&machine)).unwrap();
        }
        disk.save().unwrap();
        guids.push(disk.guid().to_string());
    }
    (machine.guid().to_string(), guids)
}

#[test]
fn empty_and_matches_everything_empty_or_matches_nothing() {
    let f = fixture();
    populate(&f);
    assert_eq!(count(&f, &Query::count("disk", QueryNode::And(vec![]))), 5);
    assert_eq!(count(&f, &Query::count("disk", QueryNode::Or(vec![]))), 0);
}

#[test]
fn comparison_operators() {
    let f = fixture();
    populate(&f);
    assert_eq!(
        count(
            &f,
            &Query::count("disk", predicate("name", Operator::Equals, str_value("d2")))
        ),
        1
    );
    assert_eq!(
        count(
            &f,
            &Query::count(
                "disk",
                predicate("name", Operator::NotEquals, str_value("d2"))
            )
        ),
        4
    );
    assert_eq!(
        count(
            &f,
            &Query::count(
                "disk",
                predicate("size", Operator::GreaterThan, FieldValue::Int(2))
            )
        ),
        2
    );
    assert_eq!(
        count(
            &f,
            &Query::count(
                "disk",
                predicate("size", Operator::LessThan, FieldValue::Int(2))
            )
        ),
        2
    );
    assert_eq!(
        count(
            &f,
            &Query::count(
                "disk",
                predicate(
                    "name",
                    Operator::In,
                    FieldValue::List(vec![str_value("d0"), str_value("d4"), str_value("nope")])
                )
            )
        ),
        2
    );
}

#[test]
fn numeric_comparison_crosses_int_and_float() {
    let f = fixture();
    populate(&f);
    assert_eq!(
        count(
            &f,
            &Query::count(
                "disk",
                predicate("size", Operator::Equals, FieldValue::Float(1.0))
            )
        ),
        1
    );
}

#[test]
fn combinators_nest() {
    let f = fixture();
    populate(&f);
    // size > 2 or (size < 2 and name == d0)
    let filter = QueryNode::Or(vec![
        predicate("size", Operator::GreaterThan, FieldValue::Int(2)),
        QueryNode::And(vec![
            predicate("size", Operator::LessThan, FieldValue::Int(2)),
            predicate("name", Operator::Equals, str_value("d0")),
        ]),
    ]);
    assert_eq!(count(&f, &Query::count("disk", filter)), 3);
}

#[test]
fn predicates_traverse_relations() {
    let f = fixture();
    populate(&f);
    assert_eq!(
        count(
            &f,
            &Query::count(
                "disk",
                predicate("machine.name", Operator::Equals, str_value("host"))
            )
        ),
        3
    );
    // An unset link fails the predicate regardless of the operator.
    assert_eq!(
        count(
            &f,
            &Query::count(
                "disk",
                predicate("machine.name", Operator::NotEquals, str_value("host"))
            )
        ),
        0
    );
}

#[test]
fn identifier_queries_return_matching_guids() {
    let f = fixture();
    let (_, guids) = populate(&f);
    let result = f
        .store
        .query(&Query::identifiers(
            "disk",
            predicate("size", Operator::LessThan, FieldValue::Int(2)),
        ))
        .unwrap();
    match result.data {
        ListData::Identifiers(mut found) => {
            found.sort();
            let mut expected = vec![guids[0].clone(), guids[1].clone()];
            expected.sort();
            assert_eq!(found, expected);
        }
        other => panic!("expected identifiers, got {:?}", other),
    }
}

#[test]
fn results_are_cached_until_a_depended_field_changes() {
    let f = fixture();
    let (_, guids) = populate(&f);
    let query = Query::count(
        "disk",
        predicate("size", Operator::GreaterThan, FieldValue::Int(1)),
    );
    assert!(!f.store.query(&query).unwrap().from_cache);
    assert!(f.store.query(&query).unwrap().from_cache);

    // A field the query does not depend on leaves the cache alone.
    let mut disk = f.store.load("disk", &guids[0]).unwrap();
    disk.set("description", str_value("noise")).unwrap();
    disk.save().unwrap();
    assert!(f.store.query(&query).unwrap().from_cache);

    // A depended field drops it.
    let mut disk = f.store.load("disk", &guids[0]).unwrap();
    disk.set("size", FieldValue::Int(9)).unwrap();
    disk.save().unwrap();
    let rerun = f.store.query(&query).unwrap();
    assert!(!rerun.from_cache);
    assert_eq!(rerun.data, ListData::Count(4));
}

#[test]
fn traversed_types_invalidate_too() {
    let f = fixture();
    let (machine_guid, _) = populate(&f);
    let query = Query::count(
        "disk",
        predicate("machine.name", Operator::Equals, str_value("host")),
    );
    assert_eq!(count(&f, &query), 3);
    assert!(f.store.query(&query).unwrap().from_cache);

    let mut machine = f.store.load("machine", &machine_guid).unwrap();
    machine.set("name", str_value("renamed")).unwrap();
    machine.save().unwrap();
    let rerun = f.store.query(&query).unwrap();
    assert!(!rerun.from_cache);
    assert_eq!(rerun.data, ListData::Count(0));
}

#[test]
fn new_instances_invalidate_cached_results() {
    let f = fixture();
    populate(&f);
    let query = Query::count("disk", QueryNode::And(vec![]));
    assert_eq!(count(&f, &query), 5);
    assert!(f.store.query(&query).unwrap().from_cache);

    let mut extra = f
        .store
        .create_with("disk", seed(&[("name", str_value("d5"))]))
        .unwrap();
    extra.save().unwrap();
    let rerun = f.store.query(&query).unwrap();
    assert!(!rerun.from_cache);
    assert_eq!(rerun.data, ListData::Count(6));
}

#[test]
fn dynamic_predicates_are_never_cached() {
    let f = fixture();
    for i in 1..4i64 {
        let mut disk = f
            .store
            .create_with(
                "disk",
                seed(&[
                    ("name", str_value(&format!("d{}", i))),
                    ("order", FieldValue::Int(i)),
                ]),
            )
            .unwrap();
        disk.save().unwrap();
    }
    let query = Query::count(
        "disk",
        predicate("used_size", Operator::GreaterThan, FieldValue::Int(150)),
    );
    let first = f.store.query(&query).unwrap();
    assert!(!first.from_cache);
    assert_eq!(first.data, ListData::Count(2));
    let second = f.store.query(&query).unwrap();
    assert!(!second.from_cache);
}

#[test]
fn non_cacheable_queries_register_no_dependencies() {
    let f = fixture();
    populate(&f);
    let result = f
        .store
        .query(&Query::count(
            "disk",
            predicate("used_size", Operator::GreaterThan, FieldValue::Int(150)),
        ))
        .unwrap();
    assert!(!result.from_cache);
    assert!(!invalidation::registered(f.store.context(), "disk", &result.key).unwrap());
}

#[test]
fn queries_over_empty_types_are_not_cached() {
    let f = fixture();
    let query = Query::count("disk", QueryNode::And(vec![]));
    let first = f.store.query(&query).unwrap();
    assert_eq!(first.data, ListData::Count(0));
    assert!(!first.from_cache);
    let second = f.store.query(&query).unwrap();
    assert!(!second.from_cache);
}

#[test]
fn index_loss_falls_back_to_a_prefix_scan() {
    let f = fixture();
    populate(&f);
    f.volatile.clear();
    assert_eq!(count(&f, &Query::count("disk", QueryNode::And(vec![]))), 5);
}

#[test]
fn small_index_pages_survive_mutation() {
    let f = fixture_with(Config {
        page_size: 2,
        ..Config::default()
    });
    let (_, guids) = populate(&f);
    let query = Query::count("disk", QueryNode::And(vec![]));
    assert_eq!(count(&f, &query), 5);

    let mut doomed = f.store.load("disk", &guids[4]).unwrap();
    doomed.delete(false).unwrap();
    assert_eq!(count(&f, &query), 4);
}

#[test]
fn json_queries_parse_and_run() {
    let f = fixture();
    populate(&f);
    let query = parse_query(&json!({
        "object": "disk",
        "select": "COUNT",
        "filter": {
            "combinator": "AND",
            "items": [["size", "GT", 1]],
        },
    }))
    .unwrap();
    assert_eq!(count(&f, &query), 3);
}

#[test]
fn unsupported_query_elements_fail_at_parse_time() {
    let bad_select = json!({
        "object": "disk",
        "select": "SUM",
        "filter": {"combinator": "AND", "items": []},
    });
    assert_eq!(
        parse_query(&bad_select).unwrap_err().kind,
        ErrorKind::NotImplemented
    );

    let bad_combinator = json!({
        "object": "disk",
        "select": "COUNT",
        "filter": {"combinator": "XOR", "items": []},
    });
    assert_eq!(
        parse_query(&bad_combinator).unwrap_err().kind,
        ErrorKind::NotImplemented
    );

    let bad_operator = json!({
        "object": "disk",
        "select": "COUNT",
        "filter": {"combinator": "AND", "items": [["name", "LIKE", "d%"]]},
    });
    assert_eq!(
        parse_query(&bad_operator).unwrap_err().kind,
        ErrorKind::NotImplemented
    );
}

#[test]
fn base_and_derived_type_queries_see_the_same_instances() {
    let f = fixture();
    populate(&f);
    let base = count(&f, &Query::count("machine", QueryNode::And(vec![])));
    let derived = count(&f, &Query::count("emachine", QueryNode::And(vec![])));
    assert_eq!(base, 1);
    assert_eq!(derived, 1);
}

#[test]
fn querying_an_unknown_field_fails() {
    let f = fixture();
    populate(&f);
    let err = f
        .store
        .query(&Query::count(
            "disk",
            predicate("bogus", Operator::Equals, str_value("x")),
        ))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidOperation);
}
