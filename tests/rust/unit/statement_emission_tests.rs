//! Unit tests for join-graph construction and statement emission: alias
//! determinism, join deduplication, distinct handling and pagination
//! windows.

use std::collections::HashMap;

use sensorpath::config::PersistenceSettings;
use sensorpath::model::{IdManagerLong, ModelConfig, ModelRegistry};
use sensorpath::query::options::parse_query;
use sensorpath::query::Query;
use sensorpath::resource_path::{parse_path, ResourcePath};
use sensorpath::sql::{QueryBuilder, SqlStatement, SqlValue, TableCollection};
use test_case::test_case;

struct Fixture {
    registry: ModelRegistry,
    tables: TableCollection,
    settings: PersistenceSettings,
}

fn fixture() -> Fixture {
    let registry = ModelRegistry::build(&ModelConfig::sensorthings()).unwrap();
    let tables = TableCollection::build(&registry).unwrap();
    Fixture {
        registry,
        tables,
        settings: PersistenceSettings::default(),
    }
}

fn path(f: &Fixture, text: &str) -> ResourcePath {
    parse_path(&f.registry, &IdManagerLong, "http://localhost/sta", "v1.1", text).unwrap()
}

fn query(pairs: &[(&str, &str)]) -> Query {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    parse_query(&map).unwrap()
}

fn select(f: &Fixture, path_text: &str, q: Option<&Query>) -> SqlStatement {
    let rp = path(f, path_text);
    let builder = QueryBuilder::for_path(&f.registry, &f.tables, &f.settings, &rp);
    let builder = match q {
        Some(q) => builder.using_query(q),
        None => builder,
    };
    builder.build_select().unwrap()
}

#[test]
fn aliases_are_deterministic_and_never_reused() {
    let f = fixture();
    // Three path joins from the root: e1, e2, e3 in traversal order.
    let stmt = select(&f, "/Things(1)/Datastreams(2)/Observations(3)/FeatureOfInterest", None);
    assert!(stmt.sql.contains("FROM \"FEATURES\" AS e0"));
    assert!(stmt.sql.contains("\"OBSERVATIONS\" AS e1"));
    assert!(stmt.sql.contains("\"DATASTREAMS\" AS e2"));
    assert!(stmt.sql.contains("\"THINGS\" AS e3"));
    assert!(!stmt.sql.contains(" AS e4"));
}

#[test]
fn same_type_through_different_navigations_gets_two_aliases() {
    let f = fixture();
    // The path reaches Thing via the Datastream; the filter reaches Thing
    // again through its own navigation. Two distinct aliases are required.
    let q = query(&[("$filter", "Thing/name eq 'x'")]);
    let stmt = select(&f, "/Things(1)/Datastreams", Some(&q));
    assert!(stmt.sql.contains("\"THINGS\" AS e1"));
    assert!(stmt.sql.contains("\"THINGS\" AS e2"));
}

#[test]
fn same_navigation_position_is_deduplicated() {
    let f = fixture();
    // Both filter terms and the order term traverse the same navigation;
    // exactly one Datastream join may exist.
    let q = query(&[
        (
            "$filter",
            "Datastream/name eq 'x' and Datastream/observationType ne 'y'",
        ),
        ("$orderby", "Datastream/name"),
    ]);
    let stmt = select(&f, "/Observations", Some(&q));
    assert!(stmt.sql.contains("\"DATASTREAMS\" AS e1"));
    assert!(!stmt.sql.contains("\"DATASTREAMS\" AS e2"));
}

#[test_case(10, 5, "LIMIT 11 OFFSET 5"; "top and skip")]
#[test_case(1, 0, "LIMIT 2\n"; "top one no skip")]
#[test_case(25, 100, "LIMIT 26 OFFSET 100"; "large skip")]
fn pagination_window(top: i64, skip: i64, expected: &str) {
    let f = fixture();
    let q = Query {
        top: Some(top),
        skip: Some(skip),
        ..Default::default()
    };
    let stmt = select(&f, "/Datastreams(1)/Observations", Some(&q));
    assert!(
        stmt.sql.contains(expected),
        "expected `{expected}` in:\n{}",
        stmt.sql
    );
}

#[test]
fn single_entity_window_is_two_rows() {
    let f = fixture();
    // Even with an explicit top, a by-id fetch is capped at 2 rows so a
    // duplicate unique match cannot pass unnoticed.
    let q = query(&[("$top", "50")]);
    let stmt = select(&f, "/Things(1)", Some(&q));
    assert!(stmt.sql.contains("LIMIT 2"));
    assert!(!stmt.sql.contains("OFFSET"));
}

#[test]
fn stable_pagination_appends_id_tiebreak_last() {
    let f = fixture();
    let q = query(&[("$orderby", "name desc")]);
    let stmt = select(&f, "/Things", Some(&q));
    assert!(stmt
        .sql
        .contains("ORDER BY e0.\"NAME\" DESC, e0.\"ID\" ASC"));
}

#[test]
fn unstable_order_configuration_skips_tiebreak() {
    let mut f = fixture();
    f.settings.always_orderby_id = false;
    let stmt = select(&f, "/Things", None);
    assert!(!stmt.sql.contains("ORDER BY"));
}

#[test]
fn explicit_select_distinct_wins() {
    let f = fixture();
    let q = query(&[("$select", "distinct:name")]);
    let stmt = select(&f, "/Things", Some(&q));
    assert!(stmt.sql.starts_with("SELECT DISTINCT e0.\"NAME\""));
}

#[test]
fn count_shapes() {
    let f = fixture();

    let rp = path(&f, "/Datastreams(1)/Observations");
    let stmt = QueryBuilder::for_path(&f.registry, &f.tables, &f.settings, &rp)
        .build_count()
        .unwrap();
    assert!(stmt.sql.starts_with("SELECT COUNT(e0.\"ID\")"));

    // A many-to-many traversal duplicates rows; the count must deduplicate.
    let rp = path(&f, "/Things(1)/Locations");
    let stmt = QueryBuilder::for_path(&f.registry, &f.tables, &f.settings, &rp)
        .build_count()
        .unwrap();
    assert!(stmt.sql.starts_with("SELECT COUNT(DISTINCT e0.\"ID\")"));

    // An explicit select-distinct counts the distinct selected columns.
    let q = query(&[("$select", "distinct:name")]);
    let rp = path(&f, "/Things");
    let stmt = QueryBuilder::for_path(&f.registry, &f.tables, &f.settings, &rp)
        .using_query(&q)
        .build_count()
        .unwrap();
    assert!(stmt.sql.starts_with("SELECT COUNT(DISTINCT e0.\"NAME\")"));
}

#[test]
fn delete_uses_id_subselect() {
    let f = fixture();
    let q = query(&[("$filter", "result lt 0")]);
    let rp = path(&f, "/Datastreams(1)/Observations");
    let stmt = QueryBuilder::for_path(&f.registry, &f.tables, &f.settings, &rp)
        .using_query(&q)
        .build_delete()
        .unwrap();
    assert!(stmt
        .sql
        .starts_with("DELETE FROM \"OBSERVATIONS\" WHERE \"ID\" IN ("));
    assert!(stmt.sql.contains("SELECT e0.\"ID\""));
    assert!(stmt.sql.contains("e0.\"RESULT_NUMBER\" < ?"));
    assert!(!stmt.sql.contains("LIMIT"));
    assert_eq!(stmt.params, vec![SqlValue::Long(1), SqlValue::Long(0)]);
}

#[test]
fn for_update_is_appended() {
    let f = fixture();
    let rp = path(&f, "/Things(1)");
    let stmt = QueryBuilder::for_path(&f.registry, &f.tables, &f.settings, &rp)
        .for_update(true)
        .build_select()
        .unwrap();
    assert!(stmt.sql.trim_end().ends_with("FOR UPDATE"));
}

#[test]
fn id_predicates_bind_in_walk_order() {
    let f = fixture();
    let stmt = select(&f, "/Things(1)/Datastreams(2)/Observations", None);
    // Innermost id first: the walk resolves Observations, then
    // Datastream(2), then Thing(1).
    assert_eq!(stmt.params, vec![SqlValue::Long(2), SqlValue::Long(1)]);
}
