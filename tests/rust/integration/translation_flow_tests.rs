//! End-to-end translation scenarios: path text plus query options in,
//! finished statements out.

use std::collections::HashMap;

use sensorpath::config::PersistenceSettings;
use sensorpath::model::{IdKind, IdManagerText, IdManagerLong, ModelConfig, ModelRegistry};
use sensorpath::query::options::parse_query;
use sensorpath::query::Query;
use sensorpath::resource_path::parse_path;
use sensorpath::sql::{QueryBuilder, QueryError, SqlStatement, SqlValue, TableCollection};

struct Engine {
    registry: ModelRegistry,
    tables: TableCollection,
    settings: PersistenceSettings,
}

impl Engine {
    fn new() -> Self {
        let registry = ModelRegistry::build(&ModelConfig::sensorthings()).unwrap();
        let tables = TableCollection::build(&registry).unwrap();
        Engine {
            registry,
            tables,
            settings: PersistenceSettings::default(),
        }
    }

    fn translate(&self, path: &str, options: &[(&str, &str)]) -> Result<SqlStatement, QueryError> {
        let rp = parse_path(
            &self.registry,
            &IdManagerLong,
            "http://localhost/sta",
            "v1.1",
            path,
        )?;
        let map: HashMap<String, String> = options
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let query = parse_query(&map).unwrap();
        QueryBuilder::for_path(&self.registry, &self.tables, &self.settings, &rp)
            .using_query(&query)
            .build_select()
    }
}

#[test]
fn filtered_navigation_scenario() {
    // /Things(1)/Datastreams with a name filter and no orderby: one-to-many
    // join to the owning Thing, the filter predicate, and a deterministic
    // ascending id order.
    let engine = Engine::new();
    let stmt = engine
        .translate("/Things(1)/Datastreams", &[("$filter", "name eq 'x'")])
        .unwrap();

    assert!(stmt.sql.contains("FROM \"DATASTREAMS\" AS e0"));
    assert!(stmt
        .sql
        .contains("INNER JOIN \"THINGS\" AS e1 ON e1.\"ID\" = e0.\"THING_ID\""));
    assert!(stmt.sql.contains("(e1.\"ID\" = ?) AND (e0.\"NAME\" = ?)"));
    assert!(stmt.sql.contains("ORDER BY e0.\"ID\" ASC"));
    assert_eq!(
        stmt.params,
        vec![SqlValue::Long(1), SqlValue::Text("x".to_string())]
    );
}

#[test]
fn ordered_many_to_many_without_filter_orders_by_rank() {
    let engine = Engine::new();
    let stmt = engine
        .translate("/MultiDatastreams(3)/ObservedProperties", &[])
        .unwrap();
    assert!(!stmt.sql.starts_with("SELECT DISTINCT"));
    // Rank order comes first, the stable id tie-break last.
    let rank_at = stmt.sql.find("\"RANK\" ASC").unwrap();
    let id_at = stmt.sql.find("e0.\"ID\" ASC").unwrap();
    assert!(rank_at < id_at);
}

#[test]
fn ordered_many_to_many_with_filter_is_distinct() {
    let engine = Engine::new();
    let stmt = engine
        .translate(
            "/MultiDatastreams(3)/ObservedProperties",
            &[("$filter", "name ne 'x'")],
        )
        .unwrap();
    assert!(stmt.sql.starts_with("SELECT DISTINCT"));
    assert!(!stmt.sql.contains("\"RANK\""));
}

#[test]
fn deep_chain_with_pagination() {
    let engine = Engine::new();
    let stmt = engine
        .translate(
            "/Things(1)/Datastreams(2)/Observations",
            &[("$top", "10"), ("$skip", "5"), ("$orderby", "resultTime desc")],
        )
        .unwrap();
    assert!(stmt.sql.contains("FROM \"OBSERVATIONS\" AS e0"));
    assert!(stmt
        .sql
        .contains("ORDER BY e0.\"RESULT_TIME\" DESC, e0.\"ID\" ASC"));
    assert!(stmt.sql.contains("LIMIT 11 OFFSET 5"));
}

#[test]
fn expand_forces_id_and_navigation_link() {
    let engine = Engine::new();
    let stmt = engine
        .translate(
            "/Observations",
            &[("$select", "result"), ("$expand", "Datastream")],
        )
        .unwrap();
    assert!(stmt.sql.contains("e0.\"RESULT_NUMBER\""));
    assert!(stmt.sql.contains("e0.\"ID\""));
    assert!(stmt.sql.contains("e0.\"DATASTREAM_ID\""));
    // Unrelated columns stay out of the projection.
    assert!(!stmt.sql.contains("PHENOMENON_TIME_START"));
}

#[test]
fn select_without_expand_prunes_to_selection() {
    let engine = Engine::new();
    let stmt = engine.translate("/Things", &[("$select", "name")]).unwrap();
    assert!(stmt.sql.contains("e0.\"NAME\""));
    assert!(!stmt.sql.contains("AS \"ID\""));
}

#[test]
fn filter_across_two_navigations() {
    let engine = Engine::new();
    let stmt = engine
        .translate(
            "/Observations",
            &[("$filter", "Datastream/Thing/name eq 'rooftop'")],
        )
        .unwrap();
    assert!(stmt.sql.contains("\"DATASTREAMS\" AS e1"));
    assert!(stmt.sql.contains("\"THINGS\" AS e2"));
    assert!(stmt.sql.contains("e2.\"NAME\" = ?"));
}

#[test]
fn null_test_compiles_to_is_null() {
    let engine = Engine::new();
    let stmt = engine
        .translate("/Observations", &[("$filter", "resultTime eq null")])
        .unwrap();
    assert!(stmt.sql.contains("e0.\"RESULT_TIME\" IS NULL"));

    let stmt = engine
        .translate("/Observations", &[("$filter", "resultTime ne null")])
        .unwrap();
    assert!(stmt.sql.contains("e0.\"RESULT_TIME\" IS NOT NULL"));
}

#[test]
fn text_id_deployment_round_trip() {
    let registry = ModelRegistry::build(&ModelConfig::sensorthings()).unwrap();
    let tables = TableCollection::build(&registry).unwrap();
    let settings = PersistenceSettings {
        id_kind: IdKind::Text,
        ..Default::default()
    };
    let rp = parse_path(
        &registry,
        &IdManagerText,
        "http://localhost/sta",
        "v1.1",
        "/Things('station-7')/Datastreams",
    )
    .unwrap();
    let stmt = QueryBuilder::for_path(&registry, &tables, &settings, &rp)
        .using_query(&Query::default())
        .build_select()
        .unwrap();
    assert_eq!(stmt.params, vec![SqlValue::Text("station-7".to_string())]);
}

#[test]
fn long_deployment_rejects_foreign_id_kind() {
    // A path parsed under a text id strategy must not translate in a
    // long-id deployment.
    let registry = ModelRegistry::build(&ModelConfig::sensorthings()).unwrap();
    let tables = TableCollection::build(&registry).unwrap();
    let settings = PersistenceSettings::default();
    let rp = parse_path(
        &registry,
        &IdManagerText,
        "http://localhost/sta",
        "v1.1",
        "/Things('station-7')",
    )
    .unwrap();
    let result = QueryBuilder::for_path(&registry, &tables, &settings, &rp).build_select();
    assert!(matches!(result, Err(QueryError::IdTypeMismatch { .. })));
}
