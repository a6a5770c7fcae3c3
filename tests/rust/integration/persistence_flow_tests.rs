//! Persistence flows against a scripted store: pagination windows,
//! link/unlink statements, integrity faults and the completion pass.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use sensorpath::config::PersistenceSettings;
use sensorpath::model::{Entity, Id, ModelConfig, ModelRegistry};
use sensorpath::persistence::{EntityFactory, PersistenceError, Store};
use sensorpath::sql::{Row, SqlStatement, SqlValue, TableCollection};
use serde_json::json;

/// A store that answers queries from scripted row sets and records every
/// executed statement.
#[derive(Default)]
struct ScriptedStore {
    row_sets: Mutex<VecDeque<Vec<Row>>>,
    affected: Mutex<VecDeque<u64>>,
    executed: Mutex<Vec<SqlStatement>>,
    queried: Mutex<Vec<SqlStatement>>,
}

impl ScriptedStore {
    fn with_rows(rows: Vec<Vec<Row>>) -> Self {
        ScriptedStore {
            row_sets: Mutex::new(rows.into()),
            ..Default::default()
        }
    }

    fn with_affected(counts: Vec<u64>) -> Self {
        ScriptedStore {
            affected: Mutex::new(counts.into()),
            ..Default::default()
        }
    }

    fn executed(&self) -> Vec<SqlStatement> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for ScriptedStore {
    async fn query_rows(&self, statement: &SqlStatement) -> Result<Vec<Row>, PersistenceError> {
        self.queried.lock().unwrap().push(statement.clone());
        Ok(self
            .row_sets
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn execute(&self, statement: &SqlStatement) -> Result<u64, PersistenceError> {
        self.executed.lock().unwrap().push(statement.clone());
        Ok(self.affected.lock().unwrap().pop_front().unwrap_or(1))
    }
}

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

fn observation_row(id: i64) -> Row {
    Row::new()
        .set("ID", SqlValue::Long(id))
        .set("RESULT_NUMBER", SqlValue::Double(20.0 + id as f64))
}

/// The window a store sees for `$top=10&$skip=5` over 12 matching rows:
/// `LIMIT 11 OFFSET 5` yields rows ranked 6..=12, i.e. min(top+1, 12-5) = 7
/// rows, so no look-ahead row beyond `$top` exists and "more results" is
/// false.
#[tokio::test]
async fn pagination_window_against_twelve_rows() {
    use sensorpath::model::IdManagerLong;
    use sensorpath::query::options::parse_query;
    use sensorpath::resource_path::parse_path;
    use sensorpath::sql::QueryBuilder;
    use std::collections::HashMap;

    let f = fixture();
    let rp = parse_path(
        &f.registry,
        &IdManagerLong,
        "http://localhost/sta",
        "v1.1",
        "/Datastreams(1)/Observations",
    )
    .unwrap();
    let options: HashMap<String, String> = [("$top", "10"), ("$skip", "5")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let query = parse_query(&options).unwrap();
    let stmt = QueryBuilder::for_path(&f.registry, &f.tables, &f.settings, &rp)
        .using_query(&query)
        .build_select()
        .unwrap();
    assert!(stmt.sql.contains("LIMIT 11 OFFSET 5"));

    // A store honoring that window over 12 matching rows returns ranks
    // 6..=12.
    let windowed: Vec<Row> = (6..=12).map(observation_row).collect();
    let store = ScriptedStore::with_rows(vec![windowed]);
    let rows = store.query_rows(&stmt).await.unwrap();
    assert_eq!(rows.len(), 7);
    assert_eq!(store.queried.lock().unwrap().len(), 1);

    let top = query.top_or_default(&f.settings) as usize;
    let has_more = rows.len() > top;
    assert!(!has_more);

    let factory = EntityFactory::new(&f.registry, &f.tables, &f.settings);
    let first = factory.entity_from_row("Observation", &rows[0]).unwrap();
    assert_eq!(first.id, Some(Id::Long(6)));
}

#[tokio::test]
async fn ordered_link_appends_at_current_count() {
    let f = fixture();
    let factory = EntityFactory::new(&f.registry, &f.tables, &f.settings);
    let store = ScriptedStore::default();

    factory
        .link(
            &store,
            "MultiDatastream",
            "ObservedProperties",
            &Id::Long(5),
            &Id::Long(7),
        )
        .await
        .unwrap();

    let executed = store.executed();
    assert_eq!(executed.len(), 1);
    // The rank is the current link count for the source, computed in the
    // same statement: with 3 existing links the new row gets rank 3.
    assert_eq!(
        executed[0].sql,
        "INSERT INTO \"MULTI_DATASTREAMS_OBS_PROPERTIES\" \
         (\"MULTI_DATASTREAM_ID\", \"OBS_PROPERTY_ID\", \"RANK\") \
         SELECT ?, ?, COUNT(*) FROM \"MULTI_DATASTREAMS_OBS_PROPERTIES\" \
         WHERE \"MULTI_DATASTREAM_ID\" = ?"
    );
    assert_eq!(
        executed[0].params,
        vec![SqlValue::Long(5), SqlValue::Long(7), SqlValue::Long(5)]
    );
}

#[tokio::test]
async fn one_to_many_link_must_affect_exactly_one_row() {
    let f = fixture();
    let factory = EntityFactory::new(&f.registry, &f.tables, &f.settings);

    let store = ScriptedStore::with_affected(vec![1]);
    factory
        .link(&store, "Thing", "Datastreams", &Id::Long(1), &Id::Long(9))
        .await
        .unwrap();

    let store = ScriptedStore::with_affected(vec![0]);
    let result = factory
        .link(&store, "Thing", "Datastreams", &Id::Long(1), &Id::Long(9))
        .await;
    assert_eq!(result, Err(PersistenceError::Integrity { affected: 0 }));

    let store = ScriptedStore::with_affected(vec![2]);
    let result = factory
        .link(&store, "Thing", "Datastreams", &Id::Long(1), &Id::Long(9))
        .await;
    assert_eq!(result, Err(PersistenceError::Integrity { affected: 2 }));
}

#[tokio::test]
async fn unlink_removes_link_row() {
    let f = fixture();
    let factory = EntityFactory::new(&f.registry, &f.tables, &f.settings);
    let store = ScriptedStore::default();

    factory
        .unlink(&store, "Thing", "Locations", &Id::Long(1), &Id::Long(4))
        .await
        .unwrap();
    let executed = store.executed();
    assert_eq!(
        executed[0].sql,
        "DELETE FROM \"THINGS_LOCATIONS\" WHERE \"THING_ID\" = ? AND \"LOCATION_ID\" = ?"
    );
}

#[tokio::test]
async fn duplicate_unique_match_is_an_integrity_fault() {
    let f = fixture();
    let factory = EntityFactory::new(&f.registry, &f.tables, &f.settings);

    // Two rows for one id: the 2-row fetch window exposes the fault.
    let store = ScriptedStore::with_rows(vec![vec![observation_row(1), observation_row(1)]]);
    let result = factory.fetch_single(&store, "Observation", &Id::Long(1)).await;
    assert_eq!(
        result,
        Err(PersistenceError::DuplicateRow {
            entity_type: "Observation".to_string()
        })
    );
}

#[tokio::test]
async fn completion_pass_checks_references() {
    let f = fixture();
    let factory = EntityFactory::new(&f.registry, &f.tables, &f.settings);

    // Incomplete, no id: unrecoverable.
    let mut incomplete = Entity::new("Thing");
    incomplete.set_property("name", json!("x"));
    let store = ScriptedStore::default();
    let result = factory.validate_or_complete(&store, &incomplete).await;
    assert!(matches!(
        result,
        Err(PersistenceError::IncompleteEntity { .. })
    ));

    // Incomplete but identified: reduced to an existence check.
    let mut referenced = Entity::with_id("Thing", Id::Long(3));
    referenced.set_property("name", json!("x"));
    let store = ScriptedStore::with_rows(vec![vec![Row::new()
        .set("ID", SqlValue::Long(3))
        .set("NAME", SqlValue::Text("x".to_string()))
        .set("DESCRIPTION", SqlValue::Text("d".to_string()))]]);
    factory
        .validate_or_complete(&store, &referenced)
        .await
        .unwrap();

    // Complete, but referencing a missing Datastream: NoSuchEntity.
    let mut observation = Entity::new("Observation");
    observation.set_property("phenomenonTime", json!("2024-03-01T10:00:00Z"));
    observation.set_property("result", json!(21.5));
    observation.set_property("Datastream", json!({"@iot.id": 404}));
    let store = ScriptedStore::with_rows(vec![vec![]]);
    let result = factory.validate_or_complete(&store, &observation).await;
    assert_eq!(
        result,
        Err(PersistenceError::NoSuchEntity {
            entity_type: "Datastream".to_string(),
            id: "404".to_string()
        })
    );
}

#[tokio::test]
async fn update_affecting_many_rows_is_an_integrity_fault() {
    let f = fixture();
    let factory = EntityFactory::new(&f.registry, &f.tables, &f.settings);

    let mut entity = Entity::with_id("Thing", Id::Long(1));
    entity.set_property("name", json!("renamed"));

    let store = ScriptedStore::with_affected(vec![1]);
    let changed = factory.update(&store, &entity).await.unwrap();
    assert_eq!(changed, vec!["name".to_string()]);
    assert_eq!(
        store.executed()[0].sql,
        "UPDATE \"THINGS\" SET \"NAME\" = ? WHERE \"ID\" = ?"
    );

    let store = ScriptedStore::with_affected(vec![3]);
    let result = factory.update(&store, &entity).await;
    assert_eq!(result, Err(PersistenceError::Integrity { affected: 3 }));
}
