//! Entity materialization and persistence operations: rows to entities,
//! entities to insert/update column sets, and relationship mutation.
//!
//! Statement execution is delegated to the [`Store`] collaborator; the
//! translation work here stays pure and synchronous.

pub mod errors;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::PersistenceSettings;
use crate::model::{Entity, Id, ModelRegistry};
use crate::sql::{QueryBuilder, Row, SqlStatement, SqlValue, TableCollection};
use crate::utils::quote_ident;

pub use errors::PersistenceError;

/// The data store collaborator. The only suspension points of the engine
/// live behind this trait.
#[async_trait]
pub trait Store: Send + Sync {
    async fn query_rows(&self, statement: &SqlStatement) -> Result<Vec<Row>, PersistenceError>;
    /// Execute a mutating statement, returning the affected row count.
    async fn execute(&self, statement: &SqlStatement) -> Result<u64, PersistenceError>;
}

/// The column/value sets for an update, plus the changed logical fields for
/// change notification.
#[derive(Debug, Clone)]
pub struct UpdateSets {
    pub values: Vec<(String, SqlValue)>,
    pub changed_fields: Vec<String>,
}

/// Converts rows to entities and entities to column sets, and mutates
/// relationships.
pub struct EntityFactory<'a> {
    registry: &'a ModelRegistry,
    tables: &'a TableCollection,
    settings: &'a PersistenceSettings,
}

impl<'a> EntityFactory<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        tables: &'a TableCollection,
        settings: &'a PersistenceSettings,
    ) -> Self {
        EntityFactory {
            registry,
            tables,
            settings,
        }
    }

    /// Build an entity from one result row.
    pub fn entity_from_row(
        &self,
        entity_type: &str,
        row: &Row,
    ) -> Result<Entity, PersistenceError> {
        let table = self.tables.table_for_type(entity_type).map_err(|e| {
            PersistenceError::Query(e.into())
        })?;
        let mut entity = Entity::new(entity_type);
        for entry in table.fields.entries() {
            if entry.property == "id" {
                if let Some(cell) = row.get(&table.id_column) {
                    entity.id = cell.as_id();
                }
                continue;
            }
            if let Some(value) = entry.read(row) {
                entity.set_property(entry.property.clone(), value);
            }
        }
        Ok(entity)
    }

    /// The column/value pairs for inserting an entity. The entity must be
    /// complete: required properties present, unless it carries an id (then
    /// it references an existing row and completeness is not required).
    pub fn insert_sets(&self, entity: &Entity) -> Result<Vec<(String, SqlValue)>, PersistenceError> {
        self.check_complete(entity)?;
        self.value_sets(entity)
    }

    /// The column/value pairs for an update, with changed-field tracking.
    pub fn update_sets(&self, entity: &Entity) -> Result<UpdateSets, PersistenceError> {
        let table = self
            .tables
            .table_for_type(&entity.entity_type)
            .map_err(|e| PersistenceError::Query(e.into()))?;
        let mut values = Vec::new();
        let mut changed_fields = Vec::new();
        for (name, value) in &entity.properties {
            let entry = table.fields.entry(name).ok_or_else(|| {
                PersistenceError::Validation(crate::sql::ValidationError::Invalid {
                    property: name.clone(),
                    reason: "unknown property".to_string(),
                })
            })?;
            let (pairs, changed) = entry.update_values(value)?;
            values.extend(pairs);
            changed_fields.push(changed);
        }
        Ok(UpdateSets {
            values,
            changed_fields,
        })
    }

    /// Insert an entity. An entity that carries an id references an
    /// existing row instead: it is checked for existence and not inserted
    /// again.
    pub async fn insert(
        &self,
        store: &dyn Store,
        entity: &Entity,
    ) -> Result<(), PersistenceError> {
        let entity = self.validate_or_complete(store, entity).await?;
        if let Some(id) = &entity.id {
            self.ensure_exists(store, &entity.entity_type, id).await?;
            return Ok(());
        }
        let table = self
            .tables
            .table_for_type(&entity.entity_type)
            .map_err(|e| PersistenceError::Query(e.into()))?;
        let sets = self.insert_sets(&entity)?;
        let columns: Vec<String> = sets.iter().map(|(c, _)| quote_ident(c)).collect();
        let placeholders: Vec<&str> = sets.iter().map(|_| "?").collect();
        let statement = SqlStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&table.name),
                columns.join(", "),
                placeholders.join(", ")
            ),
            params: sets.into_iter().map(|(_, v)| v).collect(),
        };
        store.execute(&statement).await?;
        Ok(())
    }

    /// Update an entity by id. Affecting any number of rows other than one
    /// is an integrity fault.
    pub async fn update(
        &self,
        store: &dyn Store,
        entity: &Entity,
    ) -> Result<Vec<String>, PersistenceError> {
        let id = entity.id.clone().ok_or_else(|| {
            PersistenceError::IncompleteEntity {
                entity_type: entity.entity_type.clone(),
                missing: vec!["id".to_string()],
            }
        })?;
        let table = self
            .tables
            .table_for_type(&entity.entity_type)
            .map_err(|e| PersistenceError::Query(e.into()))?;
        let sets = self.update_sets(entity)?;
        if sets.values.is_empty() {
            return Ok(vec![]);
        }
        let assignments: Vec<String> = sets
            .values
            .iter()
            .map(|(c, _)| format!("{} = ?", quote_ident(c)))
            .collect();
        let mut params: Vec<SqlValue> = sets.values.into_iter().map(|(_, v)| v).collect();
        params.push(SqlValue::from(&id));
        let statement = SqlStatement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = ?",
                quote_ident(&table.name),
                assignments.join(", "),
                quote_ident(&table.id_column)
            ),
            params,
        };
        let affected = store.execute(&statement).await?;
        if affected != 1 {
            return Err(PersistenceError::Integrity { affected });
        }
        Ok(sets.changed_fields)
    }

    /// Fetch a single entity by id. Matching more than one row is an
    /// integrity fault, never silently resolved.
    pub async fn fetch_single(
        &self,
        store: &dyn Store,
        entity_type: &str,
        id: &Id,
    ) -> Result<Option<Entity>, PersistenceError> {
        let statement =
            QueryBuilder::for_type_and_id(self.registry, self.tables, self.settings, entity_type, id)
                .build_select()?;
        let rows = store.query_rows(&statement).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(self.entity_from_row(entity_type, &rows[0])?)),
            _ => Err(PersistenceError::DuplicateRow {
                entity_type: entity_type.to_string(),
            }),
        }
    }

    /// Fail unless the referenced entity exists.
    pub async fn ensure_exists(
        &self,
        store: &dyn Store,
        entity_type: &str,
        id: &Id,
    ) -> Result<(), PersistenceError> {
        match self.fetch_single(store, entity_type, id).await? {
            Some(_) => Ok(()),
            None => Err(PersistenceError::NoSuchEntity {
                entity_type: entity_type.to_string(),
                id: id.to_string(),
            }),
        }
    }

    /// Link two entities through a navigation property.
    ///
    /// For one-to-many relations the emitted update must affect exactly one
    /// row; anything else is an integrity fault. Ordered many-to-many links
    /// append at the end of the rank sequence; concurrent links for the
    /// same source require an external serialization scope.
    pub async fn link(
        &self,
        store: &dyn Store,
        source_type: &str,
        nav_name: &str,
        source_id: &Id,
        target_id: &Id,
    ) -> Result<(), PersistenceError> {
        let relation = self
            .tables
            .table_for_type(source_type)
            .and_then(|t| t.relation(nav_name))
            .map_err(|e| PersistenceError::Query(e.into()))?;
        let statement = relation.link(source_id, target_id)?;
        let affected = store.execute(&statement).await?;
        if matches!(relation, crate::sql::Relation::OneToMany { .. }) && affected != 1 {
            log::error!(
                "Linking {source_type}.{nav_name} affected {affected} rows instead of one"
            );
            return Err(PersistenceError::Integrity { affected });
        }
        Ok(())
    }

    /// Remove a link-table row for a many-to-many navigation.
    pub async fn unlink(
        &self,
        store: &dyn Store,
        source_type: &str,
        nav_name: &str,
        source_id: &Id,
        target_id: &Id,
    ) -> Result<(), PersistenceError> {
        let relation = self
            .tables
            .table_for_type(source_type)
            .and_then(|t| t.relation(nav_name))
            .map_err(|e| PersistenceError::Query(e.into()))?;
        let statement = relation.unlink(source_id, target_id)?;
        store.execute(&statement).await?;
        Ok(())
    }

    /// The completion pass: an entity that is incomplete but carries an id
    /// is reduced to an existence check of the referenced row; an entity
    /// whose to-one references name missing rows fails with `NoSuchEntity`.
    pub async fn validate_or_complete(
        &self,
        store: &dyn Store,
        entity: &Entity,
    ) -> Result<Entity, PersistenceError> {
        match self.check_complete(entity) {
            Ok(()) => {}
            Err(PersistenceError::IncompleteEntity { .. }) if entity.id.is_some() => {
                let id = entity.id.as_ref().ok_or_else(|| {
                    PersistenceError::IncompleteEntity {
                        entity_type: entity.entity_type.clone(),
                        missing: vec!["id".to_string()],
                    }
                })?;
                self.ensure_exists(store, &entity.entity_type, id).await?;
                return Ok(entity.clone());
            }
            Err(other) => return Err(other),
        }

        // Referenced to-one entities must exist before this entity links to
        // them.
        let entity_type = self
            .registry
            .entity_type(&entity.entity_type)
            .map_err(|e| PersistenceError::Query(e.into()))?;
        for nav in &entity_type.navigation {
            if nav.to_many {
                continue;
            }
            if let Some(value) = entity.property(&nav.name) {
                if let Some(id) = reference_id(value) {
                    if id.kind() != self.settings.id_kind {
                        return Err(PersistenceError::Query(
                            crate::sql::QueryError::IdTypeMismatch {
                                expected: self.settings.id_kind,
                                got: id.kind(),
                            },
                        ));
                    }
                    self.ensure_exists(store, &nav.target, &id).await?;
                }
            }
        }
        Ok(entity.clone())
    }

    fn check_complete(&self, entity: &Entity) -> Result<(), PersistenceError> {
        let entity_type = self
            .registry
            .entity_type(&entity.entity_type)
            .map_err(|e| PersistenceError::Query(e.into()))?;
        let missing = entity.missing_required(entity_type);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PersistenceError::IncompleteEntity {
                entity_type: entity.entity_type.clone(),
                missing,
            })
        }
    }

    fn value_sets(&self, entity: &Entity) -> Result<Vec<(String, SqlValue)>, PersistenceError> {
        let table = self
            .tables
            .table_for_type(&entity.entity_type)
            .map_err(|e| PersistenceError::Query(e.into()))?;
        let mut values = Vec::new();
        for (name, value) in &entity.properties {
            let entry = table.fields.entry(name).ok_or_else(|| {
                PersistenceError::Validation(crate::sql::ValidationError::Invalid {
                    property: name.clone(),
                    reason: "unknown property".to_string(),
                })
            })?;
            values.extend(entry.insert_values(value)?);
        }
        Ok(values)
    }
}

/// Extract the id out of a to-one reference value: either a bare id or an
/// object carrying `@iot.id`.
fn reference_id(value: &Value) -> Option<Id> {
    let raw = value.get("@iot.id").unwrap_or(value);
    match raw {
        Value::Number(n) => n.as_i64().map(Id::Long),
        Value::String(s) => uuid::Uuid::parse_str(s)
            .map(Id::Uuid)
            .ok()
            .or_else(|| Some(Id::Text(s.clone()))),
        _ => None,
    }
}
