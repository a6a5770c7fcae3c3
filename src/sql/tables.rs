//! The per-type table metadata consumed by the builder: backing table,
//! field registry and registered relations.
//!
//! Built once from the model registry at startup, immutable afterwards.

use std::collections::HashMap;

use crate::model::types::RelationDef;
use crate::model::{ModelError, ModelRegistry};

use super::field_registry::PropertyFieldRegistry;
use super::relation::Relation;

/// One entity type's storage-side metadata.
#[derive(Debug, Clone)]
pub struct EntityTable {
    pub entity_type: String,
    pub name: String,
    pub id_column: String,
    pub fields: PropertyFieldRegistry,
    relations: HashMap<String, Relation>,
}

impl EntityTable {
    /// The relation backing a navigation property of this type.
    pub fn relation(&self, nav_name: &str) -> Result<&Relation, ModelError> {
        self.relations
            .get(nav_name)
            .ok_or_else(|| ModelError::UnknownNavigation {
                entity_type: self.entity_type.clone(),
                navigation: nav_name.to_string(),
            })
    }
}

/// All entity tables, keyed by entity type name.
#[derive(Debug, Clone)]
pub struct TableCollection {
    tables: HashMap<String, EntityTable>,
}

impl TableCollection {
    pub fn build(registry: &ModelRegistry) -> Result<Self, ModelError> {
        let mut tables = HashMap::new();
        let type_names: Vec<String> = registry.type_names().cloned().collect();
        for type_name in type_names {
            let entity_type = registry.entity_type(&type_name)?;
            let mut relations = HashMap::new();
            for nav in &entity_type.navigation {
                let target = registry.entity_type(&nav.target)?;
                let relation = match &nav.relation {
                    RelationDef::OneToMany {
                        source_column,
                        target_column,
                    } => Relation::OneToMany {
                        name: nav.name.clone(),
                        target_type: target.name.clone(),
                        target_table: target.table.clone(),
                        target_id_column: target.id_column.clone(),
                        source_column: source_column.clone(),
                        target_column: target_column.clone(),
                        distinct_required: nav.to_many,
                    },
                    RelationDef::ManyToMany {
                        link_table,
                        source_link_column,
                        target_link_column,
                    } => Relation::ManyToMany {
                        name: nav.name.clone(),
                        target_type: target.name.clone(),
                        target_table: target.table.clone(),
                        source_id_column: entity_type.id_column.clone(),
                        target_id_column: target.id_column.clone(),
                        link_table: link_table.clone(),
                        source_link_column: source_link_column.clone(),
                        target_link_column: target_link_column.clone(),
                    },
                    RelationDef::ManyToManyOrdered {
                        link_table,
                        source_link_column,
                        target_link_column,
                        rank_column,
                        always_distinct,
                    } => Relation::ManyToManyOrdered {
                        name: nav.name.clone(),
                        target_type: target.name.clone(),
                        target_table: target.table.clone(),
                        source_id_column: entity_type.id_column.clone(),
                        target_id_column: target.id_column.clone(),
                        link_table: link_table.clone(),
                        source_link_column: source_link_column.clone(),
                        target_link_column: target_link_column.clone(),
                        rank_column: rank_column.clone(),
                        always_distinct: *always_distinct,
                    },
                };
                relations.insert(nav.name.clone(), relation);
            }
            tables.insert(
                type_name.clone(),
                EntityTable {
                    entity_type: type_name.clone(),
                    name: entity_type.table.clone(),
                    id_column: entity_type.id_column.clone(),
                    fields: PropertyFieldRegistry::build(entity_type),
                    relations,
                },
            );
        }
        Ok(TableCollection { tables })
    }

    pub fn table_for_type(&self, entity_type: &str) -> Result<&EntityTable, ModelError> {
        self.tables
            .get(entity_type)
            .ok_or_else(|| ModelError::UnknownEntityType {
                name: entity_type.to_string(),
            })
    }
}
