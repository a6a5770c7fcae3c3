//! Join-graph nodes.
//!
//! A [`TableRef`] is one aliased occurrence of an entity type in the join
//! graph, with a cache of the joins already created from it, keyed by target
//! entity type. The cache guarantees at most one join per (source alias,
//! target type) pair during a single walk; clearing it separates the path
//! walk from filter/orderby traversal, which must never merge joins with it.

use std::collections::HashMap;

/// Index of a [`TableRef`] in the builder's arena.
pub type TableRefId = usize;

#[derive(Debug, Clone)]
pub struct TableRef {
    pub entity_type: String,
    pub table: String,
    pub alias: String,
    joins: HashMap<String, TableRefId>,
}

impl TableRef {
    pub fn new(entity_type: &str, table: &str, alias: &str) -> Self {
        TableRef {
            entity_type: entity_type.to_string(),
            table: table.to_string(),
            alias: alias.to_string(),
            joins: HashMap::new(),
        }
    }

    pub fn get_join(&self, entity_type: &str) -> Option<TableRefId> {
        self.joins.get(entity_type).copied()
    }

    pub fn add_join(&mut self, entity_type: &str, target: TableRefId) {
        self.joins.insert(entity_type.to_string(), target);
    }

    pub fn clear_joins(&mut self) {
        self.joins.clear();
    }
}
