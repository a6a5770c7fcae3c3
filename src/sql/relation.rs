//! Table-to-table relations.
//!
//! Every navigation property is backed by exactly one [`Relation`], a closed
//! enum over the three storage shapes. A relation knows how to (a) extend a
//! join graph from an aliased source table to its target and (b) emit the
//! statements that create or remove a link.

use crate::model::Id;
use crate::query::OrderType;
use crate::utils::quote_ident;

use super::errors::QueryError;
use super::query_state::{JoinClause, QueryState};
use super::value::{SqlFragment, SqlStatement, SqlValue};

/// The target table and alias produced by extending the join graph.
#[derive(Debug, Clone)]
pub struct JoinedTarget {
    pub entity_type: String,
    pub table: String,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub enum Relation {
    /// Join predicate `target.target_column = source.source_column`.
    ///
    /// `distinct_required` is true only when the relation is traversed as a
    /// to-many set; traversal toward the single owning entity never
    /// duplicates rows.
    OneToMany {
        name: String,
        target_type: String,
        target_table: String,
        target_id_column: String,
        source_column: String,
        target_column: String,
        distinct_required: bool,
    },
    /// Join predicate chained through a link table:
    /// `source.key = link.source_fk` and `link.target_fk = target.key`.
    ManyToMany {
        name: String,
        target_type: String,
        target_table: String,
        source_id_column: String,
        target_id_column: String,
        link_table: String,
        source_link_column: String,
        target_link_column: String,
    },
    /// As `ManyToMany`, plus a rank column in the link table. Rank ordering
    /// and distinct output are mutually exclusive within one join.
    ManyToManyOrdered {
        name: String,
        target_type: String,
        target_table: String,
        source_id_column: String,
        target_id_column: String,
        link_table: String,
        source_link_column: String,
        target_link_column: String,
        rank_column: String,
        always_distinct: bool,
    },
}

impl Relation {
    /// The relation name; equal to the navigation property it backs.
    pub fn name(&self) -> &str {
        match self {
            Relation::OneToMany { name, .. }
            | Relation::ManyToMany { name, .. }
            | Relation::ManyToManyOrdered { name, .. } => name,
        }
    }

    pub fn target_type(&self) -> &str {
        match self {
            Relation::OneToMany { target_type, .. }
            | Relation::ManyToMany { target_type, .. }
            | Relation::ManyToManyOrdered { target_type, .. } => target_type,
        }
    }

    /// Extend the join graph from the aliased source table, returning the
    /// new target alias.
    pub fn join(&self, source_alias: &str, state: &mut QueryState) -> JoinedTarget {
        match self {
            Relation::OneToMany {
                target_type,
                target_table,
                source_column,
                target_column,
                distinct_required,
                ..
            } => {
                let target_alias = state.next_alias();
                state.add_join(JoinClause {
                    table: target_table.clone(),
                    alias: target_alias.clone(),
                    on: SqlFragment::new(format!(
                        "{target_alias}.{} = {source_alias}.{}",
                        quote_ident(target_column),
                        quote_ident(source_column)
                    )),
                });
                if *distinct_required {
                    state.set_distinct_required(true);
                }
                JoinedTarget {
                    entity_type: target_type.clone(),
                    table: target_table.clone(),
                    alias: target_alias,
                }
            }
            Relation::ManyToMany {
                target_type,
                target_table,
                source_id_column,
                target_id_column,
                link_table,
                source_link_column,
                target_link_column,
                ..
            } => {
                let target_alias = state.next_alias();
                let link_alias = state.next_alias();
                join_through_link(
                    state,
                    source_alias,
                    source_id_column,
                    link_table,
                    &link_alias,
                    source_link_column,
                    target_link_column,
                    target_table,
                    &target_alias,
                    target_id_column,
                );
                state.set_distinct_required(true);
                JoinedTarget {
                    entity_type: target_type.clone(),
                    table: target_table.clone(),
                    alias: target_alias,
                }
            }
            Relation::ManyToManyOrdered {
                target_type,
                target_table,
                source_id_column,
                target_id_column,
                link_table,
                source_link_column,
                target_link_column,
                rank_column,
                always_distinct,
                ..
            } => {
                let target_alias = state.next_alias();
                let link_alias = state.next_alias();
                join_through_link(
                    state,
                    source_alias,
                    source_id_column,
                    link_table,
                    &link_alias,
                    source_link_column,
                    target_link_column,
                    target_table,
                    &target_alias,
                    target_id_column,
                );
                if *always_distinct || state.is_filter_applied() {
                    state.set_distinct_required(true);
                } else {
                    state.sort_fields_mut().add(
                        SqlFragment::new(format!(
                            "{link_alias}.{}",
                            quote_ident(rank_column)
                        )),
                        OrderType::Ascending,
                    );
                }
                JoinedTarget {
                    entity_type: target_type.clone(),
                    table: target_table.clone(),
                    alias: target_alias,
                }
            }
        }
    }

    /// The statement that links `target_id` to `source_id`.
    ///
    /// For `OneToMany` this re-points the target row's foreign key; the
    /// statement must affect exactly one row, which the caller verifies.
    /// For `ManyToManyOrdered` the new link is appended last: its rank is
    /// the current link count for the source. The count and the insert are
    /// one statement, but concurrent links for the same source still need an
    /// external serialization scope to avoid duplicate ranks.
    pub fn link(&self, source_id: &Id, target_id: &Id) -> Result<SqlStatement, QueryError> {
        match self {
            Relation::OneToMany {
                name,
                target_table,
                target_id_column,
                target_column,
                distinct_required,
                ..
            } => {
                if !*distinct_required {
                    // Only the owning (to-many) side may re-point the key.
                    return Err(QueryError::WrongRelationSide {
                        relation: name.clone(),
                    });
                }
                Ok(SqlStatement {
                    sql: format!(
                        "UPDATE {} SET {} = ? WHERE {} = ?",
                        quote_ident(target_table),
                        quote_ident(target_column),
                        quote_ident(target_id_column)
                    ),
                    params: vec![SqlValue::from(source_id), SqlValue::from(target_id)],
                })
            }
            Relation::ManyToMany {
                link_table,
                source_link_column,
                target_link_column,
                ..
            } => Ok(SqlStatement {
                sql: format!(
                    "INSERT INTO {} ({}, {}) VALUES (?, ?)",
                    quote_ident(link_table),
                    quote_ident(source_link_column),
                    quote_ident(target_link_column)
                ),
                params: vec![SqlValue::from(source_id), SqlValue::from(target_id)],
            }),
            Relation::ManyToManyOrdered {
                link_table,
                source_link_column,
                target_link_column,
                rank_column,
                ..
            } => Ok(SqlStatement {
                sql: format!(
                    "INSERT INTO {table} ({src}, {tgt}, {rank}) \
                     SELECT ?, ?, COUNT(*) FROM {table} WHERE {src} = ?",
                    table = quote_ident(link_table),
                    src = quote_ident(source_link_column),
                    tgt = quote_ident(target_link_column),
                    rank = quote_ident(rank_column)
                ),
                params: vec![
                    SqlValue::from(source_id),
                    SqlValue::from(target_id),
                    SqlValue::from(source_id),
                ],
            }),
        }
    }

    /// The statement that removes a link-table row. One-to-many relations
    /// have no link row to remove.
    pub fn unlink(&self, source_id: &Id, target_id: &Id) -> Result<SqlStatement, QueryError> {
        match self {
            Relation::OneToMany { name, .. } => Err(QueryError::WrongRelationSide {
                relation: name.clone(),
            }),
            Relation::ManyToMany {
                link_table,
                source_link_column,
                target_link_column,
                ..
            }
            | Relation::ManyToManyOrdered {
                link_table,
                source_link_column,
                target_link_column,
                ..
            } => Ok(SqlStatement {
                sql: format!(
                    "DELETE FROM {} WHERE {} = ? AND {} = ?",
                    quote_ident(link_table),
                    quote_ident(source_link_column),
                    quote_ident(target_link_column)
                ),
                params: vec![SqlValue::from(source_id), SqlValue::from(target_id)],
            }),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn join_through_link(
    state: &mut QueryState,
    source_alias: &str,
    source_id_column: &str,
    link_table: &str,
    link_alias: &str,
    source_link_column: &str,
    target_link_column: &str,
    target_table: &str,
    target_alias: &str,
    target_id_column: &str,
) {
    state.add_join(JoinClause {
        table: link_table.to_string(),
        alias: link_alias.to_string(),
        on: SqlFragment::new(format!(
            "{link_alias}.{} = {source_alias}.{}",
            quote_ident(source_link_column),
            quote_ident(source_id_column)
        )),
    });
    state.add_join(JoinClause {
        table: target_table.to_string(),
        alias: target_alias.to_string(),
        on: SqlFragment::new(format!(
            "{target_alias}.{} = {link_alias}.{}",
            quote_ident(target_id_column),
            quote_ident(target_link_column)
        )),
    });
}
