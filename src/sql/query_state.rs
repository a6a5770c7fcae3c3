//! The per-translation accumulator.
//!
//! One [`QueryState`] is created when the root table is resolved, mutated in
//! place while the path and query are walked, and discarded after the
//! statement is emitted. It is never shared across requests.

use crate::query::OrderType;
use crate::utils::quote_ident;

use super::value::SqlFragment;

/// Prefix for generated table aliases; the root table is always `e0`.
pub const ALIAS_PREFIX: &str = "e";
pub const ROOT_ALIAS: &str = "e0";

/// One selected output column: the qualified source expression and the
/// output alias rows are keyed by.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub qualified: String,
    pub alias: String,
}

/// One aliased inner join.
#[derive(Debug, Clone)]
pub struct JoinClause {
    pub table: String,
    pub alias: String,
    pub on: SqlFragment,
}

#[derive(Debug, Clone)]
pub struct SortField {
    pub expr: SqlFragment,
    pub order: OrderType,
}

/// The accumulated `ORDER BY` field list, in application order.
#[derive(Debug, Clone, Default)]
pub struct SortFields(Vec<SortField>);

impl SortFields {
    pub fn add(&mut self, expr: SqlFragment, order: OrderType) {
        self.0.push(SortField { expr, order });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SortField> {
        self.0.iter()
    }
}

#[derive(Debug, Clone)]
pub struct QueryState {
    from_table: String,
    select_columns: Vec<SelectColumn>,
    main_id_column: String,
    joins: Vec<JoinClause>,
    where_clause: SqlFragment,
    sort_fields: SortFields,
    distinct_required: bool,
    filter_applied: bool,
    alias_counter: usize,
}

impl QueryState {
    /// Seed the state with the root table. `select_columns` is the column
    /// set derived from the field registry for the current select-set.
    pub fn new(from_table: &str, select_columns: Vec<SelectColumn>, id_column: &str) -> Self {
        QueryState {
            from_table: from_table.to_string(),
            select_columns,
            main_id_column: format!("{ROOT_ALIAS}.{}", quote_ident(id_column)),
            joins: Vec::new(),
            where_clause: SqlFragment::default(),
            sort_fields: SortFields::default(),
            distinct_required: false,
            filter_applied: false,
            alias_counter: 0,
        }
    }

    /// The next table alias; monotonically increasing, never reused within
    /// one translation.
    pub fn next_alias(&mut self) -> String {
        self.alias_counter += 1;
        format!("{ALIAS_PREFIX}{}", self.alias_counter)
    }

    pub fn add_join(&mut self, join: JoinClause) {
        self.joins.push(join);
    }

    /// AND a predicate onto the accumulated `WHERE`.
    pub fn add_where(&mut self, predicate: SqlFragment) {
        self.where_clause = std::mem::take(&mut self.where_clause).and(predicate);
    }

    pub fn sort_fields_mut(&mut self) -> &mut SortFields {
        &mut self.sort_fields
    }

    pub fn sort_fields(&self) -> &SortFields {
        &self.sort_fields
    }

    pub fn set_distinct_required(&mut self, distinct: bool) {
        self.distinct_required = distinct;
    }

    pub fn is_distinct_required(&self) -> bool {
        self.distinct_required
    }

    pub fn set_filter_applied(&mut self, applied: bool) {
        self.filter_applied = applied;
    }

    pub fn is_filter_applied(&self) -> bool {
        self.filter_applied
    }

    pub fn select_columns(&self) -> &[SelectColumn] {
        &self.select_columns
    }

    /// The qualified root identifier column, e.g. `e0."ID"`.
    pub fn main_id_column(&self) -> &str {
        &self.main_id_column
    }

    /// Render `FROM root AS e0` plus all accumulated joins.
    pub fn render_from(&self) -> SqlFragment {
        let mut from = SqlFragment::new(format!(
            "FROM {} AS {ROOT_ALIAS}\n",
            quote_ident(&self.from_table)
        ));
        for join in &self.joins {
            from.push(&format!(
                "INNER JOIN {} AS {} ON ",
                quote_ident(&join.table),
                join.alias
            ));
            from.append(join.on.clone());
            from.push("\n");
        }
        from
    }

    /// Render the accumulated `WHERE`, empty when no predicate was added.
    pub fn render_where(&self) -> SqlFragment {
        if self.where_clause.is_empty() {
            SqlFragment::default()
        } else {
            let mut clause = SqlFragment::new("WHERE ");
            clause.append(self.where_clause.clone());
            clause.push("\n");
            clause
        }
    }

    /// Render the accumulated `ORDER BY`, empty when no field was added.
    pub fn render_order_by(&self) -> SqlFragment {
        if self.sort_fields.is_empty() {
            return SqlFragment::default();
        }
        let mut clause = SqlFragment::new("ORDER BY ");
        let mut first = true;
        for field in self.sort_fields.iter() {
            if !first {
                clause.push(", ");
            }
            first = false;
            clause.append(field.expr.clone());
            clause.push(" ");
            clause.push(field.order.sql());
        }
        clause.push("\n");
        clause
    }
}
