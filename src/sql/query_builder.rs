//! Builds one statement for a resource path and query. Not reusable: the
//! build methods consume the builder, so a second configuration or build is
//! a compile error.
//!
//! The path is walked from the innermost element outwards, so the root
//! table of the statement is the entity type the path addresses; joins back
//! toward the path origin are created through the inverse navigation of
//! each traversed element.

use std::collections::HashSet;

use crate::config::PersistenceSettings;
use crate::model::{Id, ModelRegistry};
use crate::query::{OrderType, Query};
use crate::resource_path::{PathElement, ResourcePath};
use crate::utils::quote_ident;

use super::compiler::{ExpressionCompiler, JoinContext, DEFAULT_COMPILER};
use super::errors::QueryError;
use super::query_state::{QueryState, SelectColumn, ROOT_ALIAS};
use super::table_ref::{TableRef, TableRefId};
use super::tables::TableCollection;
use super::value::{SqlFragment, SqlStatement, SqlValue};

#[derive(Clone, Copy)]
enum Target<'a> {
    Path(&'a ResourcePath),
    TypeAndId { entity_type: &'a str, id: &'a Id },
}

pub struct QueryBuilder<'a> {
    registry: &'a ModelRegistry,
    tables: &'a TableCollection,
    settings: &'a PersistenceSettings,
    compiler: &'a dyn ExpressionCompiler,
    query: Option<&'a Query>,
    target: Target<'a>,
    for_update: bool,
}

/// Walk state while resolving path elements into the join graph.
struct Walk {
    state: Option<QueryState>,
    refs: Vec<TableRef>,
    main: Option<TableRefId>,
    last: Option<TableRefId>,
    last_nav: Option<String>,
    selected: HashSet<String>,
    filter_present: bool,
}

/// Everything gathered once the path and query are fully applied.
struct Prepared<'a> {
    state: QueryState,
    refs: Vec<TableRef>,
    main: TableRefId,
    single: bool,
    query: Option<&'a Query>,
    settings: &'a PersistenceSettings,
    for_update: bool,
}

impl<'a> QueryBuilder<'a> {
    pub fn for_path(
        registry: &'a ModelRegistry,
        tables: &'a TableCollection,
        settings: &'a PersistenceSettings,
        path: &'a ResourcePath,
    ) -> Self {
        QueryBuilder {
            registry,
            tables,
            settings,
            compiler: &DEFAULT_COMPILER,
            query: None,
            target: Target::Path(path),
            for_update: false,
        }
    }

    pub fn for_type_and_id(
        registry: &'a ModelRegistry,
        tables: &'a TableCollection,
        settings: &'a PersistenceSettings,
        entity_type: &'a str,
        id: &'a Id,
    ) -> Self {
        QueryBuilder {
            registry,
            tables,
            settings,
            compiler: &DEFAULT_COMPILER,
            query: None,
            target: Target::TypeAndId { entity_type, id },
            for_update: false,
        }
    }

    pub fn using_query(mut self, query: &'a Query) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_compiler(mut self, compiler: &'a dyn ExpressionCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn for_update(mut self, for_update: bool) -> Self {
        self.for_update = for_update;
        self
    }

    /// Emit the select statement.
    pub fn build_select(self) -> Result<SqlStatement, QueryError> {
        let mut prepared = self.gather()?;

        let select_distinct = prepared
            .query
            .map(|q| q.select_distinct)
            .unwrap_or(false);
        let distinct = select_distinct || prepared.state.is_distinct_required();

        // Distinct output still needs a deterministic order; fall back to
        // the root id when the deployment does not already append it.
        if !select_distinct
            && prepared.state.is_distinct_required()
            && !prepared.settings.always_orderby_id
            && !prepared.state.sort_fields().is_empty()
        {
            let id_field = SqlFragment::new(prepared.state.main_id_column().to_string());
            prepared
                .state
                .sort_fields_mut()
                .add(id_field, OrderType::Ascending);
        }

        let mut stmt = SqlFragment::new(if distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        });
        for (i, column) in prepared.state.select_columns().iter().enumerate() {
            if i > 0 {
                stmt.push(", ");
            }
            stmt.push(&format!(
                "{} AS {}",
                column.qualified,
                quote_ident(&column.alias)
            ));
        }
        stmt.push("\n");
        stmt.append(prepared.state.render_from());
        stmt.append(prepared.state.render_where());
        stmt.append(prepared.state.render_order_by());

        if prepared.single {
            // Two rows are enough to notice that a supposedly-unique key
            // matched more than one row.
            stmt.push("LIMIT 2\n");
        } else {
            let (top, skip) = match prepared.query {
                Some(query) => (
                    query.top_or_default(prepared.settings),
                    query.skip_or_zero(),
                ),
                None => (prepared.settings.default_top, 0),
            };
            // One extra row lets the caller detect that more results exist.
            let limit = top + 1;
            if skip > 0 {
                stmt.push(&format!("LIMIT {limit} OFFSET {skip}\n"));
            } else {
                stmt.push(&format!("LIMIT {limit}\n"));
            }
        }
        if prepared.for_update {
            stmt.push("FOR UPDATE\n");
        }

        log::trace!("Generated SQL:\n{}", stmt.sql);
        Ok(stmt.into())
    }

    /// Emit the count statement for the same path and filter.
    pub fn build_count(self) -> Result<SqlStatement, QueryError> {
        let prepared = self.gather()?;

        let select_distinct = prepared
            .query
            .map(|q| q.select_distinct)
            .unwrap_or(false);
        let count_expr = if select_distinct {
            let columns: Vec<String> = prepared
                .state
                .select_columns()
                .iter()
                .map(|c| c.qualified.clone())
                .collect();
            format!("COUNT(DISTINCT {})", columns.join(", "))
        } else if prepared.state.is_distinct_required() {
            format!("COUNT(DISTINCT {})", prepared.state.main_id_column())
        } else {
            format!("COUNT({})", prepared.state.main_id_column())
        };

        let mut stmt = SqlFragment::new(format!("SELECT {count_expr}\n"));
        stmt.append(prepared.state.render_from());
        stmt.append(prepared.state.render_where());

        log::trace!("Generated SQL:\n{}", stmt.sql);
        Ok(stmt.into())
    }

    /// Emit the delete statement: delete from the root table where its
    /// identifier is in the id-subselect of the full where clause.
    pub fn build_delete(self) -> Result<SqlStatement, QueryError> {
        let prepared = self.gather()?;

        let root_type = prepared.refs[prepared.main].entity_type.clone();
        // Metadata must exist for every deletable type; a miss here is an
        // operator fault, not a user error.
        let table = self.tables.table_for_type(&root_type).map_err(|_| {
            QueryError::UnmappedDeleteType {
                entity_type: root_type.clone(),
            }
        })?;

        let mut sub = SqlFragment::new(format!(
            "SELECT {}\n",
            prepared.state.main_id_column()
        ));
        sub.append(prepared.state.render_from());
        sub.append(prepared.state.render_where());

        let mut stmt = SqlFragment::new(format!(
            "DELETE FROM {} WHERE {} IN (\n",
            quote_ident(&table.name),
            quote_ident(&table.id_column)
        ));
        stmt.append(sub);
        stmt.push(")");

        log::trace!("Generated SQL:\n{}", stmt.sql);
        Ok(stmt.into())
    }

    fn gather(&self) -> Result<Prepared<'a>, QueryError> {
        let mut selected: HashSet<String> = HashSet::new();
        if let Some(query) = self.query {
            selected.extend(query.select.iter().cloned());
            if !query.expand.is_empty() && !selected.is_empty() {
                // With both $select and $expand, the id and the expanded
                // navigation links must always be loaded so sub-entities can
                // be linked back.
                selected.insert("id".to_string());
                for expand in &query.expand {
                    if let Some(first) = expand.path.first() {
                        selected.insert(first.clone());
                    }
                }
            }
        }

        let mut walk = Walk {
            state: None,
            refs: Vec::new(),
            main: None,
            last: None,
            last_nav: None,
            selected,
            filter_present: self
                .query
                .map(|q| q.filter.is_some())
                .unwrap_or(false),
        };

        let mut single = false;
        match self.target {
            Target::Path(path) => {
                if path.is_empty() {
                    return Err(QueryError::EmptyPath);
                }
                single = path.is_single_entity();
                // Innermost element first: the path's addressed type
                // becomes the root table.
                for element in path.elements.iter().rev() {
                    match element {
                        PathElement::Entity {
                            entity_type,
                            id,
                            nav,
                        } => {
                            self.visit_entity(&mut walk, entity_type, id.as_ref())?;
                            walk.last_nav = nav.clone();
                        }
                        PathElement::EntitySet { entity_type, nav } => {
                            self.visit_entity(&mut walk, entity_type, None)?;
                            walk.last_nav = nav.clone();
                        }
                        PathElement::Property { name } => {
                            walk.selected.insert(name.clone());
                            walk.selected.insert("id".to_string());
                        }
                        PathElement::CustomProperty { .. } | PathElement::ArrayIndex { .. } => {}
                    }
                }
            }
            Target::TypeAndId { entity_type, id } => {
                self.visit_entity(&mut walk, entity_type, Some(id))?;
                single = true;
            }
        }

        let main = walk.main.ok_or(QueryError::EmptyPath)?;
        let mut state = walk.state.ok_or(QueryError::EmptyPath)?;
        let mut refs = walk.refs;

        // Joins created while generating the path must not be merged with
        // joins generated for the filter or orderby.
        refs[main].clear_joins();

        if let Some(query) = self.query {
            if let Some(filter) = &query.filter {
                let mut ctx =
                    JoinContext::new(self.registry, self.tables, &mut state, &mut refs, main);
                let predicate = self.compiler.compile_filter(filter, &mut ctx)?;
                state.add_where(predicate);
            }
            for term in &query.order_by {
                let mut ctx =
                    JoinContext::new(self.registry, self.tables, &mut state, &mut refs, main);
                let field = self.compiler.compile_order(term, &mut ctx)?;
                state.sort_fields_mut().add(field, term.order);
            }
        }
        if self.settings.always_orderby_id {
            // Deterministic tie-break after all user-specified terms.
            let id_field = SqlFragment::new(state.main_id_column().to_string());
            state.sort_fields_mut().add(id_field, OrderType::Ascending);
        }

        Ok(Prepared {
            state,
            refs,
            main,
            single,
            query: self.query,
            settings: self.settings,
            for_update: self.for_update,
        })
    }

    /// Resolve one entity/set element against the join graph: reuse an
    /// existing join to the same type, or extend the graph through the
    /// relation of the navigation that led here.
    fn visit_entity(
        &self,
        walk: &mut Walk,
        entity_type: &str,
        id: Option<&Id>,
    ) -> Result<(), QueryError> {
        let existing = walk
            .last
            .and_then(|last| walk.refs[last].get_join(entity_type));

        let result = match existing {
            Some(found) => found,
            None => match walk.last {
                None => {
                    let table = self.tables.table_for_type(entity_type)?;
                    let mut columns = table.fields.select_columns(ROOT_ALIAS, &walk.selected);
                    if columns.is_empty() {
                        columns.push(SelectColumn {
                            qualified: format!(
                                "{ROOT_ALIAS}.{}",
                                quote_ident(&table.id_column)
                            ),
                            alias: table.id_column.clone(),
                        });
                    }
                    let mut state = QueryState::new(&table.name, columns, &table.id_column);
                    if walk.filter_present {
                        // Decided before any ordered relation joins: rank
                        // ordering and filters exclude each other.
                        state.set_filter_applied(true);
                    }
                    walk.state = Some(state);
                    walk.refs
                        .push(TableRef::new(entity_type, &table.name, ROOT_ALIAS));
                    walk.refs.len() - 1
                }
                Some(last) => {
                    if walk.refs[last].entity_type == entity_type && walk.last_nav.is_none() {
                        last
                    } else {
                        let nav_name = walk.last_nav.clone().ok_or_else(|| {
                            QueryError::MissingNavigation {
                                entity_type: entity_type.to_string(),
                            }
                        })?;
                        // The navigation that led to the previous element is
                        // declared on this element's type; its inverse names
                        // the relation on the previous element's table.
                        let nav = self.registry.navigation(entity_type, &nav_name)?;
                        let inverse = nav.inverse.clone();
                        let last_type = walk.refs[last].entity_type.clone();
                        let relation = self
                            .tables
                            .table_for_type(&last_type)?
                            .relation(&inverse)?
                            .clone();
                        let source_alias = walk.refs[last].alias.clone();
                        let state = walk.state.as_mut().ok_or(QueryError::EmptyPath)?;
                        let joined = relation.join(&source_alias, state);
                        walk.refs.push(TableRef::new(
                            &joined.entity_type,
                            &joined.table,
                            &joined.alias,
                        ));
                        let new_id = walk.refs.len() - 1;
                        walk.refs[last].add_join(&joined.entity_type, new_id);
                        new_id
                    }
                }
            },
        };

        if let Some(id) = id {
            if id.kind() != self.settings.id_kind {
                return Err(QueryError::IdTypeMismatch {
                    expected: self.settings.id_kind,
                    got: id.kind(),
                });
            }
            let table = self
                .tables
                .table_for_type(&walk.refs[result].entity_type)?;
            let alias = walk.refs[result].alias.clone();
            let state = walk.state.as_mut().ok_or(QueryError::EmptyPath)?;
            state.add_where(SqlFragment::with_params(
                format!("{alias}.{} = ?", quote_ident(&table.id_column)),
                vec![SqlValue::from(id)],
            ));
        }

        if walk.main.is_none() {
            walk.main = Some(result);
        }
        walk.last = Some(result);
        Ok(())
    }
}
