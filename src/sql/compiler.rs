//! The narrow interface through which filter and order expressions reach
//! the join graph, plus the built-in compiler for the comparison/boolean
//! subset.
//!
//! Expression compilation may extend the join graph (a filter on
//! `Datastream/name` joins `Datastream` first); the [`JoinContext`] exposes
//! exactly that capability and nothing else.

use crate::model::ModelRegistry;
use crate::query::{Expression, Literal, OrderBy};
use crate::utils::quote_ident;

use super::errors::QueryError;
use super::query_state::QueryState;
use super::table_ref::{TableRef, TableRefId};
use super::tables::TableCollection;
use super::value::{SqlFragment, SqlValue};

/// The slice of builder state an expression compiler may touch.
pub struct JoinContext<'a> {
    registry: &'a ModelRegistry,
    tables: &'a TableCollection,
    pub state: &'a mut QueryState,
    refs: &'a mut Vec<TableRef>,
    main: TableRefId,
}

impl<'a> JoinContext<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        tables: &'a TableCollection,
        state: &'a mut QueryState,
        refs: &'a mut Vec<TableRef>,
        main: TableRefId,
    ) -> Self {
        JoinContext {
            registry,
            tables,
            state,
            refs,
            main,
        }
    }

    /// Walk a navigation path from the main table, creating or reusing
    /// joins, and return the reached table.
    pub fn resolve_navigation(&mut self, navs: &[String]) -> Result<TableRefId, QueryError> {
        let mut current = self.main;
        for nav_name in navs {
            let current_type = self.refs[current].entity_type.clone();
            let nav = self.registry.navigation(&current_type, nav_name)?;
            if let Some(existing) = self.refs[current].get_join(&nav.target) {
                current = existing;
                continue;
            }
            let relation = self
                .tables
                .table_for_type(&current_type)?
                .relation(nav_name)?
                .clone();
            let source_alias = self.refs[current].alias.clone();
            let joined = relation.join(&source_alias, self.state);
            let new_ref = TableRef::new(&joined.entity_type, &joined.table, &joined.alias);
            let new_id = self.refs.len();
            self.refs.push(new_ref);
            self.refs[current].add_join(&joined.entity_type, new_id);
            current = new_id;
        }
        Ok(current)
    }

    /// The qualified column backing a property of the referenced table.
    pub fn column_for(&self, ref_id: TableRefId, property: &str) -> Result<String, QueryError> {
        let table_ref = &self.refs[ref_id];
        let table = self.tables.table_for_type(&table_ref.entity_type)?;
        let entry = table.fields.entry(property).ok_or_else(|| {
            QueryError::Model(crate::model::ModelError::UnknownProperty {
                entity_type: table_ref.entity_type.clone(),
                property: property.to_string(),
            })
        })?;
        let column = entry.converter.columns()[0];
        Ok(format!("{}.{}", table_ref.alias, quote_ident(column)))
    }

    /// Resolve a property path (`["Datastream", "name"]`) into a qualified
    /// column, joining intermediate navigations as needed.
    pub fn resolve_property(&mut self, path: &[String]) -> Result<String, QueryError> {
        let (property, navs) = path.split_last().ok_or(QueryError::UnsupportedExpression {
            reason: "empty property path".to_string(),
        })?;
        let ref_id = self.resolve_navigation(navs)?;
        self.column_for(ref_id, property)
    }
}

/// Compiles filter and order expressions into SQL fragments, possibly
/// extending the join graph. Richer expression languages plug in here.
pub trait ExpressionCompiler {
    fn compile_filter(
        &self,
        expr: &Expression,
        ctx: &mut JoinContext<'_>,
    ) -> Result<SqlFragment, QueryError>;

    fn compile_order(
        &self,
        term: &OrderBy,
        ctx: &mut JoinContext<'_>,
    ) -> Result<SqlFragment, QueryError>;
}

/// The built-in compiler: property paths, literals, comparisons, boolean
/// connectives, null tests.
pub struct DefaultExpressionCompiler;

/// Shared instance for builders constructed without an explicit compiler.
pub static DEFAULT_COMPILER: DefaultExpressionCompiler = DefaultExpressionCompiler;

impl ExpressionCompiler for DefaultExpressionCompiler {
    fn compile_filter(
        &self,
        expr: &Expression,
        ctx: &mut JoinContext<'_>,
    ) -> Result<SqlFragment, QueryError> {
        compile_expr(expr, ctx)
    }

    fn compile_order(
        &self,
        term: &OrderBy,
        ctx: &mut JoinContext<'_>,
    ) -> Result<SqlFragment, QueryError> {
        match &term.expr {
            Expression::Property(path) => Ok(SqlFragment::new(ctx.resolve_property(path)?)),
            other => Err(QueryError::UnsupportedExpression {
                reason: format!("cannot order by {other:?}"),
            }),
        }
    }
}

fn compile_expr(
    expr: &Expression,
    ctx: &mut JoinContext<'_>,
) -> Result<SqlFragment, QueryError> {
    match expr {
        Expression::Property(path) => Ok(SqlFragment::new(ctx.resolve_property(path)?)),
        Expression::Literal(literal) => Ok(compile_literal(literal)),
        Expression::Compare { op, left, right } => {
            // `eq null` / `ne null` become null tests; other operators have
            // no meaning against null.
            if let Expression::Literal(Literal::Null) = right.as_ref() {
                let operand = compile_expr(left, ctx)?;
                let test = match op {
                    crate::query::CompareOp::Eq => "IS NULL",
                    crate::query::CompareOp::Ne => "IS NOT NULL",
                    _ => {
                        return Err(QueryError::UnsupportedExpression {
                            reason: "ordering comparison against null".to_string(),
                        })
                    }
                };
                let mut fragment = operand;
                fragment.push(" ");
                fragment.push(test);
                return Ok(fragment);
            }
            let mut fragment = SqlFragment::new("");
            fragment.append(compile_expr(left, ctx)?);
            fragment.push(" ");
            fragment.push(op.sql());
            fragment.push(" ");
            fragment.append(compile_expr(right, ctx)?);
            Ok(fragment)
        }
        Expression::And(left, right) => {
            Ok(binary(compile_expr(left, ctx)?, "AND", compile_expr(right, ctx)?))
        }
        Expression::Or(left, right) => {
            Ok(binary(compile_expr(left, ctx)?, "OR", compile_expr(right, ctx)?))
        }
        Expression::Not(inner) => {
            let mut fragment = SqlFragment::new("(NOT ");
            fragment.append(compile_expr(inner, ctx)?);
            fragment.push(")");
            Ok(fragment)
        }
    }
}

fn binary(left: SqlFragment, op: &str, right: SqlFragment) -> SqlFragment {
    let mut fragment = SqlFragment::new("(");
    fragment.append(left);
    fragment.push(") ");
    fragment.push(op);
    fragment.push(" (");
    fragment.append(right);
    fragment.push(")");
    fragment
}

fn compile_literal(literal: &Literal) -> SqlFragment {
    match literal {
        Literal::Null => SqlFragment::new("NULL"),
        Literal::Bool(b) => SqlFragment::bind(SqlValue::Bool(*b)),
        Literal::Long(v) => SqlFragment::bind(SqlValue::Long(*v)),
        Literal::Double(v) => SqlFragment::bind(SqlValue::Double(*v)),
        Literal::Text(s) => SqlFragment::bind(SqlValue::Text(s.clone())),
    }
}
