//! The resource-path-to-SQL translation engine: join-graph construction,
//! relation handling, property field mapping and statement emission.

pub mod compiler;
pub mod errors;
pub mod field_registry;
pub mod query_builder;
pub mod query_state;
pub mod relation;
pub mod table_ref;
pub mod tables;
pub mod value;

pub use compiler::{DefaultExpressionCompiler, ExpressionCompiler, JoinContext};
pub use errors::QueryError;
pub use field_registry::{PropertyFieldRegistry, PropertyFields, ValidationError};
pub use query_builder::QueryBuilder;
pub use query_state::{QueryState, ROOT_ALIAS};
pub use relation::Relation;
pub use table_ref::{TableRef, TableRefId};
pub use tables::{EntityTable, TableCollection};
pub use value::{Row, SqlFragment, SqlStatement, SqlValue};
