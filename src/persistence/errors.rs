use thiserror::Error;

use crate::sql::{QueryError, ValidationError};

/// Errors raised by persistence operations.
///
/// `NoSuchEntity` and `IncompleteEntity` are user-caused and recoverable at
/// the entity-factory layer; `Integrity` and `DuplicateRow` are fatal and
/// never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PersistenceError {
    #[error("Entity of type `{entity_type}` with id {id} does not exist")]
    NoSuchEntity { entity_type: String, id: String },
    #[error("Entity of type `{entity_type}` is incomplete: missing {missing:?}")]
    IncompleteEntity {
        entity_type: String,
        missing: Vec<String>,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Statement affected {affected} rows where exactly one was expected")]
    Integrity { affected: u64 },
    #[error("Unique lookup matched more than one row for `{entity_type}`")]
    DuplicateRow { entity_type: String },
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("Store error: {0}")]
    Store(String),
}
