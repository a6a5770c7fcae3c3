use thiserror::Error;

use crate::model::{IdKind, ModelError};
use crate::resource_path::PathParseError;

/// Errors raised while translating a request into a statement.
///
/// `IdTypeMismatch` is a request-level type error; `UnmappedDeleteType` is an
/// operator fault (metadata is missing for a type that must always be
/// deletable); the rest are bad requests.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error(transparent)]
    InvalidPath(#[from] PathParseError),
    #[error("This deployment expects {expected:?} ids, not {got:?}")]
    IdTypeMismatch { expected: IdKind, got: IdKind },
    #[error("Don't know how to delete `{entity_type}` (unmapped entity type)")]
    UnmappedDeleteType { entity_type: String },
    #[error("Resource path addresses no entity")]
    EmptyPath,
    #[error("Cannot join `{entity_type}` without a navigation property")]
    MissingNavigation { entity_type: String },
    #[error("Unsupported expression: {reason}")]
    UnsupportedExpression { reason: String },
    #[error("Relation `{relation}` cannot be modified from this side")]
    WrongRelationSide { relation: String },
    #[error(transparent)]
    Model(#[from] ModelError),
}
