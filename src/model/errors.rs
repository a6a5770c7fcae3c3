use thiserror::Error;

/// Errors raised while building or querying the model registry.
///
/// Registry construction errors are operator faults: the model declaration
/// is wrong and the process must not start serving. Lookup errors at request
/// time indicate either a bad request (unknown name in a path) or missing
/// metadata for an operation that must always be mappable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    #[error("No entity type named `{name}` is registered")]
    UnknownEntityType { name: String },
    #[error("Entity type `{entity_type}` has no property `{property}`")]
    UnknownProperty {
        entity_type: String,
        property: String,
    },
    #[error("Entity type `{entity_type}` has no navigation property `{navigation}`")]
    UnknownNavigation {
        entity_type: String,
        navigation: String,
    },
    #[error("Duplicate entity type name `{name}` in model declaration")]
    DuplicateEntityType { name: String },
    #[error("Navigation `{entity_type}.{navigation}` points at unknown type `{target}`")]
    UnknownNavigationTarget {
        entity_type: String,
        navigation: String,
        target: String,
    },
    #[error(
        "Navigation `{entity_type}.{navigation}` declares inverse `{inverse}` \
         which does not exist on `{target}`"
    )]
    MissingInverse {
        entity_type: String,
        navigation: String,
        inverse: String,
        target: String,
    },
    #[error("Invalid identifier `{text}`: expected a {expected} id")]
    InvalidId { text: String, expected: String },
    #[error("Failed to read model declaration `{path}`: {error}")]
    ConfigRead { path: String, error: String },
    #[error("Failed to parse model declaration: {error}")]
    ConfigParse { error: String },
}
