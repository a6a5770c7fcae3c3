//! Entity identifiers and the pluggable identifier strategy.
//!
//! A deployment picks exactly one identifier representation; the same
//! [`IdManager`] is used by the path parser, the query builder (for id
//! equality predicates) and the persistence layer. Mixing representations
//! within one deployment is a configuration fault.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::ModelError;

/// An entity identifier in one of the supported representations.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Long(i64),
    Text(String),
    Uuid(Uuid),
}

impl Id {
    pub fn kind(&self) -> IdKind {
        match self {
            Id::Long(_) => IdKind::Long,
            Id::Text(_) => IdKind::Text,
            Id::Uuid(_) => IdKind::Uuid,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Long(v) => write!(f, "{v}"),
            Id::Text(v) => write!(f, "'{v}'"),
            Id::Uuid(v) => write!(f, "{v}"),
        }
    }
}

/// The identifier representation configured for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Long,
    Text,
    Uuid,
}

/// Parses identifier tokens from path text into [`Id`] values.
///
/// The token is the raw content between the parentheses of a `Name(id)`
/// segment, quotes included. Each implementation accepts exactly one
/// representation.
pub trait IdManager: Send + Sync {
    fn kind(&self) -> IdKind;
    fn parse_id(&self, token: &str) -> Result<Id, ModelError>;
}

/// 64-bit integer identifiers (the default).
pub struct IdManagerLong;

impl IdManager for IdManagerLong {
    fn kind(&self) -> IdKind {
        IdKind::Long
    }

    fn parse_id(&self, token: &str) -> Result<Id, ModelError> {
        token
            .parse::<i64>()
            .map(Id::Long)
            .map_err(|_| ModelError::InvalidId {
                text: token.to_string(),
                expected: "64-bit integer".to_string(),
            })
    }
}

/// String identifiers; the token must be single-quoted.
pub struct IdManagerText;

impl IdManager for IdManagerText {
    fn kind(&self) -> IdKind {
        IdKind::Text
    }

    fn parse_id(&self, token: &str) -> Result<Id, ModelError> {
        let inner = token
            .strip_prefix('\'')
            .and_then(|t| t.strip_suffix('\''))
            .filter(|t| !t.is_empty());
        match inner {
            Some(text) => Ok(Id::Text(text.replace("''", "'"))),
            None => Err(ModelError::InvalidId {
                text: token.to_string(),
                expected: "quoted string".to_string(),
            }),
        }
    }
}

/// UUID identifiers; accepts both quoted and bare forms.
pub struct IdManagerUuid;

impl IdManager for IdManagerUuid {
    fn kind(&self) -> IdKind {
        IdKind::Uuid
    }

    fn parse_id(&self, token: &str) -> Result<Id, ModelError> {
        let bare = token
            .strip_prefix('\'')
            .and_then(|t| t.strip_suffix('\''))
            .unwrap_or(token);
        Uuid::parse_str(bare)
            .map(Id::Uuid)
            .map_err(|_| ModelError::InvalidId {
                text: token.to_string(),
                expected: "UUID".to_string(),
            })
    }
}

/// The manager instance for a configured identifier representation.
pub fn id_manager_for(kind: IdKind) -> &'static dyn IdManager {
    match kind {
        IdKind::Long => &IdManagerLong,
        IdKind::Text => &IdManagerText,
        IdKind::Uuid => &IdManagerUuid,
    }
}
