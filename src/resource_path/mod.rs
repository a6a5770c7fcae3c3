//! The resource path data model and parser.
//!
//! A path such as `/Things(1)/Datastreams(2)/Observations/$ref` parses into
//! an ordered, linear chain of [`PathElement`]s: each element's parent is
//! the previous element, and the first element is always an entity or
//! entity-set element.

pub mod errors;
mod parser;

pub use errors::PathParseError;
pub use parser::parse_path;

use crate::model::Id;

/// One segment of a parsed resource path.
///
/// A closed set of variants with exhaustive dispatch; new segment kinds are
/// added here, not as new handler types.
#[derive(Debug, Clone, PartialEq)]
pub enum PathElement {
    /// A single entity, reached either as `Name(id)` or through a to-one
    /// navigation (in which case `id` is `None`). `nav` is the navigation
    /// property by which this element was reached from its parent; `None`
    /// for the first element.
    Entity {
        entity_type: String,
        id: Option<Id>,
        nav: Option<String>,
    },
    /// An entity set, reached as a plural set name or a to-many navigation.
    EntitySet {
        entity_type: String,
        nav: Option<String>,
    },
    /// A scalar property of the preceding entity.
    Property { name: String },
    /// An open sub-property, e.g. a key inside a JSON document property.
    CustomProperty { name: String },
    /// An index into a JSON array property.
    ArrayIndex { index: usize },
}

impl PathElement {
    /// The entity type of an entity/set element.
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            PathElement::Entity { entity_type, .. }
            | PathElement::EntitySet { entity_type, .. } => Some(entity_type),
            _ => None,
        }
    }
}

/// A parsed resource path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourcePath {
    pub service_root_url: String,
    pub version: String,
    /// The raw path text as received.
    pub path: String,
    pub elements: Vec<PathElement>,
    /// True for a `/$ref` navigation-link request.
    pub is_ref: bool,
    /// True for a `/$value` raw-value request.
    pub is_value: bool,
    /// Index of the deepest element carrying an identifier.
    pub identified_element: Option<usize>,
}

impl ResourcePath {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PathElement> {
        self.elements.get(index)
    }

    pub fn last_element(&self) -> Option<&PathElement> {
        self.elements.last()
    }

    /// The entity type addressed by the path: the type of the deepest
    /// entity/set element.
    pub fn main_entity_type(&self) -> Option<&str> {
        self.elements
            .iter()
            .rev()
            .find_map(|e| e.entity_type())
    }

    /// True when the path addresses exactly one entity (the deepest
    /// entity/set element carries an identifier or was reached to-one).
    pub fn is_single_entity(&self) -> bool {
        self.elements
            .iter()
            .rev()
            .find(|e| e.entity_type().is_some())
            .map(|e| matches!(e, PathElement::Entity { .. }))
            .unwrap_or(false)
    }
}
