//! The declarative metadata structs for entity types, properties and
//! navigation relationships.
//!
//! These are both the serde declaration format (YAML-loadable) and the
//! runtime metadata consumed by the parser and the query builder. A type is
//! immutable once registered.

use serde::{Deserialize, Serialize};

/// A named entity type: backing table, scalar properties, navigation
/// properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityType {
    /// Singular name, e.g. `Thing`.
    pub name: String,
    /// Plural (entity set) name, e.g. `Things`.
    pub plural: String,
    /// The backing table.
    pub table: String,
    /// The identifier column of the backing table.
    #[serde(default = "default_id_column")]
    pub id_column: String,
    pub properties: Vec<Property>,
    #[serde(default)]
    pub navigation: Vec<NavigationProperty>,
}

fn default_id_column() -> String {
    "ID".to_string()
}

impl EntityType {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&NavigationProperty> {
        self.navigation.iter().find(|n| n.name == name)
    }

    /// Required scalar properties, used by the incompleteness check on
    /// insert.
    pub fn required_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|p| p.required)
    }
}

/// A scalar ("entity") property and its column mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub mapping: FieldMapping,
}

/// How a logical property maps onto physical columns.
///
/// Composite mappings (time intervals, geometries) span multiple columns;
/// their constituent columns are always written together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    /// The identifier property, routed through the deployment id strategy.
    Id,
    /// A single text-ish column read and written as-is.
    Plain { column: String },
    /// A numeric column, tolerant of decimal text on the way in.
    Number { column: String },
    /// A single timestamp column.
    Time { column: String },
    /// A start/end column pair forming one logical interval value.
    TimeInterval {
        start_column: String,
        end_column: String,
    },
    /// A JSON document column.
    Json { column: String },
    /// A geometry column plus the cached source-encoding text column.
    Geometry {
        column: String,
        source_column: String,
    },
}

impl FieldMapping {
    /// The physical columns backing this mapping, in declaration order.
    /// `Id` resolves against the owning type's id column.
    pub fn columns<'a>(&'a self, id_column: &'a str) -> Vec<&'a str> {
        match self {
            FieldMapping::Id => vec![id_column],
            FieldMapping::Plain { column }
            | FieldMapping::Number { column }
            | FieldMapping::Time { column }
            | FieldMapping::Json { column } => vec![column.as_str()],
            FieldMapping::TimeInterval {
                start_column,
                end_column,
            } => vec![start_column.as_str(), end_column.as_str()],
            FieldMapping::Geometry {
                column,
                source_column,
            } => vec![column.as_str(), source_column.as_str()],
        }
    }
}

/// A directional link between two entity types, always paired with an
/// inverse on the target type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationProperty {
    /// Navigation name as it appears in paths, e.g. `Datastreams` or
    /// `Thing`.
    pub name: String,
    /// Target entity type (singular name).
    pub target: String,
    /// Name of the inverse navigation property on the target type.
    pub inverse: String,
    /// True for a to-many (entity set) navigation.
    #[serde(default)]
    pub to_many: bool,
    /// Foreign-key column on the owning table backing this navigation, when
    /// one exists (to-one side of a one-to-many). Selectable so expanded
    /// sub-entities can be linked back without a second query.
    #[serde(default)]
    pub link_column: Option<String>,
    /// The storage relation backing this navigation.
    pub relation: RelationDef,
}

/// Declarative description of the relation backing a navigation property.
///
/// Column names are relative to the owning (source) type's table, the
/// target type's table, and the link table respectively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationDef {
    /// `target.target_column = source.source_column`.
    OneToMany {
        source_column: String,
        target_column: String,
    },
    /// Chained through a link table.
    ManyToMany {
        link_table: String,
        source_link_column: String,
        target_link_column: String,
    },
    /// As `ManyToMany`, with a rank column preserving insertion order.
    ManyToManyOrdered {
        link_table: String,
        source_link_column: String,
        target_link_column: String,
        rank_column: String,
        #[serde(default)]
        always_distinct: bool,
    },
}
