//! The generic entity representation: one property bag per row, no
//! per-type structs.

use serde::Serialize;
use serde_json::{Map, Value};

use super::id::Id;
use super::types::EntityType;

/// An entity instance of some registered type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    #[serde(skip)]
    pub entity_type: String,
    #[serde(rename = "@iot.id", skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Entity {
            entity_type: entity_type.into(),
            id: None,
            properties: Map::new(),
        }
    }

    pub fn with_id(entity_type: impl Into<String>, id: Id) -> Self {
        Entity {
            entity_type: entity_type.into(),
            id: Some(id),
            properties: Map::new(),
        }
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Names of required scalar properties that are absent or null.
    pub fn missing_required(&self, entity_type: &EntityType) -> Vec<String> {
        entity_type
            .required_properties()
            .filter(|p| p.name != "id")
            .filter(|p| {
                self.properties
                    .get(&p.name)
                    .map(Value::is_null)
                    .unwrap_or(true)
            })
            .map(|p| p.name.clone())
            .collect()
    }
}
