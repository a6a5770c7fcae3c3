//! Loading of model declarations.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::ModelError;
use super::types::EntityType;

/// A complete model declaration: the closed catalog of entity types for one
/// deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub entity_types: Vec<EntityType>,
}

impl ModelConfig {
    /// The built-in sensor/observation model.
    pub fn sensorthings() -> Self {
        serde_yaml::from_str(include_str!("sensorthings.yaml"))
            .expect("built-in model declaration must parse")
    }

    pub fn from_yaml(content: &str) -> Result<Self, ModelError> {
        serde_yaml::from_str(content).map_err(|e| ModelError::ConfigParse {
            error: e.to_string(),
        })
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ModelError::ConfigRead {
                path: path.as_ref().display().to_string(),
                error: e.to_string(),
            })?;
        Self::from_yaml(&content)
    }
}
