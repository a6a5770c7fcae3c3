//! The immutable entity-type registry.
//!
//! Built once from a [`ModelConfig`] before any request is served, then
//! read-only. Construction validates the declaration as a whole: names are
//! unique, every navigation target exists, and every navigation has a
//! matching inverse on the target type.

use std::collections::HashMap;
use std::sync::Arc;

use super::config::ModelConfig;
use super::errors::ModelError;
use super::types::{EntityType, NavigationProperty};

pub struct ModelRegistry {
    types: HashMap<String, Arc<EntityType>>,
    by_plural: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn build(config: &ModelConfig) -> Result<Self, ModelError> {
        let mut types = HashMap::new();
        let mut by_plural = HashMap::new();
        for def in &config.entity_types {
            if types.contains_key(&def.name) || by_plural.contains_key(&def.plural) {
                return Err(ModelError::DuplicateEntityType {
                    name: def.name.clone(),
                });
            }
            by_plural.insert(def.plural.clone(), def.name.clone());
            types.insert(def.name.clone(), Arc::new(def.clone()));
        }

        let registry = ModelRegistry { types, by_plural };
        registry.validate_navigation()?;
        log::info!(
            "Model registry built: {} entity types",
            registry.types.len()
        );
        Ok(registry)
    }

    fn validate_navigation(&self) -> Result<(), ModelError> {
        for entity_type in self.types.values() {
            for nav in &entity_type.navigation {
                let target = self.types.get(&nav.target).ok_or_else(|| {
                    ModelError::UnknownNavigationTarget {
                        entity_type: entity_type.name.clone(),
                        navigation: nav.name.clone(),
                        target: nav.target.clone(),
                    }
                })?;
                let inverse = target.navigation(&nav.inverse);
                let points_back =
                    inverse.map(|inv| inv.target == entity_type.name).unwrap_or(false);
                if !points_back {
                    return Err(ModelError::MissingInverse {
                        entity_type: entity_type.name.clone(),
                        navigation: nav.name.clone(),
                        inverse: nav.inverse.clone(),
                        target: nav.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Look up a type by its singular name.
    pub fn entity_type(&self, name: &str) -> Result<&Arc<EntityType>, ModelError> {
        self.types.get(name).ok_or_else(|| ModelError::UnknownEntityType {
            name: name.to_string(),
        })
    }

    /// Look up a type by its entity-set (plural) name.
    pub fn entity_type_by_plural(&self, plural: &str) -> Option<&Arc<EntityType>> {
        self.by_plural
            .get(plural)
            .and_then(|name| self.types.get(name))
    }

    /// Resolve a navigation property on a type.
    pub fn navigation(
        &self,
        type_name: &str,
        nav_name: &str,
    ) -> Result<&NavigationProperty, ModelError> {
        self.entity_type(type_name)?
            .navigation
            .iter()
            .find(|n| n.name == nav_name)
            .ok_or_else(|| ModelError::UnknownNavigation {
                entity_type: type_name.to_string(),
                navigation: nav_name.to_string(),
            })
    }

    pub fn type_names(&self) -> impl Iterator<Item = &String> {
        self.types.keys()
    }
}
