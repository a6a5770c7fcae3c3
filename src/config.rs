use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;
use validator::Validate;

use crate::model::IdKind;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

#[derive(Debug, Error)]
#[error("unknown id type `{0}` (expected long, text or uuid)")]
pub struct ParseIdKindError(String);

fn parse_id_kind(value: &str) -> Result<IdKind, ParseIdKindError> {
    match value {
        "long" => Ok(IdKind::Long),
        "text" => Ok(IdKind::Text),
        "uuid" => Ok(IdKind::Uuid),
        other => Err(ParseIdKindError(other.to_string())),
    }
}

/// Server configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host address
    #[validate(length(min = 1, message = "HTTP host cannot be empty"))]
    pub http_host: String,

    /// HTTP server port (1-65535)
    #[validate(range(
        min = 1,
        max = 65535,
        message = "HTTP port must be between 1 and 65535"
    ))]
    pub http_port: u16,

    /// Path to a YAML model declaration; the built-in sensor model is used
    /// when unset
    pub model_path: Option<String>,

    /// Identifier representation for this deployment
    pub id_kind: IdKind,

    /// Append an ascending id sort to every query, for stable pagination
    pub always_orderby_id: bool,

    /// Default `$top` when a request does not specify one (1-10000)
    #[validate(range(
        min = 1,
        max = 10000,
        message = "Default top must be between 1 and 10000"
    ))]
    pub default_top: i64,

    /// Hard ceiling on `$top` (1-100000)
    #[validate(range(
        min = 1,
        max = 100000,
        message = "Max top must be between 1 and 100000"
    ))]
    pub max_top: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            model_path: None,
            id_kind: IdKind::Long,
            always_orderby_id: true,
            default_top: 100,
            max_top: 1000,
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let id_kind_text =
            env::var("SENSORPATH_ID_TYPE").unwrap_or_else(|_| "long".to_string());
        let config = Self {
            http_host: env::var("SENSORPATH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: parse_env_var("SENSORPATH_PORT", "8080")?,
            model_path: env::var("SENSORPATH_MODEL").ok(),
            id_kind: parse_id_kind(&id_kind_text).map_err(|e| ConfigError::Parse {
                field: "SENSORPATH_ID_TYPE".to_string(),
                value: id_kind_text,
                source: Box::new(e),
            })?,
            always_orderby_id: parse_env_var("SENSORPATH_ALWAYS_ORDERBY_ID", "true")?,
            default_top: parse_env_var("SENSORPATH_DEFAULT_TOP", "100")?,
            max_top: parse_env_var("SENSORPATH_MAX_TOP", "1000")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let config = Self {
            http_host: cli.http_host,
            http_port: cli.http_port,
            model_path: cli.model_path,
            id_kind: parse_id_kind(&cli.id_type).map_err(|e| ConfigError::Parse {
                field: "id-type".to_string(),
                value: cli.id_type,
                source: Box::new(e),
            })?,
            always_orderby_id: !cli.unstable_order,
            default_top: cli.default_top,
            max_top: cli.max_top,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// The settings slice the translation engine cares about.
    pub fn settings(&self) -> PersistenceSettings {
        PersistenceSettings {
            id_kind: self.id_kind,
            always_orderby_id: self.always_orderby_id,
            default_top: self.default_top,
            max_top: self.max_top,
        }
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub http_host: String,
    pub http_port: u16,
    pub model_path: Option<String>,
    pub id_type: String,
    pub unstable_order: bool,
    pub default_top: i64,
    pub max_top: i64,
}

/// The per-deployment knobs consumed by the query builder and the
/// persistence layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistenceSettings {
    pub id_kind: IdKind,
    pub always_orderby_id: bool,
    pub default_top: i64,
    pub max_top: i64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        PersistenceSettings {
            id_kind: IdKind::Long,
            always_orderby_id: true,
            default_top: 100,
            max_top: 1000,
        }
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
