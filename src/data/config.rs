use std::env;

use serde::{Deserialize, Serialize};

use crate::Result;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_REVERSE_PREFIX: &str = "reverse_";
pub const DEFAULT_POSITION_FIELD: &str = "index";
pub const DEFAULT_ID_FIELD: &str = "id";

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Namespace used for schema names written without a `namespace.` prefix
    pub default_namespace: String,
    /// Prefix of generated reverse relationship names
    pub reverse_prefix: String,
    /// Attribute a positional query stamps when none is given
    pub position_field: String,
    /// Identifier attribute for schemas that do not declare one
    pub id_field: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            reverse_prefix: DEFAULT_REVERSE_PREFIX.to_string(),
            position_field: DEFAULT_POSITION_FIELD.to_string(),
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }
}

impl StoreConfig {
    /// Defaults overridden by `Q_DEFAULT_NAMESPACE`, `Q_REVERSE_PREFIX`,
    /// `Q_POSITION_FIELD` and `Q_ID_FIELD` when set.
    pub fn from_env() -> Self {
        let mut config = StoreConfig::default();

        if let Ok(value) = env::var("Q_DEFAULT_NAMESPACE") {
            config.default_namespace = value;
        }
        if let Ok(value) = env::var("Q_REVERSE_PREFIX") {
            config.reverse_prefix = value;
        }
        if let Ok(value) = env::var("Q_POSITION_FIELD") {
            config.position_field = value;
        }
        if let Ok(value) = env::var("Q_ID_FIELD") {
            config.id_field = value;
        }

        config
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: StoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_namespace.is_empty() || self.default_namespace.contains('.') {
            return Err(crate::Error::Config(format!(
                "invalid default namespace '{}'",
                self.default_namespace
            )));
        }
        if self.id_field.is_empty() || self.position_field.is_empty() {
            return Err(crate::Error::Config(
                "id_field and position_field must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
