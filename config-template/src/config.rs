// Engine Configuration
// Fallback values used when an expression fails

use crate::error::ConfigError;
use crate::value::Value;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Text substituted for a failed expression inside surrounding text
pub const DEFAULT_INTERPOLATION_ERROR: &str = "<error>";

/// Engine settings, loadable from YAML or JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Value returned by a failed whole-string or bare expression
    pub error_sentinel: Value,

    /// Text substituted by a failed interpolated expression
    pub interpolation_error: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            error_sentinel: Value::Null,
            interpolation_error: DEFAULT_INTERPOLATION_ERROR.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Option<Self> = serde_yaml::from_str(content)?;
        Ok(config.unwrap_or_default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}
