// Instance Configuration
// One templated card, row or element: its body, style, entities and variables

use crate::error::ConfigError;
use crate::value::Value;
use crate::variables::VariableDeclaration;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Card type that should not itself be templated
const PICTURE_ELEMENTS: &str = "picture-elements";

/// Configuration of one template instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Entity ids whose changes trigger a re-render; may itself be templated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<VariableDeclaration>,

    #[serde(
        rename = "staticVariables",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub static_variables: Option<VariableDeclaration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<Value>,
}

/// Which body the instance templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Card,
    Row,
    Element,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionKind::Card => write!(f, "card"),
            SectionKind::Row => write!(f, "row"),
            SectionKind::Element => write!(f, "element"),
        }
    }
}

impl InstanceConfig {
    /// Parse YAML (or JSON) and validate. An empty or null document is a
    /// missing configuration.
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Err(ConfigError::Missing);
        }
        let config: Option<Self> = serde_yaml::from_str(content)?;
        let config = config.ok_or(ConfigError::Missing)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Reject configurations that cannot be rendered
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.card.is_none() && self.row.is_none() && self.element.is_none() {
            return Err(ConfigError::NoSection);
        }

        if let Some(card) = &self.card {
            if !has_type(card) {
                return Err(ConfigError::NoCardType);
            }
        }

        if let Some(element) = &self.element {
            if !has_type(element) {
                return Err(ConfigError::NoElementType);
            }
        }

        if self.entities.is_none() {
            return Err(ConfigError::NoEntities);
        }

        Ok(())
    }

    /// Non-fatal problems worth reporting
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let card_type = self
            .card
            .as_ref()
            .and_then(Value::as_object)
            .and_then(|card| card.get("type"))
            .and_then(Value::as_str);
        if card_type == Some(PICTURE_ELEMENTS) {
            warnings.push(
                "config-template should not wrap the picture-elements card itself, use it as one of the elements instead"
                    .to_string(),
            );
        }

        warnings
    }

    /// The templated body: card, then row, then element
    pub fn section(&self) -> Option<(SectionKind, &Value)> {
        self.card
            .as_ref()
            .map(|v| (SectionKind::Card, v))
            .or_else(|| self.row.as_ref().map(|v| (SectionKind::Row, v)))
            .or_else(|| self.element.as_ref().map(|v| (SectionKind::Element, v)))
    }
}

fn has_type(section: &Value) -> bool {
    section
        .as_object()
        .and_then(|map| map.get("type"))
        .is_some_and(Value::is_truthy)
}

/// Variables shared by every instance, supplied by the host dashboard
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalVariables {
    #[serde(
        rename = "config_template_card_vars",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub vars: Option<VariableDeclaration>,

    #[serde(
        rename = "config_template_card_staticVars",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub static_vars: Option<VariableDeclaration>,
}

impl GlobalVariables {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let globals: Option<Self> = serde_yaml::from_str(content)?;
        Ok(globals.unwrap_or_default())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD: &str = r#"
type: custom:config-template-card
entities: [light.kitchen]
variables:
  lit: "states['light.kitchen'] == 'on'"
staticVariables: [1, 2]
card:
  type: entities
  title: "<$ lit ? 'On' : 'Off' $>"
style:
  color: red
"#;

    #[test]
    fn test_parse_card_config() {
        let config = InstanceConfig::from_yaml_str(CARD).unwrap();

        assert_eq!(config.kind.as_deref(), Some("custom:config-template-card"));
        assert!(matches!(config.variables, Some(VariableDeclaration::Named(_))));
        assert!(matches!(
            config.static_variables,
            Some(VariableDeclaration::Positional(ref v)) if v.len() == 2
        ));
        let (kind, section) = config.section().unwrap();
        assert_eq!(kind, SectionKind::Card);
        assert_eq!(
            section.as_object().unwrap()["type"],
            Value::from("entities")
        );
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            InstanceConfig::from_yaml_str("null"),
            Err(ConfigError::Missing)
        ));
        assert!(matches!(
            InstanceConfig::from_yaml_str("entities: [a]\n"),
            Err(ConfigError::NoSection)
        ));
        assert!(matches!(
            InstanceConfig::from_yaml_str("entities: [a]\ncard: {title: x}\n"),
            Err(ConfigError::NoCardType)
        ));
        assert!(matches!(
            InstanceConfig::from_yaml_str("entities: [a]\nelement: {style: {}}\n"),
            Err(ConfigError::NoElementType)
        ));
        assert!(matches!(
            InstanceConfig::from_yaml_str("card: {type: glance}\n"),
            Err(ConfigError::NoEntities)
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ConfigError::Missing.to_string(), "Invalid configuration");
        assert_eq!(
            ConfigError::NoSection.to_string(),
            "No card or row or element defined"
        );
    }

    #[test]
    fn test_picture_elements_is_a_warning() {
        let config =
            InstanceConfig::from_yaml_str("entities: []\ncard: {type: picture-elements}\n")
                .unwrap();
        assert_eq!(config.warnings().len(), 1);
    }

    #[test]
    fn test_section_precedence() {
        let config = InstanceConfig::from_yaml_str(
            "entities: []\nrow: {type: text}\nelement: {type: icon}\n",
        )
        .unwrap();
        assert_eq!(config.section().unwrap().0, SectionKind::Row);
    }

    #[test]
    fn test_global_variables() {
        let globals = GlobalVariables::from_yaml_str(
            "config_template_card_vars: {unit: \"'C'\"}\nconfig_template_card_staticVars: [1]\n",
        )
        .unwrap();
        assert!(globals.vars.is_some());
        assert!(matches!(
            globals.static_vars,
            Some(VariableDeclaration::Positional(_))
        ));
        assert_eq!(
            GlobalVariables::from_yaml_str("").unwrap(),
            GlobalVariables::default()
        );
    }
}
