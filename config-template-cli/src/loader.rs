// Input Loading
// Reads instance configurations, host states, global variables and engine settings from disk

use config_template::{EngineConfig, GlobalVariables, HostState, InstanceConfig};

use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use std::path::Path;

/// Load and validate an instance configuration (YAML or JSON)
pub fn load_instance(path: &Path) -> Result<InstanceConfig> {
    ensure_exists(path, "Configuration")?;
    InstanceConfig::from_file(path)
        .wrap_err_with(|| format!("Invalid instance configuration: {}", path.display()))
}

/// Load a host state: `{states: {entity: state}, user: ...}`
pub fn load_host(path: &Path) -> Result<HostState> {
    ensure_exists(path, "Host state")?;
    let content = std::fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(HostState::default());
    }
    serde_yaml::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse host state: {}", path.display()))
}

pub fn load_globals(path: Option<&Path>) -> Result<GlobalVariables> {
    let Some(path) = path else {
        return Ok(GlobalVariables::default());
    };
    ensure_exists(path, "Global variables")?;
    GlobalVariables::from_file(path)
        .wrap_err_with(|| format!("Failed to parse global variables: {}", path.display()))
}

pub fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    ensure_exists(path, "Engine configuration")?;
    EngineConfig::from_file(path)
        .wrap_err_with(|| format!("Failed to parse engine configuration: {}", path.display()))
}

fn ensure_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} file not found: {}", what, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use config_template::Value;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_host_yaml_and_json() {
        let yaml = file("states:\n  light.kitchen: 'on'\nuser: {name: Ada}\n");
        let host = load_host(yaml.path()).unwrap();
        assert_eq!(host.state("light.kitchen"), Some(&Value::from("on")));

        let json = file(r#"{"states": {"sensor.temp": 21.5}}"#);
        let host = load_host(json.path()).unwrap();
        assert_eq!(host.state("sensor.temp"), Some(&Value::Number(21.5)));
        assert_eq!(host.user, Value::Null);
    }

    #[test]
    fn test_load_instance_reports_validation_error() {
        let config = file("entities: []\ncard: {title: x}\n");
        let err = load_instance(config.path()).unwrap_err();
        assert!(err
            .chain()
            .any(|cause| cause.to_string() == "No card type defined"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_host(Path::new("/nonexistent/host.yaml")).unwrap_err();
        assert!(err.to_string().contains("Host state file not found"));
    }

    #[test]
    fn test_optional_inputs_default() {
        assert_eq!(load_globals(None).unwrap(), GlobalVariables::default());
        assert_eq!(load_engine_config(None).unwrap(), EngineConfig::default());

        let engine = file("interpolationError: '??'\n");
        let config = load_engine_config(Some(engine.path())).unwrap();
        assert_eq!(config.interpolation_error, "??");
    }
}
