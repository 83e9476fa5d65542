use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;

use crate::error::{ProvisionError, Result};
use crate::models::DeploymentConfig;

/// Load the flat `KEY: value` deployment file and apply `overrides` on top.
pub fn load(config_path: &Path, overrides: &[(String, String)]) -> Result<DeploymentConfig> {
    if !config_path.exists() {
        return Err(ProvisionError::ConfigNotFound(config_path.to_path_buf()));
    }
    let contents = std::fs::read_to_string(config_path)?;
    let mut params = parse(&contents)?;
    for (key, value) in overrides {
        params.insert(key.clone(), value.clone());
    }
    Ok(DeploymentConfig::new(params))
}

/// Parse deployment parameters. Scalars are stringified; nesting is rejected.
pub fn parse(contents: &str) -> Result<BTreeMap<String, String>> {
    if contents.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let raw: BTreeMap<String, Value> = serde_yaml::from_str(contents)
        .map_err(|e| ProvisionError::InvalidConfig(e.to_string()))?;

    let mut params = BTreeMap::new();
    for (key, value) in raw {
        if key.trim().is_empty() {
            return Err(ProvisionError::InvalidConfig("empty parameter name".into()));
        }
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => {
                return Err(ProvisionError::InvalidConfig(format!(
                    "parameter '{key}' must be a scalar"
                )))
            }
        };
        params.insert(key, value);
    }
    Ok(params)
}

/// Split a `KEY=VALUE` command-line override.
pub fn parse_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ProvisionError::InvalidConfig(format!(
            "override '{raw}' is not of the form KEY=VALUE"
        ))),
    }
}
