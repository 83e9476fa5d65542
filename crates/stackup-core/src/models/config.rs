use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ProvisionError, Result};

const SECRET_SUFFIXES: &[&str] = &["_PASS", "_PASSWORD", "_TOKEN", "_SECRET"];

pub const DEFAULT_DEST_DIR: &str = "/opt/stack";
pub const DEFAULT_CONFIG_DIR: &str = "/etc";
pub const DEFAULT_LOG_DIR: &str = "/var/log/stackup";
pub const DEFAULT_RUN_DIR: &str = "/var/run/stackup";

/// Fully resolved deployment parameters.
///
/// Built once by the config loader and handed by reference to every other
/// component. There is no mutation API after construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentConfig {
    params: BTreeMap<String, String>,
}

impl DeploymentConfig {
    pub fn new(params: BTreeMap<String, String>) -> Self {
        Self { params }
    }

    /// Look up a required parameter.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ProvisionError::MissingParameter(key.to_string()))
    }

    /// Look up an optional parameter.
    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Look up a parameter, falling back to `default` when absent.
    ///
    /// Secret-looking keys never fall back: a missing password or token is
    /// always a `MissingParameter`.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> Result<&'a str> {
        match self.params.get(key) {
            Some(value) => Ok(value.as_str()),
            None if is_secret(key) => Err(ProvisionError::MissingParameter(key.to_string())),
            None => Ok(default),
        }
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn dest_dir(&self) -> PathBuf {
        PathBuf::from(self.get_opt("DEST_DIR").unwrap_or(DEFAULT_DEST_DIR))
    }

    pub fn config_dir(&self) -> PathBuf {
        PathBuf::from(self.get_opt("CONFIG_DIR").unwrap_or(DEFAULT_CONFIG_DIR))
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(self.get_opt("LOG_DIR").unwrap_or(DEFAULT_LOG_DIR))
    }

    pub fn run_dir(&self) -> PathBuf {
        PathBuf::from(self.get_opt("RUN_DIR").unwrap_or(DEFAULT_RUN_DIR))
    }
}

pub fn is_secret(key: &str) -> bool {
    let upper = key.to_ascii_uppercase();
    SECRET_SUFFIXES.iter().any(|suffix| upper.ends_with(suffix))
}
