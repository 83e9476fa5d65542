use std::fmt;

use serde::{Deserialize, Serialize};

/// Facts probed at the start of each service's provisioning. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningState {
    pub installed: bool,
    pub db_user_exists: bool,
    pub db_schema_exists: bool,
    pub identity_account_exists: bool,
}

/// Per-service pipeline position. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Probed,
    Installed,
    Configured,
    DatabaseReady,
    Registered,
    Running,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Probed => "probed",
            Stage::Installed => "installed",
            Stage::Configured => "configured",
            Stage::DatabaseReady => "database-ready",
            Stage::Registered => "registered",
            Stage::Running => "running",
        };
        f.write_str(label)
    }
}
