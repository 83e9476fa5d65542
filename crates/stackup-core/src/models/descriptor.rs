use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::DeploymentConfig;

pub const DEFAULT_CHARSET: &str = "utf8";

/// Static definition of one provisioned service, as declared in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceComponent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<TemplateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentitySpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub processes: Vec<ProcessSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness: Option<ReadinessCheck>,
    #[serde(default)]
    pub provides_identity: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
}

/// A source tree to materialize under the service's install directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceComponent {
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Directory name under the install directory; defaults to the last path
    /// segment of `repo` without `.git`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    /// Shell command run inside the checkout after cloning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
}

impl SourceComponent {
    pub fn directory_name(&self) -> String {
        if let Some(dir) = &self.directory {
            return dir.clone();
        }
        let last = self
            .repo
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or(&self.repo);
        last.strip_suffix(".git").unwrap_or(last).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    pub source: PathBuf,
    /// Relative to the service config directory unless absolute.
    pub destination: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionInsert>,
}

/// Lines appended under a `[section]` header after placeholder expansion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionInsert {
    pub section: String,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySpec {
    pub service_type: String,
    #[serde(default)]
    pub description: String,
    pub endpoints: EndpointUrls,
    /// Account name; defaults to the service name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Roles bound within the admin tenant in addition to the admin role.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Roles created on demand before binding (e.g. `ResellerAdmin`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointUrls {
    pub public: String,
    pub admin: String,
    pub internal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    pub binary: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Relative to the service log directory unless absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessCheck {
    pub url: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

/// Filesystem locations derived for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePaths {
    pub install_dir: PathBuf,
    pub config_dir: PathBuf,
    pub log_dir: PathBuf,
    pub record_file: PathBuf,
}

impl ServiceDescriptor {
    pub fn paths(&self, config: &DeploymentConfig) -> ServicePaths {
        ServicePaths {
            install_dir: self
                .install_dir
                .clone()
                .unwrap_or_else(|| config.dest_dir().join(&self.name)),
            config_dir: config.config_dir().join(&self.name),
            log_dir: config.log_dir().join(&self.name),
            record_file: config.run_dir().join(format!("{}.json", self.name)),
        }
    }

    pub fn db_user(&self) -> Option<&str> {
        self.database
            .as_ref()
            .map(|db| db.user.as_deref().unwrap_or(&self.name))
    }

    pub fn db_schema(&self) -> Option<&str> {
        self.database
            .as_ref()
            .map(|db| db.schema.as_deref().unwrap_or(&self.name))
    }

    pub fn identity_account(&self) -> Option<&str> {
        self.identity
            .as_ref()
            .map(|id| id.account.as_deref().unwrap_or(&self.name))
    }

    /// Log file for the process at `index`, resolved against `log_dir`.
    pub fn process_log_file(&self, index: usize, log_dir: &Path) -> PathBuf {
        let process = &self.processes[index];
        match &process.log_file {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => log_dir.join(path),
            None if self.processes.len() == 1 => log_dir.join(format!("{}.log", self.name)),
            None => {
                let binary = Path::new(&process.binary)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| index.to_string());
                log_dir.join(format!("{}-{binary}.log", self.name))
            }
        }
    }
}

impl DatabaseSpec {
    pub fn charset(&self) -> &str {
        self.charset.as_deref().unwrap_or(DEFAULT_CHARSET)
    }
}
