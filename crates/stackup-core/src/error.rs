use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    #[error("config file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid service catalog: {0}")]
    InvalidCatalog(String),

    #[error("service '{0}' not found in catalog")]
    ServiceNotFound(String),

    #[error("unresolved placeholder '%{placeholder}%' in {context}")]
    UnresolvedPlaceholder { placeholder: String, context: String },

    #[error("install failed: {0}")]
    Install(String),

    #[error("database provisioning failed: {0}")]
    DatabaseProvisioning(String),

    #[error("identity registration failed: {0}")]
    IdentityRegistration(String),

    #[error("service '{service}' did not start within {timeout_secs}s (polled {url})")]
    ServiceDidNotStart {
        service: String,
        url: String,
        timeout_secs: u64,
    },

    #[error("process operation failed: {0}")]
    Process(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
