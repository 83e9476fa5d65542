use std::path::Path;

use tokio::process::Command;

use crate::error::{ProvisionError, Result};
use crate::models::{DeploymentConfig, ServiceDescriptor, ServicePaths};
use crate::services::git;

pub const DEFAULT_PACKAGE_INSTALL: &str = "apt-get install -y";

/// Package and source installation, run only when the install directory is absent.
#[allow(async_fn_in_trait)]
pub trait Installer {
    async fn install(&self, descriptor: &ServiceDescriptor, paths: &ServicePaths) -> Result<()>;
}

/// Runs the system package manager, then clones and builds each source component.
pub struct CommandInstaller {
    package_command: Vec<String>,
}

impl CommandInstaller {
    pub fn new(package_command: &str) -> Self {
        Self {
            package_command: package_command
                .split_whitespace()
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_config(config: &DeploymentConfig) -> Result<Self> {
        Ok(Self::new(
            config.get_or("PACKAGE_INSTALL", DEFAULT_PACKAGE_INSTALL)?,
        ))
    }

    async fn install_packages(&self, packages: &[String]) -> Result<()> {
        let Some((program, base_args)) = self.package_command.split_first() else {
            return Err(ProvisionError::Install("PACKAGE_INSTALL is empty".into()));
        };
        tracing::info!(count = packages.len(), "installing packages");
        let mut cmd = Command::new(program);
        cmd.args(base_args).args(packages);
        run(cmd, &format!("{program} {}", packages.join(" "))).await
    }
}

impl Installer for CommandInstaller {
    async fn install(&self, descriptor: &ServiceDescriptor, paths: &ServicePaths) -> Result<()> {
        let result = self.install_all(descriptor, paths).await;
        if result.is_err() && paths.install_dir.exists() {
            // A half-populated checkout must not count as installed next run.
            if let Err(e) = tokio::fs::remove_dir_all(&paths.install_dir).await {
                tracing::warn!(
                    service = %descriptor.name,
                    dir = %paths.install_dir.display(),
                    error = %e,
                    "failed to remove partial install, next run will treat it as installed"
                );
            }
        }
        result
    }
}

impl CommandInstaller {
    async fn install_all(&self, descriptor: &ServiceDescriptor, paths: &ServicePaths) -> Result<()> {
        if !descriptor.packages.is_empty() {
            self.install_packages(&descriptor.packages).await?;
        }

        for source in &descriptor.sources {
            let checkout = paths.install_dir.join(source.directory_name());
            if !checkout.exists() {
                tracing::info!(repo = %source.repo, dest = %checkout.display(), "cloning");
                if let Some(parent) = checkout.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                git::clone_repo(&source.repo, &checkout).await?;
                if let Some(branch) = &source.branch {
                    git::checkout(&checkout, branch).await?;
                }
            }
            if let Some(build) = &source.build {
                build_in(&checkout, build).await?;
            }
        }

        // The directory itself is the install marker.
        tokio::fs::create_dir_all(&paths.install_dir).await?;
        Ok(())
    }
}

async fn build_in(dir: &Path, script: &str) -> Result<()> {
    tracing::info!(dir = %dir.display(), script, "building");
    let mut cmd = Command::new("sh");
    cmd.args(["-c", script]).current_dir(dir);
    run(cmd, script).await
}

async fn run(mut cmd: Command, label: &str) -> Result<()> {
    let output = cmd
        .output()
        .await
        .map_err(|e| ProvisionError::Install(format!("failed to run '{label}': {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProvisionError::Install(format!(
            "'{label}' failed (exit {}): {}",
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )));
    }
    Ok(())
}
