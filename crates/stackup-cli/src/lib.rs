//! The `stackup` command line.
//!
//! Every command reads the deployment parameters from `--config` and the
//! service catalog from `--catalog`; `--set KEY=VALUE` overrides single
//! parameters for one invocation.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::WrapErr;

use stackup_core::models::DeploymentConfig;
use stackup_core::services::catalog::Catalog;
use stackup_core::services::config_loader;

#[derive(Debug, Parser)]
#[command(name = "stackup", version, about = "Idempotent service provisioning")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Deployment parameter file (flat KEY: value YAML).
    #[arg(
        long,
        global = true,
        env = "STACKUP_CONFIG",
        default_value = "/etc/stackup/stackup.yaml"
    )]
    pub config: PathBuf,

    /// Service catalog; template paths are relative to its directory.
    #[arg(
        long,
        global = true,
        env = "STACKUP_CATALOG",
        default_value = "/etc/stackup/services.yaml"
    )]
    pub catalog: PathBuf,

    /// Override a deployment parameter. Repeatable.
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = parse_set)]
    pub overrides: Vec<(String, String)>,

    /// Also write logs to this file.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Provision services and start their processes.
    Up(commands::up::UpArgs),
    /// Show what `up` would do without changing anything.
    Plan(commands::plan::PlanArgs),
    /// Stop the recorded processes of services.
    Stop(commands::stop::StopArgs),
    /// Show recorded processes and whether they are alive.
    Status(commands::status::StatusArgs),
    /// Print or follow a service's process log.
    Logs(commands::logs::LogsArgs),
}

fn parse_set(raw: &str) -> Result<(String, String), String> {
    config_loader::parse_override(raw).map_err(|e| e.to_string())
}

impl GlobalArgs {
    pub fn load_config(&self) -> color_eyre::Result<DeploymentConfig> {
        config_loader::load(&self.config, &self.overrides)
            .wrap_err_with(|| format!("loading {}", self.config.display()))
    }

    pub async fn load_catalog(&self) -> color_eyre::Result<Catalog> {
        Catalog::load(&self.catalog)
            .await
            .wrap_err_with(|| format!("loading {}", self.catalog.display()))
    }
}
