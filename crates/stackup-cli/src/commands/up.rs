use std::time::Duration;

use clap::Args;
use color_eyre::eyre::eyre;

use stackup_core::services::database::MysqlClient;
use stackup_core::services::identity::KeystoneClient;
use stackup_core::services::installer::CommandInstaller;
use stackup_core::services::orchestrator::Orchestrator;
use stackup_core::services::supervisor::Supervisor;
use stackup_core::ProvisionError;

use crate::output;
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct UpArgs {
    /// Services to provision; all when omitted. Catalog order is kept.
    pub services: Vec<String>,

    /// Seconds a process gets between SIGTERM and SIGKILL when restarting.
    #[arg(long, default_value_t = 10)]
    pub grace_secs: u64,
}

pub async fn execute(args: UpArgs, global: &GlobalArgs) -> color_eyre::Result<()> {
    let config = global.load_config()?;
    let catalog = global.load_catalog().await?;

    let database = MysqlClient::from_config(&config)?;
    let identity = KeystoneClient::from_config(&config)?;
    let installer = CommandInstaller::from_config(&config)?;
    let orchestrator = Orchestrator::new(&config, &catalog, &database, &identity, &installer)
        .with_supervisor(Supervisor::with_grace(Duration::from_secs(args.grace_secs)));

    match orchestrator.run(&args.services).await {
        Ok(report) => {
            tracing::info!(services = report.services.len(), "all services running");
            print!("{}", output::render_run(&report));
            Ok(())
        }
        Err(ProvisionError::ServiceDidNotStart {
            service,
            url,
            timeout_secs,
        }) if catalog.get(&service).is_ok_and(|s| s.provides_identity) => Err(eyre!(
            "identity service '{service}' did not answer {url} within {timeout_secs}s; \
             services depending on it were not started"
        )),
        Err(e) => Err(e.into()),
    }
}
