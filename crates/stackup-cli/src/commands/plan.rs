use clap::Args;

use stackup_core::services::database::MysqlClient;
use stackup_core::services::identity::KeystoneClient;
use stackup_core::services::installer::CommandInstaller;
use stackup_core::services::orchestrator::Orchestrator;

use crate::output;
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Services to inspect; all when omitted.
    pub services: Vec<String>,
}

pub async fn execute(args: PlanArgs, global: &GlobalArgs) -> color_eyre::Result<()> {
    let config = global.load_config()?;
    let catalog = global.load_catalog().await?;

    let database = MysqlClient::from_config(&config)?;
    let identity = KeystoneClient::from_config(&config)?;
    let installer = CommandInstaller::from_config(&config)?;
    let orchestrator = Orchestrator::new(&config, &catalog, &database, &identity, &installer);

    let plans = orchestrator.plan_run(&args.services).await?;
    print!("{}", output::render_plan(&plans));
    Ok(())
}
