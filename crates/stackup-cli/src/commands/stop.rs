use std::time::Duration;

use clap::Args;

use stackup_core::services::state::ProcessRecordStore;
use stackup_core::services::supervisor::Supervisor;

use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct StopArgs {
    /// Services to stop; all when omitted.
    pub services: Vec<String>,

    /// Seconds a process gets between SIGTERM and SIGKILL.
    #[arg(long, default_value_t = 10)]
    pub grace_secs: u64,
}

/// Stop services in reverse provisioning order, dependents first.
pub async fn execute(args: StopArgs, global: &GlobalArgs) -> color_eyre::Result<()> {
    let config = global.load_config()?;
    let catalog = global.load_catalog().await?;
    let supervisor = Supervisor::with_grace(Duration::from_secs(args.grace_secs));

    for descriptor in catalog.plan(&args.services)?.into_iter().rev() {
        let store = ProcessRecordStore::new(&descriptor.paths(&config).record_file);
        tracing::debug!(service = %descriptor.name, record = %store.path().display(), "stopping");
        let stopped = supervisor.stop(&store).await?;
        println!("{}: stopped {stopped} process(es)", descriptor.name);
    }
    Ok(())
}
