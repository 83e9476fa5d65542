use clap::Args;

use stackup_core::services::state::ProcessRecordStore;
use stackup_core::services::supervisor;

use crate::output;
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Services to show; all when omitted.
    pub services: Vec<String>,
}

pub async fn execute(args: StatusArgs, global: &GlobalArgs) -> color_eyre::Result<()> {
    let config = global.load_config()?;
    let catalog = global.load_catalog().await?;

    for descriptor in catalog.plan(&args.services)? {
        let store = ProcessRecordStore::new(&descriptor.paths(&config).record_file);
        let processes = supervisor::status(&store).await?;
        print!("{}", output::render_status(&descriptor.name, &processes));
    }
    Ok(())
}
