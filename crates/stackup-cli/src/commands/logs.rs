use clap::Args;
use color_eyre::eyre::bail;

use stackup_core::services::log_tailer;
use stackup_core::services::orchestrator;
use stackup_core::services::state::ProcessRecordStore;

use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Service whose log to show.
    pub service: String,

    /// Which process of the service, by position in the catalog.
    #[arg(long, short = 'p', default_value_t = 0)]
    pub process: usize,

    /// Number of lines to show.
    #[arg(long, short = 'n', default_value_t = 50)]
    pub lines: usize,

    /// Keep printing lines as they are appended.
    #[arg(long, short = 'f')]
    pub follow: bool,
}

pub async fn execute(args: LogsArgs, global: &GlobalArgs) -> color_eyre::Result<()> {
    let config = global.load_config()?;
    let catalog = global.load_catalog().await?;
    let descriptor = catalog.get(&args.service)?;

    if args.process >= descriptor.processes.len() {
        bail!(
            "service '{}' has {} process(es), no index {}",
            descriptor.name,
            descriptor.processes.len(),
            args.process
        );
    }
    let paths = descriptor.paths(&config);
    // Prefer the path recorded at launch; otherwise render it the way `up` would.
    let recorded = ProcessRecordStore::new(&paths.record_file).load().await?;
    let log_file = match recorded.get(args.process) {
        Some(process) => process.log_file.clone(),
        None => orchestrator::process_log_file(&config, descriptor, args.process)?,
    };

    let tail = log_tailer::read_tail(&log_file, args.lines);
    if !tail.is_empty() {
        println!("{tail}");
    }
    if args.follow {
        log_tailer::follow(&log_file, |line| println!("{line}")).await?;
    }
    Ok(())
}
