use std::path::Path;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use stackup_cli::{commands, Cli, Commands};

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let Cli { global, command } = Cli::parse();
    let _guard = setup_logging(global.log_file.as_deref());

    // Strictly sequential: one thread, no spawned tasks.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        match command {
            Commands::Up(args) => commands::up::execute(args, &global).await,
            Commands::Plan(args) => commands::plan::execute(args, &global).await,
            Commands::Stop(args) => commands::stop::execute(args, &global).await,
            Commands::Status(args) => commands::status::execute(args, &global).await,
            Commands::Logs(args) => commands::logs::execute(args, &global).await,
        }
    })
}

/// Log to stderr, and also to `log_file` when given.
/// Returns the guard that must be held alive for the duration of the program.
fn setup_logging(log_file: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "stackup.log".into());
            let file_appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file_layer)
        .init();

    guard
}
