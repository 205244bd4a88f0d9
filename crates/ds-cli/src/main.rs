use std::process::ExitCode;

use clap::Parser;

use ds_cli::cli::{Cli, Command};
use ds_cli::{commands, logging};
use ds_core::services::config_loader;

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;

    // Usage errors exit with 2 from here.
    let cli = Cli::parse();
    let _guard = logging::init(&cli.root, cli.debug);

    let (config, config_path) = config_loader::resolve(&cli.root, cli.config.as_deref())?;
    match &config_path {
        Some(path) => tracing::debug!(path = %path.display(), "loaded config"),
        None => tracing::debug!("using default config"),
    }

    match cli.command() {
        Command::Up => commands::up(&cli.root, config).await,
        Command::Detect { sync } => commands::detect(&cli.root, config, sync).await,
        Command::Check => Ok(commands::check(&cli.root, &config)),
    }
}
