use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Start a local backend + frontend pair, reusing a backend that is already up.
#[derive(Debug, Parser)]
#[command(name = "devstack", version)]
pub struct Cli {
    /// Project root holding the backend and frontend directories.
    #[arg(long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Config file to use instead of `<root>/.devstack.yaml`.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Also write debug-level logs to `<root>/.devstack-debug.log`.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Resolve the backend, sync config, start everything and wait for Ctrl+C.
    Up,
    /// Only resolve the backend port and write the detection report.
    Detect {
        /// Rewrite config artifacts to the resolved endpoint.
        #[arg(long)]
        sync: bool,
    },
    /// Validate config artifacts and environment variables.
    Check,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Up)
    }
}
