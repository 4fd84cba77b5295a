use std::path::PathBuf;

use clap::{Parser, Subcommand, command};

use crate::bootstrap::APP_ROOT_VAR;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Configuration file, relative to the application root
    #[arg(short, long)]
    pub configuration_path: Option<PathBuf>,

    /// Application root, defaults to the working directory
    #[arg(short, long, env = APP_ROOT_VAR)]
    pub root: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve,
    /// Print the loaded configuration as JSON
    Config,
    /// List the registered routes
    Routes,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
