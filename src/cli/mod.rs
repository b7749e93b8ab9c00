//! CLI argument parsing and command dispatch.

pub mod args;
pub mod ask;
pub mod config_cmd;
pub mod providers_cmd;
pub mod session_cmd;

pub use args::{Cli, Commands};

use crate::error::Result;

/// Dispatch the parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config_dir = cli.config_dir.as_deref();
    match cli.command {
        None => ask::run(&cli.ask, config_dir).await,
        Some(Commands::Config(command)) => config_cmd::run(&command, config_dir),
        Some(Commands::Session(command)) => session_cmd::run(&command, config_dir),
        Some(Commands::Providers) => providers_cmd::run(config_dir),
    }
}
