//! quill - CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use quill::cli::{self, Cli};
use quill::core::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::from(u8::from(err.exit_code()))
        }
    }
}
