//! The default command: send a prompt.

use std::io::{IsTerminal, Read};
use std::path::Path;

use crate::cli::args::AskArgs;
use crate::core::orchestrator;
use crate::error::Result;

/// Read piped stdin and hand the request to the orchestrator.
pub async fn run(args: &AskArgs, config_dir: Option<&Path>) -> Result<()> {
    let stdin = read_piped_stdin()?;
    orchestrator::run(args, config_dir, stdin).await
}

/// Stdin contributes to the prompt only when it is piped, never when it is
/// an interactive terminal.
fn read_piped_stdin() -> Result<Option<String>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    if buffer.is_empty() {
        Ok(None)
    } else {
        Ok(Some(buffer))
    }
}
