//! `quill session` subcommands.

use std::path::Path;

use crate::cli::args::{ExportFormat, SessionCommand};
use crate::error::Result;
use crate::storage::{AppPaths, SessionStore};

pub fn run(command: &SessionCommand, config_dir: Option<&Path>) -> Result<()> {
    let paths = AppPaths::resolve(config_dir);
    let store = SessionStore::new(&paths);
    match command {
        SessionCommand::List => list(&store),
        SessionCommand::Export { name, format } => export(&store, name, *format),
        SessionCommand::Import { name, file } => import(&store, name, file),
        SessionCommand::Delete { name } => delete(&store, name),
    }
}

fn list(store: &SessionStore) -> Result<()> {
    let names = store.list()?;
    if names.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for name in names {
        let session = store.load(&name)?;
        println!(
            "{name}  ({} turns, ${:.4} spent)",
            session.messages.len(),
            session.cumulative_cost
        );
    }
    Ok(())
}

fn export(store: &SessionStore, name: &str, format: ExportFormat) -> Result<()> {
    let session = store.load(name)?;
    match format {
        ExportFormat::Json => println!("{}", serde_json::to_string_pretty(&session)?),
        ExportFormat::Text => print!("{}", session.transcript()),
    }
    Ok(())
}

fn import(store: &SessionStore, name: &str, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)?;
    let session = store.import(name, &content)?;
    println!("imported {} turn(s) into '{name}'", session.messages.len());
    Ok(())
}

fn delete(store: &SessionStore, name: &str) -> Result<()> {
    store.delete(name)?;
    println!("deleted session '{name}'");
    Ok(())
}
