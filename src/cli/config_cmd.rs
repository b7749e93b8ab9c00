//! `quill config` subcommands.

use std::path::Path;

use colored::Colorize;

use crate::cli::args::{AskArgs, ConfigCommand};
use crate::core::provider::Provider;
use crate::error::Result;
use crate::storage::{settings, AppPaths, KeyStore, ResolvedSettings, Settings};

pub fn run(command: &ConfigCommand, config_dir: Option<&Path>) -> Result<()> {
    let paths = AppPaths::resolve(config_dir);
    match command {
        ConfigCommand::Show => show(&paths),
        ConfigCommand::Set { key, value } => set(&paths, key, value),
        ConfigCommand::SetKey { provider, key } => set_key(&paths, provider, key),
        ConfigCommand::Reset { key } => reset(&paths, key.as_deref()),
        ConfigCommand::Path => path(&paths),
    }
}

/// Print effective settings, each annotated with its source.
fn show(paths: &AppPaths) -> Result<()> {
    let settings = Settings::load(&paths.settings_file());
    let resolved = ResolvedSettings::resolve(&AskArgs::default(), &settings)?;
    let sources = &resolved.sources;

    println!("{}", "Effective settings".bold());
    print_line("model", &resolved.model.to_string(), &sources.model.to_string());
    print_line(
        "system",
        resolved.system.as_deref().unwrap_or("(none)"),
        &sources.system.to_string(),
    );
    print_line(
        "temperature",
        &resolved.temperature.to_string(),
        &sources.temperature.to_string(),
    );
    print_line(
        "maxOutputTokens",
        &resolved
            .max_output_tokens
            .map_or_else(|| "(provider default)".to_string(), |n| n.to_string()),
        &sources.max_output_tokens.to_string(),
    );
    print_line(
        "stream",
        &resolved.stream.to_string(),
        &sources.stream.to_string(),
    );
    print_line("apiBase", &resolved.api_base, &sources.api_base.to_string());

    if !settings.aliases.is_empty() {
        println!("\n{}", "Aliases".bold());
        for (alias, target) in &settings.aliases {
            println!("  {alias} -> {target}");
        }
    }

    let keys = KeyStore::load(&paths.keys_file());
    println!("\n{}", "Credentials".bold());
    for provider in Provider::ALL {
        let status = if provider.is_available(&keys) {
            "available".green().to_string()
        } else {
            "missing".yellow().to_string()
        };
        println!("  {:<12} {status}", provider.id());
    }
    Ok(())
}

fn print_line(key: &str, value: &str, source: &str) {
    println!("  {key:<16} {value:<40} {}", format!("({source})").dimmed());
}

fn set(paths: &AppPaths, key: &str, value: &str) -> Result<()> {
    let stored = settings::set_value(&paths.settings_file(), key, value)?;
    println!("{key} = {stored}");
    Ok(())
}

fn set_key(paths: &AppPaths, provider: &str, key: &str) -> Result<()> {
    let provider = Provider::from_id(provider)?;
    let keys_file = paths.keys_file();
    let mut keys = KeyStore::load(&keys_file);
    keys.set(provider.id(), key);
    keys.save(&keys_file)?;
    println!("stored API key for {}", provider.id());
    Ok(())
}

fn reset(paths: &AppPaths, key: Option<&str>) -> Result<()> {
    settings::reset(&paths.settings_file(), key)?;
    match key {
        Some(key) => println!("removed {key}"),
        None => println!("settings reset to defaults"),
    }
    Ok(())
}

fn path(paths: &AppPaths) -> Result<()> {
    println!("settings  {}", paths.settings_file().display());
    println!("keys      {}", paths.keys_file().display());
    println!("sessions  {}", paths.sessions_dir().display());
    println!("cache     {}", paths.cache.join("responses").display());
    Ok(())
}
