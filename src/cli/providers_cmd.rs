//! `quill providers` - list the provider set and credential availability.

use std::path::Path;

use colored::Colorize;

use crate::core::provider::Provider;
use crate::error::Result;
use crate::storage::{AppPaths, KeyStore};

pub fn run(config_dir: Option<&Path>) -> Result<()> {
    let paths = AppPaths::resolve(config_dir);
    let keys = KeyStore::load(&paths.keys_file());

    for provider in Provider::ALL {
        let id = provider.id();
        if provider.is_available(&keys) {
            println!(
                "{} {:<10} {} (default model: {})",
                "✓".green(),
                id,
                provider.display_name(),
                provider.default_model()
            );
        } else {
            println!(
                "{} {:<10} {} - set {} or run: quill config set-key {id} <key>",
                "✗".red(),
                id,
                provider.display_name(),
                provider.env_var()
            );
        }
    }
    Ok(())
}
