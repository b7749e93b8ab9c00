//! Application paths for config, cache, and data.
//!
//! The config directory can be overridden per invocation (`--config-dir` or
//! `QUILL_CONFIG_DIR`); the override is threaded through constructors rather
//! than held in process-wide state.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Environment variable overriding the configuration directory.
pub const ENV_CONFIG_DIR: &str = "QUILL_CONFIG_DIR";

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Configuration directory (settings and API-key files).
    pub config: PathBuf,
    /// Cache directory (response cache).
    pub cache: PathBuf,
    /// Data directory (session files).
    pub data: PathBuf,
}

impl AppPaths {
    /// Create paths for the quill application.
    ///
    /// With an override, config, cache, and data all live under the given
    /// directory so a test or a scripted run is fully self-contained.
    #[must_use]
    pub fn new(config_dir_override: Option<&Path>) -> Self {
        if let Some(dir) = config_dir_override {
            return Self {
                config: dir.to_path_buf(),
                cache: dir.join("cache"),
                data: dir.join("data"),
            };
        }

        if let Some(proj_dirs) = ProjectDirs::from("dev", "quill-cli", "quill") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                cache: proj_dirs.cache_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            let home = directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/quill"),
                cache: home.join(".cache/quill"),
                data: home.join(".local/share/quill"),
            }
        }
    }

    /// Resolve paths from a CLI override, falling back to `QUILL_CONFIG_DIR`.
    #[must_use]
    pub fn resolve(cli_config_dir: Option<&Path>) -> Self {
        if cli_config_dir.is_some() {
            return Self::new(cli_config_dir);
        }
        match std::env::var(ENV_CONFIG_DIR) {
            Ok(dir) if !dir.trim().is_empty() => Self::new(Some(Path::new(&dir))),
            _ => Self::new(None),
        }
    }

    /// Path to the settings file.
    #[must_use]
    pub fn settings_file(&self) -> PathBuf {
        self.config.join("settings.json")
    }

    /// Path to the API-key store.
    #[must_use]
    pub fn keys_file(&self) -> PathBuf {
        self.config.join("keys.json")
    }

    /// Directory holding all session files.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.data.join("sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_keeps_everything_under_one_root() {
        let paths = AppPaths::new(Some(Path::new("/tmp/quill-test")));
        assert_eq!(paths.config, PathBuf::from("/tmp/quill-test"));
        assert!(paths.cache.starts_with("/tmp/quill-test"));
        assert!(paths.data.starts_with("/tmp/quill-test"));
    }

    #[test]
    fn file_names_are_stable() {
        let paths = AppPaths::new(Some(Path::new("/tmp/q")));
        assert!(paths.settings_file().ends_with("settings.json"));
        assert!(paths.keys_file().ends_with("keys.json"));
        assert!(paths.sessions_dir().ends_with("sessions"));
    }
}
