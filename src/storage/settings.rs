//! Settings file loading, dot-path editing, and precedence resolution.
//!
//! Settings live in `settings.json` under the config directory. Values are
//! resolved with the following precedence (highest first):
//!
//! 1. CLI flags
//! 2. Per-provider override block (`providers.<id>.*`)
//! 3. Settings file top-level keys
//! 4. Built-in defaults
//!
//! API keys are the one exception: they come from environment variables
//! first, then `keys.json` (see [`crate::storage::keys`]).
//!
//! A missing or malformed settings file never blocks a run. Structural
//! damage degrades to defaults with a warning; an out-of-range value is
//! dropped on load (a warning names the key) and rejected outright by
//! `config set`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cli::args::AskArgs;
use crate::core::model_ref::ModelReference;
use crate::core::provider::Provider;
use crate::error::{QuillError, Result};

/// Default sampling temperature when nothing else specifies one.
pub const DEFAULT_TEMPERATURE: f64 = 1.0;
/// Inclusive temperature bounds accepted from any source.
pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);

// =============================================================================
// Settings File
// =============================================================================

/// Per-provider overrides from the `providers` block of the settings file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL override for this provider's API.
    #[serde(rename = "apiBase", skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Temperature override applied when this provider is selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Output token cap override applied when this provider is selected.
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Unrecognized keys are kept so round-tripping the file never loses data.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Raw contents of `settings.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Default model reference (e.g. "anthropic/claude-3-5-haiku-latest").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Default system prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Default sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Default output token cap.
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Whether responses stream by default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Model aliases, resolved exactly once (no chains).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aliases: BTreeMap<String, String>,
    /// Per-provider override blocks, keyed by provider id.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub providers: BTreeMap<String, ProviderSettings>,
    /// Unrecognized keys are preserved but ignored.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl Settings {
    /// Load settings from `path`.
    ///
    /// A missing file yields defaults. A file that fails to parse also
    /// yields defaults, with a warning, so a broken settings file can
    /// always be repaired with `quill config reset`.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read settings file; using defaults");
                return Self::default();
            }
        };

        match serde_json::from_str::<Self>(&content) {
            Ok(mut settings) => {
                settings.drop_invalid_values();
                settings
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "settings file is not valid JSON; using defaults");
                Self::default()
            }
        }
    }

    /// Drop out-of-range values loaded from disk, warning per key.
    ///
    /// `config set` rejects these up front; this path covers files edited
    /// by hand.
    fn drop_invalid_values(&mut self) {
        if let Some(t) = self.temperature {
            if !temperature_in_range(t) {
                tracing::warn!(value = t, "ignoring temperature outside [0, 2] in settings file");
                self.temperature = None;
            }
        }
        if self.max_output_tokens == Some(0) {
            tracing::warn!("ignoring maxOutputTokens of 0 in settings file");
            self.max_output_tokens = None;
        }
        for (id, overrides) in &mut self.providers {
            if let Some(t) = overrides.temperature {
                if !temperature_in_range(t) {
                    tracing::warn!(provider = %id, value = t, "ignoring provider temperature outside [0, 2]");
                    overrides.temperature = None;
                }
            }
            if overrides.max_output_tokens == Some(0) {
                tracing::warn!(provider = %id, "ignoring provider maxOutputTokens of 0");
                overrides.max_output_tokens = None;
            }
        }
    }

    /// Overrides for `provider`, if the settings file has a block for it.
    pub fn provider_overrides(&self, provider: Provider) -> Option<&ProviderSettings> {
        self.providers.get(provider.id())
    }
}

fn temperature_in_range(t: f64) -> bool {
    t >= TEMPERATURE_RANGE.0 && t <= TEMPERATURE_RANGE.1
}

// =============================================================================
// Dot-Path Editing
// =============================================================================

/// Recognized top-level settings keys, shown in `config set` errors.
const KNOWN_KEYS: &[&str] = &[
    "model",
    "system",
    "temperature",
    "maxOutputTokens",
    "stream",
    "aliases.<name>",
    "providers.<id>.apiBase",
    "providers.<id>.temperature",
    "providers.<id>.maxOutputTokens",
];

/// Coerce and validate a raw `config set` value for `key`.
///
/// Coercion happens here, at ingestion, so a bad value is rejected with a
/// descriptive error instead of being persisted and failing later.
pub fn coerce_value(key: &str, raw: &str) -> Result<Value> {
    let segments: Vec<&str> = key.split('.').collect();
    match segments.as_slice() {
        ["model" | "system"] => Ok(Value::String(raw.to_string())),
        ["temperature"] | ["providers", _, "temperature"] => {
            let t: f64 = raw.parse().map_err(|_| QuillError::ConfigInvalid {
                key: key.to_string(),
                value: raw.to_string(),
                message: "expected a number".to_string(),
            })?;
            if !temperature_in_range(t) {
                return Err(QuillError::ConfigInvalid {
                    key: key.to_string(),
                    value: raw.to_string(),
                    message: format!(
                        "temperature must be between {} and {}",
                        TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1
                    ),
                });
            }
            Ok(serde_json::json!(t))
        }
        ["maxOutputTokens"] | ["providers", _, "maxOutputTokens"] => {
            let n: u32 = raw.parse().map_err(|_| QuillError::ConfigInvalid {
                key: key.to_string(),
                value: raw.to_string(),
                message: "expected a positive integer".to_string(),
            })?;
            if n == 0 {
                return Err(QuillError::ConfigInvalid {
                    key: key.to_string(),
                    value: raw.to_string(),
                    message: "maxOutputTokens must be at least 1".to_string(),
                });
            }
            Ok(serde_json::json!(n))
        }
        ["stream"] => match raw {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(QuillError::ConfigInvalid {
                key: key.to_string(),
                value: raw.to_string(),
                message: "expected 'true' or 'false'".to_string(),
            }),
        },
        ["aliases", name] => {
            if name.is_empty() {
                return Err(QuillError::ConfigUnknownKey {
                    key: key.to_string(),
                });
            }
            Ok(Value::String(raw.to_string()))
        }
        ["providers", id, "apiBase"] => {
            // Validate the provider id so typos fail loudly.
            Provider::from_id(id)?;
            Ok(Value::String(raw.to_string()))
        }
        _ => Err(QuillError::ConfigUnknownKey {
            key: key.to_string(),
        }),
    }
}

/// Set `key` (a dot path) to `value` in the settings file at `path`.
///
/// Intermediate objects are created as needed; sibling keys are preserved
/// byte-for-byte as JSON values. The write is atomic.
pub fn set_value(path: &Path, key: &str, raw: &str) -> Result<Value> {
    // Provider temperature/maxOutputTokens share coercion with the top-level
    // keys but still need a known provider id.
    let segments: Vec<&str> = key.split('.').collect();
    if let ["providers", id, _] = segments.as_slice() {
        Provider::from_id(id)?;
    }
    let coerced = coerce_value(key, raw)?;

    let mut doc = load_raw(path)?;
    let mut cursor = &mut doc;
    for segment in &segments[..segments.len() - 1] {
        let map = cursor.as_object_mut().ok_or_else(|| QuillError::ConfigInvalid {
            key: key.to_string(),
            value: raw.to_string(),
            message: format!("'{segment}' is not an object in the settings file"),
        })?;
        cursor = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    let last = segments[segments.len() - 1];
    let map = cursor.as_object_mut().ok_or_else(|| QuillError::ConfigInvalid {
        key: key.to_string(),
        value: raw.to_string(),
        message: "parent of this key is not an object in the settings file".to_string(),
    })?;
    map.insert(last.to_string(), coerced.clone());

    save_raw(path, &doc)?;
    Ok(coerced)
}

/// Remove `key` from the settings file, or delete the whole file when
/// `key` is `None`.
pub fn reset(path: &Path, key: Option<&str>) -> Result<()> {
    let Some(key) = key else {
        match std::fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    };

    let mut doc = load_raw(path)?;
    let segments: Vec<&str> = key.split('.').collect();
    let mut cursor = &mut doc;
    for segment in &segments[..segments.len() - 1] {
        match cursor.get_mut(*segment) {
            Some(next) => cursor = next,
            // Nothing to remove.
            None => return Ok(()),
        }
    }
    if let Some(map) = cursor.as_object_mut() {
        map.remove(segments[segments.len() - 1]);
    }
    save_raw(path, &doc)
}

/// List of recognized keys, for `config set` error messages and help.
pub fn known_keys() -> &'static [&'static str] {
    KNOWN_KEYS
}

fn load_raw(path: &Path) -> Result<Value> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            serde_json::from_str(&content).map_err(|err| QuillError::ConfigInvalid {
                key: "(file)".to_string(),
                value: path.display().to_string(),
                message: format!("settings file is not valid JSON: {err}"),
            })
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Ok(Value::Object(serde_json::Map::new()))
        }
        Err(err) => Err(err.into()),
    }
}

fn save_raw(path: &Path, doc: &Value) -> Result<()> {
    let mut content = serde_json::to_string_pretty(doc)?;
    content.push('\n');
    super::write_atomic(path, content.as_bytes())?;
    Ok(())
}

// =============================================================================
// Resolved Settings
// =============================================================================

/// Where a resolved setting came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from a CLI flag.
    Cli,
    /// Value from an environment variable.
    Env,
    /// Value from a `providers.<id>` override block.
    ProviderOverride,
    /// Value from a top-level settings file key.
    SettingsFile,
    /// Built-in default.
    #[default]
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ProviderOverride => write!(f, "provider override"),
            Self::SettingsFile => write!(f, "settings file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Source of each resolved setting, for `config show`.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub model: ConfigSource,
    pub system: ConfigSource,
    pub temperature: ConfigSource,
    pub max_output_tokens: ConfigSource,
    pub stream: ConfigSource,
    pub api_base: ConfigSource,
}

/// Fully resolved request settings after merging CLI flags, provider
/// overrides, and the settings file.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    /// The resolved model, alias already expanded.
    pub model: ModelReference,
    /// System prompt, if any.
    pub system: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output token cap, if any source set one.
    pub max_output_tokens: Option<u32>,
    /// Whether to stream the response.
    pub stream: bool,
    /// Base URL for the resolved provider's API.
    pub api_base: String,
    /// Source of each value.
    pub sources: ConfigSources,
}

impl ResolvedSettings {
    /// Resolve final request settings.
    ///
    /// The model is resolved first because the per-provider override block
    /// only applies once the provider is known.
    ///
    /// # Errors
    ///
    /// Returns an error if the model reference is malformed, names an
    /// unknown provider, or an alias points at another alias; or if a CLI
    /// value fails validation.
    pub fn resolve(args: &AskArgs, settings: &Settings) -> Result<Self> {
        let mut sources = ConfigSources::default();

        let model_input = match &args.model {
            Some(model) => {
                sources.model = ConfigSource::Cli;
                model.clone()
            }
            None => match &settings.model {
                Some(model) => {
                    sources.model = ConfigSource::SettingsFile;
                    model.clone()
                }
                None => {
                    sources.model = ConfigSource::Default;
                    Provider::DEFAULT.default_model().to_string()
                }
            },
        };
        let model = ModelReference::resolve(&model_input, &settings.aliases)?;
        let overrides = settings.provider_overrides(model.provider);

        let system = Self::resolve_system(args, settings, &mut sources.system);
        let temperature = Self::resolve_temperature(args, settings, overrides, &mut sources.temperature)?;
        let max_output_tokens =
            Self::resolve_max_tokens(args, settings, overrides, &mut sources.max_output_tokens)?;
        let stream = Self::resolve_stream(args, settings, &mut sources.stream);
        let api_base = Self::resolve_api_base(model.provider, overrides, &mut sources.api_base);

        Ok(Self {
            model,
            system,
            temperature,
            max_output_tokens,
            stream,
            api_base,
            sources,
        })
    }

    fn resolve_system(
        args: &AskArgs,
        settings: &Settings,
        source: &mut ConfigSource,
    ) -> Option<String> {
        if let Some(system) = &args.system {
            *source = ConfigSource::Cli;
            return Some(system.clone());
        }
        if let Some(system) = &settings.system {
            *source = ConfigSource::SettingsFile;
            return Some(system.clone());
        }
        *source = ConfigSource::Default;
        None
    }

    fn resolve_temperature(
        args: &AskArgs,
        settings: &Settings,
        overrides: Option<&ProviderSettings>,
        source: &mut ConfigSource,
    ) -> Result<f64> {
        if let Some(t) = args.temperature {
            if !temperature_in_range(t) {
                return Err(QuillError::ConfigInvalid {
                    key: "temperature".to_string(),
                    value: t.to_string(),
                    message: format!(
                        "temperature must be between {} and {}",
                        TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1
                    ),
                });
            }
            *source = ConfigSource::Cli;
            return Ok(t);
        }
        if let Some(t) = overrides.and_then(|o| o.temperature) {
            *source = ConfigSource::ProviderOverride;
            return Ok(t);
        }
        if let Some(t) = settings.temperature {
            *source = ConfigSource::SettingsFile;
            return Ok(t);
        }
        *source = ConfigSource::Default;
        Ok(DEFAULT_TEMPERATURE)
    }

    fn resolve_max_tokens(
        args: &AskArgs,
        settings: &Settings,
        overrides: Option<&ProviderSettings>,
        source: &mut ConfigSource,
    ) -> Result<Option<u32>> {
        if let Some(n) = args.max_tokens {
            if n == 0 {
                return Err(QuillError::ConfigInvalid {
                    key: "max-tokens".to_string(),
                    value: n.to_string(),
                    message: "max-tokens must be at least 1".to_string(),
                });
            }
            *source = ConfigSource::Cli;
            return Ok(Some(n));
        }
        if let Some(n) = overrides.and_then(|o| o.max_output_tokens) {
            *source = ConfigSource::ProviderOverride;
            return Ok(Some(n));
        }
        if let Some(n) = settings.max_output_tokens {
            *source = ConfigSource::SettingsFile;
            return Ok(Some(n));
        }
        *source = ConfigSource::Default;
        Ok(None)
    }

    fn resolve_stream(args: &AskArgs, settings: &Settings, source: &mut ConfigSource) -> bool {
        if args.stream {
            *source = ConfigSource::Cli;
            return true;
        }
        if args.no_stream {
            *source = ConfigSource::Cli;
            return false;
        }
        if let Some(stream) = settings.stream {
            *source = ConfigSource::SettingsFile;
            return stream;
        }
        *source = ConfigSource::Default;
        false
    }

    fn resolve_api_base(
        provider: Provider,
        overrides: Option<&ProviderSettings>,
        source: &mut ConfigSource,
    ) -> String {
        if let Some(base) = overrides.and_then(|o| o.api_base.as_deref()) {
            *source = ConfigSource::ProviderOverride;
            return base.trim_end_matches('/').to_string();
        }
        *source = ConfigSource::Default;
        provider.default_api_base().to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================
