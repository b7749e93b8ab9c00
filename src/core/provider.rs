//! Provider descriptors and availability checks.
//!
//! The provider set is closed: a model reference must resolve to one of
//! these variants or fail with an error that enumerates them.

use serde::{Deserialize, Serialize};

use crate::error::{QuillError, Result};
use crate::storage::keys::KeyStore;

// =============================================================================
// Provider Enum
// =============================================================================

/// Supported text-generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    Mistral,
}

impl Provider {
    /// All providers in display order.
    pub const ALL: &'static [Self] = &[Self::OpenAi, Self::Anthropic, Self::Gemini, Self::Mistral];

    /// Provider assumed when a model reference carries no `provider/` prefix.
    pub const DEFAULT: Self = Self::OpenAi;

    /// Provider id as it appears in model references and config keys.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Mistral => "mistral",
        }
    }

    /// Display name for human output.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
            Self::Mistral => "Mistral",
        }
    }

    /// Environment variable holding this provider's API key.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::Mistral => "MISTRAL_API_KEY",
        }
    }

    /// Default API base URL. Gemini and Mistral are reached through their
    /// OpenAI-compatible endpoints.
    #[must_use]
    pub const fn default_api_base(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Mistral => "https://api.mistral.ai/v1",
        }
    }

    /// Model used when neither flags nor settings name one.
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o-mini",
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::Gemini => "gemini-2.0-flash",
            Self::Mistral => "mistral-small-latest",
        }
    }

    /// Parse a provider id.
    pub fn from_id(name: &str) -> Result<Self> {
        let lower = name.to_lowercase();
        Self::ALL
            .iter()
            .find(|p| p.id() == lower)
            .copied()
            .ok_or_else(|| QuillError::UnknownProvider {
                name: name.to_string(),
                supported: Self::supported_list(),
            })
    }

    /// Comma-separated id list for error messages and help text.
    #[must_use]
    pub fn supported_list() -> String {
        Self::ALL
            .iter()
            .map(|p| p.id())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Look up this provider's API key: environment first, stored keys second.
    ///
    /// Never fails; absence is reported by [`Self::require_key`] at the point
    /// where the message can be actionable.
    #[must_use]
    pub fn api_key(self, keys: &KeyStore) -> Option<String> {
        match std::env::var(self.env_var()) {
            Ok(v) if !v.trim().is_empty() => Some(v),
            _ => keys.get(self.id()).map(ToString::to_string),
        }
    }

    /// Whether credentials are present for this provider.
    #[must_use]
    pub fn is_available(self, keys: &KeyStore) -> bool {
        self.api_key(keys).is_some()
    }

    /// Fetch the API key or fail with an actionable message.
    pub fn require_key(self, keys: &KeyStore) -> Result<String> {
        self.api_key(keys)
            .ok_or_else(|| QuillError::MissingCredentials {
                provider: self.id().to_string(),
                env_var: self.env_var().to_string(),
            })
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}
