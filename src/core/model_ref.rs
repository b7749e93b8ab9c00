//! Model reference parsing and alias resolution.

use std::collections::BTreeMap;
use std::fmt;

use crate::core::provider::Provider;
use crate::error::{QuillError, Result};

/// A fully resolved `provider/model` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReference {
    pub provider: Provider,
    /// Provider-side model identifier, passed through to the API verbatim.
    pub model: String,
}

impl ModelReference {
    /// Resolve a user-supplied model string against the alias table.
    ///
    /// Aliases are looked up exactly once, before parsing, so an alias can
    /// expand to any valid reference but can never point at another alias.
    /// A bare model id with no `/` maps to the default provider.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty or malformed reference, an unknown
    /// provider prefix, or an alias whose target is itself an alias.
    pub fn resolve(input: &str, aliases: &BTreeMap<String, String>) -> Result<Self> {
        let expanded = match aliases.get(input.trim()) {
            Some(target) => {
                if aliases.contains_key(target.trim()) {
                    return Err(QuillError::AliasChain {
                        alias: input.trim().to_string(),
                        target: target.trim().to_string(),
                    });
                }
                target.as_str()
            }
            None => input,
        };
        Self::parse(expanded)
    }

    /// Parse a `provider/model` or bare `model` string.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(QuillError::InvalidModelFormat {
                reason: "model reference is empty".to_string(),
            });
        }

        match input.split_once('/') {
            Some((prefix, rest)) => {
                if rest.is_empty() {
                    return Err(QuillError::InvalidModelFormat {
                        reason: format!("'{input}' is missing a model id after the provider"),
                    });
                }
                let provider = Provider::from_id(prefix)?;
                Ok(Self {
                    provider,
                    model: rest.to_string(),
                })
            }
            None => Ok(Self {
                provider: Provider::DEFAULT,
                model: input.to_string(),
            }),
        }
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider.id(), self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_aliases() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn parses_provider_and_model() {
        let model = ModelReference::resolve("anthropic/claude-3-5-haiku-latest", &no_aliases()).unwrap();
        assert_eq!(model.provider, Provider::Anthropic);
        assert_eq!(model.model, "claude-3-5-haiku-latest");
        assert_eq!(model.to_string(), "anthropic/claude-3-5-haiku-latest");
    }

    #[test]
    fn bare_model_uses_default_provider() {
        let model = ModelReference::resolve("gpt-4o", &no_aliases()).unwrap();
        assert_eq!(model.provider, Provider::DEFAULT);
        assert_eq!(model.model, "gpt-4o");
    }

    #[test]
    fn model_id_may_contain_slashes() {
        // Only the first '/' separates the provider prefix.
        let model = ModelReference::resolve("mistral/org/custom-model", &no_aliases()).unwrap();
        assert_eq!(model.provider, Provider::Mistral);
        assert_eq!(model.model, "org/custom-model");
    }

    #[test]
    fn unknown_provider_lists_supported_ones() {
        let err = ModelReference::resolve("cohere/command-r", &no_aliases()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("cohere"));
        assert!(message.contains("openai"));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            ModelReference::resolve("  ", &no_aliases()),
            Err(QuillError::InvalidModelFormat { .. })
        ));
        assert!(matches!(
            ModelReference::resolve("openai/", &no_aliases()),
            Err(QuillError::InvalidModelFormat { .. })
        ));
    }

    #[test]
    fn alias_expands_once() {
        let mut aliases = no_aliases();
        aliases.insert("fast".to_string(), "anthropic/claude-3-5-haiku-latest".to_string());
        let model = ModelReference::resolve("fast", &aliases).unwrap();
        assert_eq!(model.provider, Provider::Anthropic);
    }

    #[test]
    fn alias_pointing_at_alias_is_rejected() {
        let mut aliases = no_aliases();
        aliases.insert("a".to_string(), "b".to_string());
        aliases.insert("b".to_string(), "openai/gpt-4o".to_string());
        assert!(matches!(
            ModelReference::resolve("a", &aliases),
            Err(QuillError::AliasChain { .. })
        ));
    }

    #[test]
    fn alias_target_is_parsed_like_direct_input() {
        let mut aliases = no_aliases();
        aliases.insert("bad".to_string(), "nosuch/model".to_string());
        assert!(matches!(
            ModelReference::resolve("bad", &aliases),
            Err(QuillError::UnknownProvider { .. })
        ));
    }
}
