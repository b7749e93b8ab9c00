//! API-key store.
//!
//! A flat JSON object mapping provider id to secret, kept separate from the
//! settings file and consulted only as a fallback behind environment
//! variables. A missing or corrupt file degrades to an empty store so a
//! user running with env credentials is never blocked.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::write_atomic;

/// Provider id → secret.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyStore {
    keys: BTreeMap<String, String>,
}

impl KeyStore {
    /// Load the store, degrading to empty on any read or parse failure.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(?path, error = %e, "ignoring malformed key store");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Persist the store atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, content.as_bytes())?;
        Ok(())
    }

    /// Stored key for a provider id, if any.
    #[must_use]
    pub fn get(&self, provider: &str) -> Option<&str> {
        self.keys
            .get(provider)
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }

    /// Set or replace a provider's key.
    pub fn set(&mut self, provider: &str, key: &str) {
        self.keys.insert(provider.to_string(), key.to_string());
    }
}
