//! Content-addressed response cache.
//!
//! One JSON file per fingerprint under `responses/` in the cache dir. The
//! cache is strictly best-effort: a read failure is a miss, a write failure
//! is a no-op, and either logs a warning rather than failing the run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{ChatResponse, FinishReason, Usage};
use crate::storage::AppPaths;

/// A cached response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    #[must_use]
    pub fn response(&self) -> ChatResponse {
        ChatResponse {
            text: self.text.clone(),
            usage: self.usage,
            finish_reason: self.finish_reason.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
}

impl ResponseCache {
    #[must_use]
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            dir: paths.cache.join("responses"),
        }
    }

    fn entry_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }

    /// Look up a fingerprint. Any failure is a miss.
    #[must_use]
    pub fn lookup(&self, fingerprint: &str) -> Option<CacheEntry> {
        let path = self.entry_path(fingerprint);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cache read failed; treating as miss");
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "corrupt cache entry; treating as miss");
                None
            }
        }
    }

    /// Store a response. Failures log and are otherwise ignored.
    pub fn store(&self, fingerprint: &str, response: &ChatResponse) {
        let entry = CacheEntry {
            fingerprint: fingerprint.to_string(),
            text: response.text.clone(),
            usage: response.usage,
            finish_reason: response.finish_reason.clone(),
            created_at: Utc::now(),
        };
        let content = match serde_json::to_vec_pretty(&entry) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize cache entry");
                return;
            }
        };
        let path = self.entry_path(fingerprint);
        if let Err(err) = super::write_atomic(&path, &content) {
            tracing::warn!(path = %path.display(), error = %err, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_in(dir: &std::path::Path) -> ResponseCache {
        let paths = AppPaths::new(Some(dir));
        ResponseCache::new(&paths)
    }

    fn response() -> ChatResponse {
        ChatResponse {
            text: "forty-two".to_string(),
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 3,
            }),
            finish_reason: Some(FinishReason::Stop),
        }
    }

    #[test]
    fn store_then_lookup_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());

        cache.store("abc123", &response());
        let entry = cache.lookup("abc123").unwrap();
        assert_eq!(entry.fingerprint, "abc123");
        assert_eq!(entry.response(), response());
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cache_in(dir.path()).lookup("nope").is_none());
    }

    #[test]
    fn corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        cache.store("abc123", &response());
        let path = cache.entry_path("abc123");
        std::fs::write(&path, "garbage").unwrap();
        assert!(cache.lookup("abc123").is_none());
    }

    #[test]
    fn store_into_unwritable_dir_is_a_no_op() {
        let cache = ResponseCache {
            dir: PathBuf::from("/proc/quill-no-such-place"),
        };
        cache.store("abc123", &response());
        assert!(cache.lookup("abc123").is_none());
    }
}
