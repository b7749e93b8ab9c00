//! Error types for quill.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! The taxonomy follows how each failure is handled:
//! - **Usage**: the user must correct the invocation (bad model reference,
//!   unknown provider, empty prompt, invalid config value)
//! - **Credentials**: no key found for the resolved provider
//! - **Budget**: the cost ceiling would be exceeded
//! - **Backend**: the generation call failed; split into retryable
//!   (rate limit, transient network/server) and fatal (4xx) conditions
//! - **Persistence**: session I/O is surfaced, cache I/O is swallowed
//!   to a no-op at the cache layer and never reaches this type

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// The invocation itself was wrong (model, provider, prompt, config value)
    UsageError = 2,
    /// Budget ceiling would be exceeded
    BudgetExceeded = 3,
    /// Backend call failed, including after retries
    BackendError = 4,
    /// User interrupt during streaming
    Interrupted = 130,
}

impl From<ExitCode> for u8 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for quill operations.
#[derive(Error, Debug)]
pub enum QuillError {
    // ==========================================================================
    // Usage errors
    // ==========================================================================
    /// Model reference string could not be parsed.
    #[error("invalid model reference: {reason}")]
    InvalidModelFormat { reason: String },

    /// Parsed provider is not in the supported set.
    #[error("unknown provider '{name}'. Supported providers: {supported}")]
    UnknownProvider { name: String, supported: String },

    /// Alias target is itself an alias; chains are not followed.
    #[error("alias '{alias}' points to another alias '{target}'; alias chains are not allowed")]
    AliasChain { alias: String, target: String },

    /// No prompt content from any source.
    #[error("empty prompt: provide arguments, pipe input on stdin, or set a system prompt")]
    EmptyPrompt,

    /// Invalid value for a recognized configuration key.
    #[error("invalid config value for '{key}': '{value}' ({message})")]
    ConfigInvalid {
        key: String,
        value: String,
        message: String,
    },

    /// Unrecognized configuration key passed to `config set`.
    #[error("unknown config key '{key}'")]
    ConfigUnknownKey { key: String },

    /// Session name would escape the sessions directory.
    #[error("invalid session name '{name}': names cannot be empty or contain path separators")]
    InvalidSessionName { name: String },

    // ==========================================================================
    // Credentials
    // ==========================================================================
    /// No API key found for the resolved provider.
    #[error(
        "no credentials found for provider '{provider}'; set {env_var} or run: quill config set-key {provider} <key>"
    )]
    MissingCredentials { provider: String, env_var: String },

    // ==========================================================================
    // Budget
    // ==========================================================================
    /// Projected or accumulated cost exceeds the configured ceiling.
    #[error("budget exceeded: ${projected:.4} projected against ${limit:.4} limit (${spent:.4} already spent)")]
    BudgetExceeded {
        projected: f64,
        spent: f64,
        limit: f64,
    },

    // ==========================================================================
    // Backend errors (retryable)
    // ==========================================================================
    /// Rate limited by the provider.
    #[error("rate limited by {provider}: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// Provider returned a 5xx or is otherwise temporarily down.
    #[error("provider {provider} unavailable (HTTP {status}): {message}")]
    BackendUnavailable {
        provider: String,
        status: u16,
        message: String,
    },

    /// Transient network failure (connect, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timeout after {0}s")]
    Timeout(u64),

    // ==========================================================================
    // Backend errors (fatal)
    // ==========================================================================
    /// Provider rejected the request (4xx other than 429).
    #[error("provider {provider} rejected the request (HTTP {status}): {message}")]
    BackendRejected {
        provider: String,
        status: u16,
        message: String,
    },

    /// Response body did not match the expected wire format.
    #[error("failed to parse {provider} response: {message}")]
    BackendParse { provider: String, message: String },

    /// Retries exhausted; carries the last observed error.
    #[error("{source} (after {attempts} attempt(s))")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<QuillError>,
    },

    // ==========================================================================
    // Persistence
    // ==========================================================================
    /// Session file could not be read or written.
    #[error("session '{name}': {message}")]
    SessionIo { name: String, message: String },

    /// Imported session document is malformed.
    #[error("cannot import session: {0}")]
    SessionImport(String),

    // ==========================================================================
    // Interrupt
    // ==========================================================================
    /// Streaming was cancelled by the user.
    #[error("interrupted")]
    Interrupted,

    // ==========================================================================
    // I/O and catch-all
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QuillError {
    /// Map error to a process exit code.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::InvalidModelFormat { .. }
            | Self::UnknownProvider { .. }
            | Self::AliasChain { .. }
            | Self::EmptyPrompt
            | Self::ConfigInvalid { .. }
            | Self::ConfigUnknownKey { .. }
            | Self::InvalidSessionName { .. }
            | Self::MissingCredentials { .. }
            | Self::SessionImport(_) => ExitCode::UsageError,

            Self::BudgetExceeded { .. } => ExitCode::BudgetExceeded,

            Self::RateLimited { .. }
            | Self::BackendUnavailable { .. }
            | Self::Network(_)
            | Self::Timeout(_)
            | Self::BackendRejected { .. }
            | Self::BackendParse { .. } => ExitCode::BackendError,

            Self::RetryExhausted { source, .. } => source.exit_code(),

            Self::Interrupted => ExitCode::Interrupted,

            Self::SessionIo { .. } | Self::Io(_) | Self::Json(_) | Self::Other(_) => {
                ExitCode::GeneralError
            }
        }
    }

    /// Whether the error is worth retrying.
    ///
    /// A pure function of the error itself: rate limits and transient
    /// network/server failures retry, everything else is terminal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::BackendUnavailable { .. }
                | Self::Network(_)
                | Self::Timeout(_)
        )
    }

    /// Server-suggested retry delay, if the error carries one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Provider name, if the error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::MissingCredentials { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::BackendUnavailable { provider, .. }
            | Self::BackendRejected { provider, .. }
            | Self::BackendParse { provider, .. } => Some(provider),
            Self::RetryExhausted { source, .. } => source.provider(),
            _ => None,
        }
    }
}

/// Result type alias for quill operations.
pub type Result<T> = std::result::Result<T, QuillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_errors_exit_with_two() {
        let err = QuillError::InvalidModelFormat {
            reason: "empty string".to_string(),
        };
        assert_eq!(err.exit_code(), ExitCode::UsageError);

        let err = QuillError::UnknownProvider {
            name: "bogus".to_string(),
            supported: "openai, anthropic".to_string(),
        };
        assert_eq!(err.exit_code(), ExitCode::UsageError);

        assert_eq!(QuillError::EmptyPrompt.exit_code(), ExitCode::UsageError);
    }

    #[test]
    fn budget_exceeded_exit_code() {
        let err = QuillError::BudgetExceeded {
            projected: 1.3,
            spent: 0.8,
            limit: 1.0,
        };
        assert_eq!(err.exit_code(), ExitCode::BudgetExceeded);
    }

    #[test]
    fn retryable_classification() {
        assert!(QuillError::Timeout(30).is_retryable());
        assert!(QuillError::Network("connection reset".to_string()).is_retryable());
        assert!(
            QuillError::RateLimited {
                provider: "openai".to_string(),
                retry_after: None,
                message: "slow down".to_string(),
            }
            .is_retryable()
        );
        assert!(
            QuillError::BackendUnavailable {
                provider: "anthropic".to_string(),
                status: 503,
                message: "overloaded".to_string(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn fatal_errors_are_not_retryable() {
        assert!(
            !QuillError::BackendRejected {
                provider: "openai".to_string(),
                status: 401,
                message: "invalid api key".to_string(),
            }
            .is_retryable()
        );
        assert!(
            !QuillError::MissingCredentials {
                provider: "openai".to_string(),
                env_var: "OPENAI_API_KEY".to_string(),
            }
            .is_retryable()
        );
        assert!(!QuillError::EmptyPrompt.is_retryable());
    }

    #[test]
    fn retry_exhausted_reports_attempts_and_inherits_exit_code() {
        let err = QuillError::RetryExhausted {
            attempts: 3,
            source: Box::new(QuillError::Timeout(30)),
        };
        assert!(err.to_string().contains("3 attempt"));
        assert_eq!(err.exit_code(), ExitCode::BackendError);
    }

    #[test]
    fn retry_after_only_on_rate_limits() {
        let err = QuillError::RateLimited {
            provider: "openai".to_string(),
            retry_after: Some(Duration::from_secs(20)),
            message: String::new(),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(20)));
        assert_eq!(QuillError::Timeout(5).retry_after(), None);
    }

    #[test]
    fn missing_credentials_message_is_actionable() {
        let err = QuillError::MissingCredentials {
            provider: "anthropic".to_string(),
            env_var: "ANTHROPIC_API_KEY".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ANTHROPIC_API_KEY"));
        assert!(msg.contains("config set-key anthropic"));
    }

    #[test]
    fn interrupted_uses_sigint_convention() {
        assert_eq!(QuillError::Interrupted.exit_code(), ExitCode::Interrupted);
        assert_eq!(u8::from(ExitCode::Interrupted), 130);
    }
}
