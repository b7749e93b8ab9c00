//! Backend dispatch and shared wire types.
//!
//! Every provider is reached through one of two codecs: the
//! OpenAI-compatible chat-completions protocol ([`openai`]) or the Anthropic
//! messages protocol ([`anthropic`]). [`Backend`] is a closed enum over the
//! two, so adding a provider means adding a variant here rather than wiring
//! up a registry.

pub mod anthropic;
pub mod openai;

use std::pin::Pin;
use std::time::Duration;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::core::model_ref::ModelReference;
use crate::core::provider::Provider;
use crate::error::{QuillError, Result};

/// Connect timeout for backend requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Total timeout for buffered (non-streaming) requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// =============================================================================
// Request / Response Types
// =============================================================================

/// Who produced a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// An image attached to the final user turn.
///
/// The bytes are base64-encoded once at load time; each codec wraps them in
/// its own envelope (data URL or source block).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Source path, kept for labeling and fingerprinting.
    pub path: String,
    /// MIME type inferred from the file extension.
    pub media_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
}

/// A fully resolved request, independent of any wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub images: Vec<ImageAttachment>,
    pub temperature: f64,
    pub max_output_tokens: Option<u32>,
}

/// Token counts reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub const fn total(self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Map a provider-reported stop string onto the common set.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "stop_sequence" => Self::Stop,
            "length" | "max_tokens" => Self::Length,
            "content_filter" | "refusal" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A complete, buffered response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<FinishReason>,
}

/// One increment of a streamed response.
///
/// A well-formed stream is zero or more `Delta`s followed by exactly one
/// `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Done {
        usage: Option<Usage>,
        finish_reason: Option<FinishReason>,
    },
}

/// A stream of response events, consumed exactly once per call.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

// =============================================================================
// Backend
// =============================================================================

/// A connected backend, ready to serve requests for one provider.
#[derive(Debug, Clone)]
pub enum Backend {
    /// openai, gemini, and mistral all speak the chat-completions protocol.
    OpenAiCompatible(openai::OpenAiCompatible),
    Anthropic(anthropic::AnthropicBackend),
}

impl Backend {
    /// Connect a backend for the resolved model.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn connect(model: &ModelReference, api_key: String, api_base: String) -> Result<Self> {
        let client = http_client()?;
        Ok(match model.provider {
            Provider::Anthropic => Self::Anthropic(anthropic::AnthropicBackend::new(
                client, api_key, api_base,
            )),
            Provider::OpenAi | Provider::Gemini | Provider::Mistral => {
                Self::OpenAiCompatible(openai::OpenAiCompatible::new(
                    model.provider,
                    client,
                    api_key,
                    api_base,
                ))
            }
        })
    }

    /// Provider this backend talks to.
    pub const fn provider(&self) -> Provider {
        match self {
            Self::OpenAiCompatible(backend) => backend.provider(),
            Self::Anthropic(_) => Provider::Anthropic,
        }
    }

    /// Send a request and buffer the full response.
    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        match self {
            Self::OpenAiCompatible(backend) => backend.send(request).await,
            Self::Anthropic(backend) => backend.send(request).await,
        }
    }

    /// Send a request and stream the response incrementally.
    pub async fn stream(&self, request: &ChatRequest) -> Result<TextStream> {
        match self {
            Self::OpenAiCompatible(backend) => backend.stream(request).await,
            Self::Anthropic(backend) => backend.stream(request).await,
        }
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("quill/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|err| QuillError::Network(format!("failed to build HTTP client: {err}")))
}

pub(crate) const fn buffered_timeout() -> Duration {
    REQUEST_TIMEOUT
}

// =============================================================================
// Error Classification
// =============================================================================

/// Map an HTTP error status onto the error taxonomy.
///
/// 429 and 5xx are retryable; everything else in 4xx is a rejection the
/// retry loop must not touch.
pub(crate) fn classify_http_status(
    provider: Provider,
    status: reqwest::StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> QuillError {
    let message = extract_error_message(body);
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return QuillError::RateLimited {
            provider: provider.id().to_string(),
            retry_after,
            message,
        };
    }
    if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
        return QuillError::BackendUnavailable {
            provider: provider.id().to_string(),
            status: status.as_u16(),
            message,
        };
    }
    QuillError::BackendRejected {
        provider: provider.id().to_string(),
        status: status.as_u16(),
        message,
    }
}

/// Pull `error.message` out of a JSON error body, falling back to the raw
/// body truncated to something printable.
fn extract_error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for path in [&["error", "message"][..], &["message"][..]] {
            let mut cursor = &value;
            let mut found = true;
            for key in path {
                match cursor.get(key) {
                    Some(next) => cursor = next,
                    None => {
                        found = false;
                        break;
                    }
                }
            }
            if found {
                if let Some(text) = cursor.as_str() {
                    return text.to_string();
                }
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "no error detail provided".to_string()
    } else {
        trimmed.chars().take(200).collect()
    }
}

/// Parse a `Retry-After` header value given in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Map a transport-level reqwest failure.
pub(crate) fn classify_transport_error(err: &reqwest::Error) -> QuillError {
    if err.is_timeout() {
        QuillError::Timeout(REQUEST_TIMEOUT.as_secs())
    } else {
        QuillError::Network(err.to_string())
    }
}
