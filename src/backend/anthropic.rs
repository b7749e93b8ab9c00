//! Anthropic messages codec.
//!
//! The messages API differs from chat-completions in three ways that matter
//! here: authentication uses an `x-api-key` header plus a pinned
//! `anthropic-version`, the system prompt is a top-level field rather than a
//! message, and `max_tokens` is mandatory.

use futures::StreamExt;
use serde_json::{json, Value};

use super::{
    ChatRequest, ChatResponse, FinishReason, Role, StreamEvent, TextStream, Usage,
    classify_http_status, classify_transport_error, parse_retry_after,
};
use crate::core::provider::Provider;
use crate::error::{QuillError, Result};

/// API version pin sent with every request.
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Applied when no source sets an output cap; the API requires one.
const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client, api_key: String, api_base: String) -> Self {
        Self {
            client,
            api_key,
            api_base,
        }
    }

    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = Self::build_body(request, false);
        let response = self
            .request_builder()
            .timeout(super::buffered_timeout())
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(
                Provider::Anthropic,
                status,
                retry_after,
                &body,
            ));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| parse_error(format!("invalid response body: {err}")))?;
        Self::parse_response(&payload)
    }

    pub async fn stream(&self, request: &ChatRequest) -> Result<TextStream> {
        let body = Self::build_body(request, true);
        let response = self
            .request_builder()
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(
                Provider::Anthropic,
                status,
                retry_after,
                &body,
            ));
        }

        let state = SseState {
            inner: response.bytes_stream().boxed(),
            buffer: String::new(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: None,
            finished: false,
        };
        let stream = futures::stream::try_unfold(state, |mut state| async move {
            Ok(next_event(&mut state).await?.map(|event| (event, state)))
        });
        Ok(Box::pin(stream))
    }

    fn request_builder(&self) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
    }

    fn build_body(request: &ChatRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len());
        for (i, message) in request.messages.iter().enumerate() {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let is_last = i + 1 == request.messages.len();
            if is_last && message.role == Role::User && !request.images.is_empty() {
                let mut parts: Vec<Value> = request
                    .images
                    .iter()
                    .map(|image| {
                        json!({
                            "type": "image",
                            "source": {
                                "type": "base64",
                                "media_type": image.media_type,
                                "data": image.data,
                            }
                        })
                    })
                    .collect();
                parts.push(json!({ "type": "text", "text": message.content }));
                messages.push(json!({ "role": role, "content": parts }));
            } else {
                messages.push(json!({ "role": role, "content": message.content }));
            }
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn parse_response(payload: &Value) -> Result<ChatResponse> {
        let parts = payload["content"]
            .as_array()
            .ok_or_else(|| parse_error("response has no content blocks".to_string()))?;
        let text: String = parts
            .iter()
            .filter(|part| part["type"] == "text")
            .filter_map(|part| part["text"].as_str())
            .collect();
        let usage = parse_usage(payload.get("usage"));
        let finish_reason = payload["stop_reason"].as_str().map(FinishReason::from_wire);
        Ok(ChatResponse {
            text,
            usage,
            finish_reason,
        })
    }
}

fn parse_usage(value: Option<&Value>) -> Option<Usage> {
    let value = value?;
    Some(Usage {
        input_tokens: value.get("input_tokens")?.as_u64()?,
        output_tokens: value.get("output_tokens")?.as_u64()?,
    })
}

fn parse_error(message: String) -> QuillError {
    QuillError::BackendParse {
        provider: Provider::Anthropic.id().to_string(),
        message,
    }
}

// =============================================================================
// SSE Stream
// =============================================================================

struct SseState {
    inner: futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
    input_tokens: u64,
    output_tokens: u64,
    finish_reason: Option<FinishReason>,
    finished: bool,
}

impl SseState {
    fn done(&mut self) -> StreamEvent {
        self.finished = true;
        let usage = if self.input_tokens > 0 || self.output_tokens > 0 {
            Some(Usage {
                input_tokens: self.input_tokens,
                output_tokens: self.output_tokens,
            })
        } else {
            None
        };
        StreamEvent::Done {
            usage,
            finish_reason: self.finish_reason.take(),
        }
    }
}

/// Pull the next event from an Anthropic event stream.
///
/// `message_start` carries input token counts, `content_block_delta` the
/// text increments, `message_delta` the output count and stop reason, and
/// `message_stop` terminates the stream. An `error` event surfaces as a
/// backend failure.
async fn next_event(state: &mut SseState) -> Result<Option<StreamEvent>> {
    if state.finished {
        return Ok(None);
    }
    loop {
        while let Some(pos) = state.buffer.find("\n\n") {
            let event: String = state.buffer.drain(..pos + 2).collect();
            for line in event.lines() {
                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let chunk: Value =
                    serde_json::from_str(data.trim()).map_err(|err| {
                        parse_error(format!("invalid stream event: {err}"))
                    })?;
                match chunk["type"].as_str() {
                    Some("message_start") => {
                        if let Some(n) = chunk["message"]["usage"]["input_tokens"].as_u64() {
                            state.input_tokens = n;
                        }
                    }
                    Some("content_block_delta") => {
                        if let Some(text) = chunk["delta"]["text"].as_str() {
                            if !text.is_empty() {
                                return Ok(Some(StreamEvent::Delta(text.to_string())));
                            }
                        }
                    }
                    Some("message_delta") => {
                        if let Some(n) = chunk["usage"]["output_tokens"].as_u64() {
                            state.output_tokens = n;
                        }
                        if let Some(reason) = chunk["delta"]["stop_reason"].as_str() {
                            state.finish_reason = Some(FinishReason::from_wire(reason));
                        }
                    }
                    Some("message_stop") => return Ok(Some(state.done())),
                    Some("error") => {
                        state.finished = true;
                        let message = chunk["error"]["message"]
                            .as_str()
                            .unwrap_or("stream error")
                            .to_string();
                        return Err(QuillError::BackendUnavailable {
                            provider: Provider::Anthropic.id().to_string(),
                            status: 0,
                            message,
                        });
                    }
                    // ping, content_block_start/stop
                    _ => {}
                }
            }
        }
        match state.inner.next().await {
            Some(Ok(bytes)) => state.buffer.push_str(&String::from_utf8_lossy(&bytes)),
            Some(Err(err)) => {
                state.finished = true;
                return Err(classify_transport_error(&err));
            }
            None => return Ok(Some(state.done())),
        }
    }
}
