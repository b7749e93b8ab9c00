//! OpenAI-compatible chat-completions codec.
//!
//! Serves the `openai`, `gemini`, and `mistral` providers; the latter two
//! expose OpenAI-compatible endpoints, so the only difference is the base
//! URL and the key.

use futures::StreamExt;
use serde_json::{json, Value};

use super::{
    ChatRequest, ChatResponse, FinishReason, Role, StreamEvent, TextStream, Usage,
    classify_http_status, classify_transport_error, parse_retry_after,
};
use crate::core::provider::Provider;
use crate::error::{QuillError, Result};

#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    provider: Provider,
    client: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl OpenAiCompatible {
    pub fn new(
        provider: Provider,
        client: reqwest::Client,
        api_key: String,
        api_base: String,
    ) -> Self {
        Self {
            provider,
            client,
            api_key,
            api_base,
        }
    }

    pub const fn provider(&self) -> Provider {
        self.provider
    }

    pub async fn send(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let body = self.build_body(request, false);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .timeout(super::buffered_timeout())
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(self.provider, status, retry_after, &body));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| self.parse_error(format!("invalid response body: {err}")))?;
        self.parse_response(&payload)
    }

    pub async fn stream(&self, request: &ChatRequest) -> Result<TextStream> {
        let body = self.build_body(request, true);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| classify_transport_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_http_status(self.provider, status, retry_after, &body));
        }

        let state = SseState {
            provider: self.provider,
            inner: response.bytes_stream().boxed(),
            buffer: String::new(),
            usage: None,
            finish_reason: None,
            finished: false,
        };
        let stream = futures::stream::try_unfold(state, |mut state| async move {
            Ok(next_event(&mut state).await?.map(|event| (event, state)))
        });
        Ok(Box::pin(stream))
    }

    /// Build the chat-completions request body.
    ///
    /// Session history rides as plain-text messages; images attach to the
    /// final user turn as data-URL content parts.
    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for (i, message) in request.messages.iter().enumerate() {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            let is_last = i + 1 == request.messages.len();
            if is_last && message.role == Role::User && !request.images.is_empty() {
                let mut parts = vec![json!({ "type": "text", "text": message.content })];
                for image in &request.images {
                    parts.push(json!({
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:{};base64,{}", image.media_type, image.data)
                        }
                    }));
                }
                messages.push(json!({ "role": role, "content": parts }));
            } else {
                messages.push(json!({ "role": role, "content": message.content }));
            }
        }

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
        });
        if let Some(max_tokens) = request.max_output_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if stream {
            body["stream"] = json!(true);
            // Ask for a trailing usage chunk; servers that don't support the
            // option report no usage and cost falls back to an estimate.
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    fn parse_response(&self, payload: &Value) -> Result<ChatResponse> {
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| self.parse_error("response has no message content".to_string()))?
            .to_string();
        let finish_reason = payload["choices"][0]["finish_reason"]
            .as_str()
            .map(FinishReason::from_wire);
        Ok(ChatResponse {
            text,
            usage: parse_usage(payload.get("usage")),
            finish_reason,
        })
    }

    fn parse_error(&self, message: String) -> QuillError {
        QuillError::BackendParse {
            provider: self.provider.id().to_string(),
            message,
        }
    }
}

fn parse_usage(value: Option<&Value>) -> Option<Usage> {
    let value = value?;
    let input = value.get("prompt_tokens")?.as_u64()?;
    let output = value.get("completion_tokens")?.as_u64()?;
    Some(Usage {
        input_tokens: input,
        output_tokens: output,
    })
}

// =============================================================================
// SSE Stream
// =============================================================================

struct SseState {
    provider: Provider,
    inner: futures::stream::BoxStream<'static, reqwest::Result<bytes::Bytes>>,
    buffer: String,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    finished: bool,
}

impl SseState {
    fn done(&mut self) -> StreamEvent {
        self.finished = true;
        StreamEvent::Done {
            usage: self.usage.take(),
            finish_reason: self.finish_reason.take(),
        }
    }
}

/// Pull the next event out of the server-sent event stream.
///
/// Events are buffered on blank-line boundaries. Role-only and empty chunks
/// are skipped; `data: [DONE]` (or the connection closing) yields the final
/// `Done` event with whatever usage the server offered.
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
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(Some(state.done()));
                }
                let chunk: Value = serde_json::from_str(data).map_err(|err| {
                    QuillError::BackendParse {
                        provider: state.provider.id().to_string(),
                        message: format!("invalid stream chunk: {err}"),
                    }
                })?;
                if let Some(usage) = parse_usage(chunk.get("usage")) {
                    state.usage = Some(usage);
                }
                if let Some(reason) = chunk["choices"][0]["finish_reason"].as_str() {
                    state.finish_reason = Some(FinishReason::from_wire(reason));
                }
                if let Some(delta) = chunk["choices"][0]["delta"]["content"].as_str() {
                    if !delta.is_empty() {
                        return Ok(Some(StreamEvent::Delta(delta.to_string())));
                    }
                }
            }
        }
        match state.inner.next().await {
            Some(Ok(bytes)) => state.buffer.push_str(&String::from_utf8_lossy(&bytes)),
            Some(Err(err)) => {
                state.finished = true;
                return Err(classify_transport_error(&err));
            }
            // Server closed without [DONE]; treat what we have as complete.
            None => return Ok(Some(state.done())),
        }
    }
}
