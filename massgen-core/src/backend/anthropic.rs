//! Anthropic Messages API backend, grounded in the teacher's
//! `providers::anthropic` client/header pattern and SSE event parser,
//! retargeted to emit [`StreamChunk`]s so it flows through the same
//! [`super::adapt_chat_stream`] normalization as the OpenAI backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::message::{Content, Message, Role};
use crate::stream::{StopReason, StreamChunk};
use crate::tool::ToolDefinition;

use super::{Backend, BackendEvent, adapt_chat_stream};

/// Default Anthropic API base URL.
pub const ANTHROPIC_API_BASE_URL: &str = "https://api.anthropic.com";
/// API version header value this backend speaks.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A [`Backend`] speaking the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicBackend {
    http_client: reqwest::Client,
    api_key: Arc<str>,
    base_url: Arc<str>,
    model: Arc<str>,
    max_tokens: u32,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl AnthropicBackend {
    /// Default max output tokens when the caller doesn't override it.
    pub const DEFAULT_MAX_TOKENS: u32 = 4096;

    /// Build a backend targeting the public Anthropic endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_key: api_key.into().into(),
            base_url: ANTHROPIC_API_BASE_URL.into(),
            model: model.into().into(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the max output tokens requested per turn.
    #[must_use]
    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).unwrap_or_else(|_| HeaderValue::from_static("invalid")),
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// Build the request body. Anthropic takes the system prompt as a
    /// top-level field rather than a `system`-role message, and tool
    /// schemas under `input_schema` rather than `parameters`.
    fn build_body(
        &self,
        system_prompt: &str,
        message_history: &[Message],
        available_tools: &[ToolDefinition],
    ) -> Value {
        let messages: Vec<Value> = message_history.iter().filter_map(message_to_anthropic).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
            "stream": true,
        });

        if !system_prompt.is_empty() {
            body["system"] = Value::String(system_prompt.to_owned());
        }

        if !available_tools.is_empty() {
            let tools: Vec<Value> = available_tools
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.parameters,
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }

        body
    }
}

fn message_to_anthropic(message: &Message) -> Option<Value> {
    match message.role {
        Role::System => None,
        Role::User | Role::Assistant => {
            let text = message.content.as_ref().map(Content::as_text).unwrap_or_default();
            Some(serde_json::json!({
                "role": if message.role == Role::User { "user" } else { "assistant" },
                "content": text,
            }))
        }
        Role::Tool => {
            let tool_call_id = message.tool_call_id.clone().unwrap_or_default();
            let text = message.content.as_ref().map(Content::as_text).unwrap_or_default();
            Some(serde_json::json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": text,
                }],
            }))
        }
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    async fn stream_turn(
        &self,
        system_prompt: &str,
        message_history: &[Message],
        available_tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<super::EventStream> {
        let body = self.build_body(system_prompt, message_history, available_tools);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .http_client
            .post(url)
            .headers(self.auth_headers())
            .json(&body)
            .send()
            .await
            .map_err(Error::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::permanent_backend("anthropic", format!("HTTP {status}: {text}")));
        }

        let mut events = adapt_chat_stream(parse_sse(response.bytes_stream()));

        Ok(Box::pin(stream! {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        yield Ok(BackendEvent::TurnEnd(StopReason::Stop));
                        break;
                    }
                    next = events.next() => {
                        match next {
                            Some(item) => yield item,
                            None => break,
                        }
                    }
                }
            }
        }))
    }

    fn backend_name(&self) -> &'static str {
        "anthropic"
    }
}

fn parse_sse(
    bytes: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<StreamChunk>> + Send {
    stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer = String::new();
        let mut tool_blocks: HashMap<usize, (String, String)> = HashMap::new();

        loop {
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let Ok(text) = std::str::from_utf8(&chunk) else { continue };
                    buffer.push_str(text);

                    while let Some(newline) = buffer.find('\n') {
                        let line = buffer[..newline].trim().to_owned();
                        buffer = buffer[newline + 1..].to_owned();

                        if line.is_empty() || line.starts_with("event:") || line.starts_with(':') {
                            continue;
                        }
                        let Some(data) = line.strip_prefix("data: ") else { continue };

                        match serde_json::from_str::<StreamEvent>(data) {
                            Ok(event) => {
                                for parsed in handle_event(event, &mut tool_blocks) {
                                    yield Ok(parsed);
                                }
                            }
                            Err(_) => continue,
                        }
                    }
                }
                Some(Err(err)) => {
                    yield Err(Error::from(err));
                    break;
                }
                None => break,
            }
        }
    }
}

fn handle_event(event: StreamEvent, tool_blocks: &mut HashMap<usize, (String, String)>) -> Vec<StreamChunk> {
    match event {
        StreamEvent::ContentBlockStart { index, content_block: ContentBlock::ToolUse { id, name } } => {
            tool_blocks.insert(index, (id.clone(), name.clone()));
            vec![StreamChunk::tool_use_start(index, id, name)]
        }
        StreamEvent::ContentBlockStart { .. } => Vec::new(),
        StreamEvent::ContentBlockDelta { index: _, delta: ContentDelta::TextDelta { text } } => {
            vec![StreamChunk::text(text)]
        }
        StreamEvent::ContentBlockDelta { index, delta: ContentDelta::InputJsonDelta { partial_json } } => {
            vec![StreamChunk::tool_use_delta(index, partial_json)]
        }
        StreamEvent::ContentBlockDelta { .. } => Vec::new(),
        StreamEvent::ContentBlockStop { index } => {
            if tool_blocks.remove(&index).is_some() {
                vec![StreamChunk::ToolUseComplete { index }]
            } else {
                Vec::new()
            }
        }
        StreamEvent::MessageDelta { delta } => {
            vec![StreamChunk::done(Some(stop_reason_from_anthropic(delta.stop_reason.as_deref())))]
        }
        StreamEvent::MessageStart | StreamEvent::Ping | StreamEvent::MessageStop => Vec::new(),
        StreamEvent::Error { error } => vec![StreamChunk::error(error.message)],
    }
}

fn stop_reason_from_anthropic(reason: Option<&str>) -> StopReason {
    match reason {
        Some("tool_use") => StopReason::ToolCalls,
        Some("max_tokens") => StopReason::Length,
        Some("stop_sequence" | "end_turn") | None => StopReason::Stop,
        Some(_) => StopReason::Stop,
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart,
    ContentBlockStart { index: usize, content_block: ContentBlock },
    ContentBlockDelta { index: usize, delta: ContentDelta },
    ContentBlockStop { index: usize },
    MessageDelta { delta: MessageDeltaContent },
    MessageStop,
    Ping,
    Error { error: StreamError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { #[allow(dead_code)] text: String },
    ToolUse { id: String, name: String },
    Thinking { #[allow(dead_code)] thinking: String },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { #[allow(dead_code)] thinking: String },
}

#[derive(Debug, Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}
