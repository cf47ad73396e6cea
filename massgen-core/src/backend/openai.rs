//! OpenAI Chat-Completions-style backend, grounded in the teacher's
//! `providers::openai` client/builder split and SSE parser, retargeted at
//! [`crate::chat::ChatRequest`]/[`crate::chat::ChatResponse`] (already
//! OpenAI-shaped) instead of the teacher's bespoke request builder.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatRequest;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::stream::{StopReason, StreamChunk};
use crate::tool::ToolDefinition;

use super::{Backend, BackendEvent, adapt_chat_stream};

/// Default `OpenAI` API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";

/// A [`Backend`] speaking the OpenAI Chat Completions API (and
/// Chat-Completions-compatible proxies reachable via a custom base URL).
#[derive(Clone)]
pub struct OpenAiBackend {
    http_client: reqwest::Client,
    api_key: Arc<str>,
    base_url: Arc<str>,
    model: Arc<str>,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl OpenAiBackend {
    /// Build a backend targeting the default OpenAI endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::builder(api_key, model).build()
    }

    /// Start a builder for a backend with a custom base URL (proxies, Azure, local models).
    #[must_use]
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout_secs: None,
        }
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .unwrap_or_else(|_| HeaderValue::from_static("Bearer invalid")),
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn build_request(
        &self,
        system_prompt: &str,
        message_history: &[Message],
        available_tools: &[ToolDefinition],
    ) -> ChatRequest {
        let mut messages = Vec::with_capacity(message_history.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.extend_from_slice(message_history);

        let mut request = ChatRequest::with_messages(self.model.to_string(), messages).stream();
        if !available_tools.is_empty() {
            request = request.tools(available_tools.to_vec());
        }
        request
    }

    async fn raw_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http_client
            .post(url)
            .headers(self.auth_headers())
            .json(request)
            .send()
            .await
            .map_err(Error::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::permanent_backend(
                "openai",
                format!("HTTP {status}: {body}"),
            ));
        }

        let bytes = response.bytes_stream();
        Ok(Box::pin(parse_sse(bytes)))
    }
}

/// Builder for [`OpenAiBackend`].
#[derive(Debug)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl OpenAiBackendBuilder {
    /// Override the API base URL (proxies, Azure, local models).
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout in seconds.
    #[must_use]
    pub const fn timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = Some(timeout);
        self
    }

    /// Build the backend.
    #[must_use]
    pub fn build(self) -> OpenAiBackend {
        let mut client_builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout_secs {
            client_builder = client_builder.timeout(std::time::Duration::from_secs(timeout));
        }
        let http_client = client_builder.build().unwrap_or_default();

        OpenAiBackend {
            http_client,
            api_key: self.api_key.into(),
            base_url: self
                .base_url
                .unwrap_or_else(|| OPENAI_API_BASE_URL.to_owned())
                .into(),
            model: self.model.into(),
        }
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    async fn stream_turn(
        &self,
        system_prompt: &str,
        message_history: &[Message],
        available_tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<super::EventStream> {
        let request = self.build_request(system_prompt, message_history, available_tools);
        let raw = self.raw_stream(&request).await?;
        let mut events = adapt_chat_stream(raw);

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
        "openai"
    }
}

/// Parse an OpenAI-style SSE byte stream into [`StreamChunk`]s.
fn parse_sse(
    bytes: impl Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
) -> impl Stream<Item = Result<StreamChunk>> + Send {
    stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer = String::new();
        let mut index_to_id: HashMap<usize, String> = HashMap::new();

        'outer: loop {
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let Ok(text) = std::str::from_utf8(&chunk) else { continue };
                    buffer.push_str(text);

                    while let Some(newline) = buffer.find('\n') {
                        let line = buffer[..newline].trim().to_owned();
                        buffer = buffer[newline + 1..].to_owned();

                        if line.is_empty() || line.starts_with(':') {
                            continue;
                        }
                        let Some(data) = line.strip_prefix("data: ") else { continue };
                        if data == "[DONE]" {
                            yield Ok(StreamChunk::done(None));
                            break 'outer;
                        }

                        match serde_json::from_str::<RawChunk>(data) {
                            Ok(raw) => {
                                for parsed in raw.into_stream_chunks(&mut index_to_id) {
                                    yield Ok(parsed);
                                }
                            }
                            Err(err) => yield Err(Error::from(err)),
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

#[derive(Debug, Deserialize)]
struct RawChunk {
    choices: Vec<RawChoice>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    delta: RawDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDelta {
    content: Option<String>,
    tool_calls: Option<Vec<RawToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct RawToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<RawFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

impl RawChunk {
    fn into_stream_chunks(self, index_to_id: &mut HashMap<usize, String>) -> Vec<StreamChunk> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Vec::new();
        };
        let mut out = Vec::new();

        if let Some(text) = choice.delta.content {
            out.push(StreamChunk::text(text));
        }

        for tool_call in choice.delta.tool_calls.into_iter().flatten() {
            if let Some(id) = tool_call.id {
                index_to_id.insert(tool_call.index, id.clone());
                let name = tool_call
                    .function
                    .as_ref()
                    .and_then(|f| f.name.clone())
                    .unwrap_or_default();
                out.push(StreamChunk::tool_use_start(tool_call.index, id, name));
            }
            if let Some(arguments) = tool_call.function.and_then(|f| f.arguments) {
                out.push(StreamChunk::tool_use_delta(tool_call.index, arguments));
            }
        }

        if let Some(reason) = choice.finish_reason {
            if reason == "tool_calls" {
                for index in index_to_id.keys().copied().collect::<Vec<_>>() {
                    out.push(StreamChunk::ToolUseComplete { index });
                }
            }
            out.push(StreamChunk::done(Some(finish_reason_to_stop_reason(&reason))));
        }

        out
    }
}

fn finish_reason_to_stop_reason(reason: &str) -> StopReason {
    match reason {
        "tool_calls" | "function_call" => StopReason::ToolCalls,
        "length" => StopReason::Length,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::Stop,
    }
}
