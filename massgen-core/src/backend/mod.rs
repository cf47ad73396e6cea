//! Backend Adapter (C1): uniform streaming chat with tool-call events,
//! model-agnostic (§4.1).
//!
//! A [`Backend`] exposes one operation, `stream_turn`, returning a lazy,
//! finite, per-turn sequence of [`BackendEvent`]. Concrete providers
//! (Chat-Completions-style, Anthropic-style, or an in-process mock) each
//! implement [`Backend`] by producing a [`crate::stream::StreamChunk`]
//! stream via [`crate::chat::ChatProvider`] and letting [`adapt_chat_stream`]
//! normalize it to the canonical, id-addressed event shape the Agent Runner
//! consumes.

pub mod anthropic;
pub mod mock;
pub mod openai;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::Message;
use crate::stream::{StopReason, StreamChunk};
use crate::tool::ToolDefinition;

/// One step of a backend's streamed response to a turn (§4.1).
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Incremental assistant text.
    TextDelta(String),
    /// A new tool call began.
    ToolCallStart {
        /// Tool-call id, stable across its start/delta/end events.
        id: String,
        /// Tool name.
        name: String,
    },
    /// Partial JSON arguments for an in-progress tool call.
    ToolCallArgDelta {
        /// Tool-call id this fragment belongs to.
        id: String,
        /// Partial JSON fragment.
        json_fragment: String,
    },
    /// A tool call finished accumulating arguments.
    ToolCallEnd {
        /// Tool-call id that completed.
        id: String,
    },
    /// The turn ended.
    TurnEnd(StopReason),
}

/// A finite, per-turn stream of [`BackendEvent`]s.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<BackendEvent>> + Send>>;

/// Uniform streaming chat interface the Agent Runner drives, independent of
/// the underlying LLM provider's wire format.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Start one turn: stream events for a single assistant response given a
    /// system prompt, the message history, and the tools available to call.
    ///
    /// The returned stream is finite per turn; restarting requires calling
    /// this method again. `cancel` is observed between events, not mid-event.
    ///
    /// # Errors
    ///
    /// Returns an error if the turn cannot be started at all (e.g. backend
    /// unreachable). Mid-stream failures surface as an `Err` item instead.
    async fn stream_turn(
        &self,
        system_prompt: &str,
        message_history: &[Message],
        available_tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<EventStream>;

    /// Name used in logging and error messages.
    fn backend_name(&self) -> &'static str;
}

/// A backend shared across concurrently-running agent tasks.
pub type SharedBackend = Arc<dyn Backend>;

/// Normalize a provider's raw [`StreamChunk`] stream into canonical,
/// id-addressed [`BackendEvent`]s.
///
/// Providers report tool-call deltas by positional `index` (mirroring the
/// OpenAI wire format); this adapter remembers the `id` each index started
/// with so downstream consumers never have to think in indices.
pub fn adapt_chat_stream(
    inner: impl Stream<Item = Result<StreamChunk>> + Send + 'static,
) -> EventStream {
    Box::pin(stream! {
        let mut inner = Box::pin(inner);
        let mut index_to_id: HashMap<usize, String> = HashMap::new();

        while let Some(chunk) = inner.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err(err);
                    continue;
                }
            };

            match chunk {
                StreamChunk::Text(text) => yield Ok(BackendEvent::TextDelta(text)),
                StreamChunk::ToolUseStart { index, id, name } => {
                    index_to_id.insert(index, id.clone());
                    yield Ok(BackendEvent::ToolCallStart { id, name });
                }
                StreamChunk::ToolUseDelta { index, partial_json } => {
                    if let Some(id) = index_to_id.get(&index) {
                        yield Ok(BackendEvent::ToolCallArgDelta {
                            id: id.clone(),
                            json_fragment: partial_json,
                        });
                    }
                }
                StreamChunk::ToolUseComplete { index } => {
                    if let Some(id) = index_to_id.remove(&index) {
                        yield Ok(BackendEvent::ToolCallEnd { id });
                    }
                }
                StreamChunk::Done { stop_reason } => {
                    yield Ok(BackendEvent::TurnEnd(stop_reason.unwrap_or_default()));
                }
                StreamChunk::Error { message } => {
                    yield Err(crate::error::Error::transient_backend("unknown", message));
                }
                StreamChunk::ReasoningContent(_) | StreamChunk::Audio { .. } | StreamChunk::Usage(_) => {}
            }
        }
    })
}
