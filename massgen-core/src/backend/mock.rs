//! An in-process backend for tests, cycling through scripted turns instead
//! of calling a real model. Grounded in the teacher's `MockModel`, extended
//! with scripted tool calls so coordination logic (§8 scenarios) can be
//! exercised deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_stream::stream;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::message::Message;
use crate::stream::StopReason;
use crate::tool::ToolDefinition;

use super::{Backend, BackendEvent, EventStream};

/// One scripted assistant turn for [`MockBackend`].
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Emit plain text and stop.
    Text(String),
    /// Emit a single complete tool call and stop.
    ToolCall {
        /// Tool name to call.
        name: String,
        /// Raw JSON arguments, as a string.
        arguments: String,
    },
}

/// A backend that replays a fixed script of turns, cycling once exhausted.
///
/// Each call to [`Backend::stream_turn`] consumes the next scripted turn.
#[derive(Debug)]
pub struct MockBackend {
    turns: Vec<ScriptedTurn>,
    next: AtomicUsize,
}

impl MockBackend {
    /// Build a mock backend that replays `turns` in order, cycling.
    #[must_use]
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn stream_turn(
        &self,
        _system_prompt: &str,
        _message_history: &[Message],
        _available_tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        let index = self.next.fetch_add(1, Ordering::SeqCst) % self.turns.len().max(1);
        let turn = self.turns.get(index).cloned();

        Ok(Box::pin(stream! {
            if cancel.is_cancelled() {
                yield Ok(BackendEvent::TurnEnd(StopReason::Stop));
                return;
            }

            match turn {
                Some(ScriptedTurn::Text(text)) => {
                    yield Ok(BackendEvent::TextDelta(text));
                    yield Ok(BackendEvent::TurnEnd(StopReason::Stop));
                }
                Some(ScriptedTurn::ToolCall { name, arguments }) => {
                    let id = format!("mock-call-{index}");
                    yield Ok(BackendEvent::ToolCallStart { id: id.clone(), name });
                    yield Ok(BackendEvent::ToolCallArgDelta { id: id.clone(), json_fragment: arguments });
                    yield Ok(BackendEvent::ToolCallEnd { id });
                    yield Ok(BackendEvent::TurnEnd(StopReason::ToolCalls));
                }
                None => {
                    yield Ok(BackendEvent::TurnEnd(StopReason::Stop));
                }
            }
        }))
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
