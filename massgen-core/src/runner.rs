//! Agent Runner (C4): drives one agent's participation in a session (§4.4).
//!
//! The runner is a stateless driver, mirroring the teacher's `Runner`/
//! `RunState<'a>` split: [`Runner`] carries no fields, while all mutable
//! turn state lives in a [`RunState`] built fresh for each Working
//! transition. Lifecycle events fire through [`HookPair`], which forwards
//! into the session's [`EventBus`].

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendEvent, SharedBackend};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::hooks::HookPair;
use crate::message::{Message, ToolCall, ToolCallFunction};
use crate::state::ImmutableView;
use crate::stream::StopReason;
use crate::tool::router::DeferredCall;
use crate::tool::{CoordinationCall, RoutedCall, ToolRouter};
use crate::workspace::WorkspaceManager;

/// A runner re-prompts at most once when a turn stops without a
/// coordination-tool call before giving up and reporting [`CoordinationOutcome::NoAction`].
const MAX_TIE_BREAK_ATTEMPTS: u32 = 2;

/// Static, per-agent configuration the [`Runner`] is driven with.
///
/// Built once by the Orchestrator at spawn time and shared across every
/// Working transition for this agent's lifetime.
pub struct AgentHandle {
    /// Stable agent identifier.
    pub agent_id: String,
    /// Backend this agent's turns are streamed from.
    pub backend: SharedBackend,
    /// This session's workspace manager, shared across agents.
    pub workspace: Arc<WorkspaceManager>,
    /// Tool router, shared across agents (planning-mode policy is session-wide).
    pub router: Arc<ToolRouter>,
    /// Event bus this agent's lifecycle events are published to.
    pub event_bus: EventBus,
    /// This agent's system prompt.
    pub system_prompt: String,
    /// The user task every turn is prompted with.
    pub task: String,
}

/// What a coordination-phase Working transition produced.
#[derive(Debug, Clone)]
pub enum CoordinationOutcome {
    /// The agent published a new answer.
    Answer {
        /// Answer body.
        content: String,
    },
    /// The agent cast or replaced a vote.
    Vote {
        /// Target answer label.
        target: String,
        /// Stated reason.
        reason: String,
    },
    /// The turn stopped without a coordination-tool call twice in a row.
    NoAction,
}

#[derive(Debug, Default, Clone)]
struct ToolCallBuilder {
    name: String,
    arguments: String,
}

/// Mutable state accumulated across one or more backend turns that together
/// make up a single Working transition (a transition may span several
/// backend turns when the agent calls external tools before coordinating).
struct RunState {
    messages: Vec<Message>,
    text: String,
    order: Vec<String>,
    builders: HashMap<String, ToolCallBuilder>,
    executed_results: Vec<Message>,
    /// Side-effecting tool calls deferred by planning mode, accumulated across
    /// every backend turn in this Working transition (not cleared by `reset_turn`).
    deferred: Vec<DeferredCall>,
}

impl RunState {
    fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            text: String::new(),
            order: Vec::new(),
            builders: HashMap::new(),
            executed_results: Vec::new(),
            deferred: Vec::new(),
        }
    }

    fn reset_turn(&mut self) {
        self.text.clear();
        self.order.clear();
        self.builders.clear();
        self.executed_results.clear();
    }

    fn finished_tool_calls(&self) -> Vec<ToolCall> {
        self.order
            .iter()
            .filter_map(|id| {
                self.builders.get(id).map(|builder| ToolCall {
                    id: id.clone(),
                    function: ToolCallFunction {
                        name: builder.name.clone(),
                        arguments: builder.arguments.clone(),
                    },
                })
            })
            .collect()
    }

    /// Append the assistant's turn (text and/or tool calls) to history.
    fn push_assistant_turn(&mut self) {
        let tool_calls = self.finished_tool_calls();
        let mut message = if tool_calls.is_empty() {
            Message::assistant(std::mem::take(&mut self.text))
        } else {
            let mut message = Message::assistant_tool_calls(tool_calls);
            if !self.text.is_empty() {
                message.content = Some(crate::message::Content::text(std::mem::take(&mut self.text)));
            }
            message
        };
        if message.content.is_none() && message.tool_calls.is_none() {
            message = Message::assistant(String::new());
        }
        self.messages.push(message);
        self.messages.append(&mut self.executed_results);
    }
}

/// Stateless driver over per-turn [`RunState`]. See module docs.
pub struct Runner;

impl Runner {
    /// Run the coordination phase for one Working transition: stream turns
    /// from the backend, execute external tool calls inline, and stop as
    /// soon as a coordination-tool call completes.
    ///
    /// Returns the coordination outcome together with every side-effecting
    /// tool call planning mode deferred along the way, for the Orchestrator
    /// to replay to the eventual winner's [`Self::run_final`].
    ///
    /// # Errors
    ///
    /// Propagates backend and tool errors. Returns [`Error::Cancelled`] if
    /// `cancel` fires before a coordination outcome is produced.
    pub async fn run_turn(
        handle: &AgentHandle,
        view: &ImmutableView,
        planning_mode_instruction: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(CoordinationOutcome, Vec<DeferredCall>)> {
        let hooks = HookPair::new(&handle.event_bus, None);
        let prompt = build_coordination_prompt(handle, view, planning_mode_instruction);
        let mut state = RunState::new(vec![Message::user(prompt)]);
        let tools = available_tools(handle, false);

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            state.reset_turn();
            let (outcome, _text) = Self::drive_one_backend_turn(
                handle,
                &mut state,
                &tools,
                false,
                &hooks,
                cancel,
            )
            .await?;

            match outcome {
                TurnOutcome::Coordination(call) => {
                    let outcome = match call {
                        CoordinationCall::NewAnswer { content } => CoordinationOutcome::Answer { content },
                        CoordinationCall::Vote { target, reason } => CoordinationOutcome::Vote { target, reason },
                    };
                    return Ok((outcome, state.deferred));
                }
                TurnOutcome::ContinueTurn => continue,
                TurnOutcome::Stopped => {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    attempt += 1;
                    if attempt >= MAX_TIE_BREAK_ATTEMPTS {
                        return Ok((CoordinationOutcome::NoAction, state.deferred));
                    }
                    state.messages.push(Message::user(
                        "You stopped without publishing an answer or casting a vote. \
                         Call `new_answer` with your answer, or `vote` for another agent's answer.",
                    ));
                }
            }
        }
    }

    /// Run the winner's final-presentation turn: coordination tools are not
    /// offered, deferred side-effecting calls are replayed as hints, and
    /// planning-mode restrictions are lifted. Returns the accumulated text.
    ///
    /// # Errors
    ///
    /// Propagates backend and tool errors.
    pub async fn run_final(
        handle: &AgentHandle,
        view: &ImmutableView,
        deferred: &[DeferredCall],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let hooks = HookPair::new(&handle.event_bus, None);
        let prompt = build_final_prompt(handle, view, deferred);
        let mut state = RunState::new(vec![Message::user(prompt)]);
        let tools = handle.router.registry().definitions();
        let mut output = String::new();

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            state.reset_turn();
            let (outcome, text) = Self::drive_one_backend_turn(
                handle,
                &mut state,
                &tools,
                true,
                &hooks,
                cancel,
            )
            .await?;

            output.push_str(&text);

            match outcome {
                TurnOutcome::ContinueTurn => continue,
                TurnOutcome::Stopped | TurnOutcome::Coordination(_) => {
                    if cancel.is_cancelled() {
                        return Err(Error::Cancelled);
                    }
                    return Ok(output);
                }
            }
        }
    }

    /// Stream one backend turn to completion, executing tool calls as they
    /// finish. Returns what the turn produced: a coordination call (only
    /// possible when `final_presentation` is `false`), a continuation signal
    /// (external tool calls were made; the caller should loop), or a plain
    /// stop.
    async fn drive_one_backend_turn(
        handle: &AgentHandle,
        state: &mut RunState,
        tools: &[crate::tool::ToolDefinition],
        final_presentation: bool,
        hooks: &HookPair<'_>,
        cancel: &CancellationToken,
    ) -> Result<(TurnOutcome, String)> {
        let mut stream = handle
            .backend
            .stream_turn(&handle.system_prompt, &state.messages, tools, cancel.clone())
            .await?;

        let mut coordination_call = None;
        let mut made_tool_call = false;
        let mut stop_reason = StopReason::Stop;

        while let Some(event) = stream.next().await {
            match event? {
                BackendEvent::TextDelta(text) => {
                    state.text.push_str(&text);
                    if final_presentation {
                        hooks.final_text_delta(&text).await;
                    } else {
                        hooks.text_delta(&handle.agent_id, &text).await;
                    }
                }
                BackendEvent::ToolCallStart { id, name } => {
                    state.order.push(id.clone());
                    state.builders.insert(id, ToolCallBuilder { name, arguments: String::new() });
                }
                BackendEvent::ToolCallArgDelta { id, json_fragment } => {
                    if let Some(builder) = state.builders.get_mut(&id) {
                        builder.arguments.push_str(&json_fragment);
                    }
                }
                BackendEvent::ToolCallEnd { id } => {
                    made_tool_call = true;
                    if coordination_call.is_some() {
                        continue;
                    }
                    let Some(builder) = state.builders.get(&id).cloned() else {
                        continue;
                    };
                    let call = ToolCall {
                        id: id.clone(),
                        function: ToolCallFunction { name: builder.name.clone(), arguments: builder.arguments },
                    };
                    hooks.tool_call(&handle.agent_id, &builder.name, &call.function.arguments).await;

                    match handle.router.route(&handle.agent_id, &call, final_presentation)? {
                        RoutedCall::Coordination(parsed) => coordination_call = Some(parsed),
                        RoutedCall::Execute { arguments } => {
                            let result = match handle.router.registry().get(&builder.name) {
                                Some(tool) => match tool.invoke(arguments).await {
                                    Ok(content) => crate::tool::ToolResult::ok(id.clone(), content),
                                    Err(err) => crate::tool::ToolResult::error(id.clone(), "execution_failed", err.to_string()),
                                },
                                None => crate::tool::ToolResult::error(id.clone(), "unknown_tool", "tool vanished from registry"),
                            };
                            state.executed_results.push(Message::tool_result(id, result.content));
                        }
                        RoutedCall::Deferred(result, record) => {
                            state.deferred.push(record);
                            state.executed_results.push(Message::tool_result(id, result.content));
                        }
                        RoutedCall::Unknown(result) => {
                            state.executed_results.push(Message::tool_result(id, result.content));
                        }
                    }
                }
                BackendEvent::TurnEnd(reason) => {
                    stop_reason = reason;
                    break;
                }
            }
        }

        let turn_text = state.text.clone();
        state.push_assistant_turn();

        if let Some(call) = coordination_call {
            return Ok((TurnOutcome::Coordination(call), turn_text));
        }
        if made_tool_call && stop_reason.is_tool_call() {
            return Ok((TurnOutcome::ContinueTurn, turn_text));
        }
        Ok((TurnOutcome::Stopped, turn_text))
    }
}

enum TurnOutcome {
    Coordination(CoordinationCall),
    ContinueTurn,
    Stopped,
}

fn available_tools(handle: &AgentHandle, final_presentation: bool) -> Vec<crate::tool::ToolDefinition> {
    let mut tools = handle.router.registry().definitions();
    if !final_presentation {
        tools.extend(CoordinationCall::tool_definitions());
    }
    tools
}

fn build_coordination_prompt(handle: &AgentHandle, view: &ImmutableView, planning_mode_instruction: Option<&str>) -> String {
    let mut prompt = String::new();
    prompt.push_str(&handle.task);
    prompt.push_str("\n\nLatest answers from other agents:\n");

    let mut has_others = false;
    for (author, answer) in &view.latest_by_author {
        if author == &handle.agent_id {
            continue;
        }
        has_others = true;
        prompt.push_str(&format!("- {} (by {}): {}\n", answer.label, author, answer.content));
    }
    if !has_others {
        prompt.push_str("(none yet)\n");
    }

    let tally = view.tally();
    prompt.push_str("\nCurrent vote tally:\n");
    if tally.is_empty() {
        prompt.push_str("(no votes yet)\n");
    } else {
        for (author, count) in &tally {
            prompt.push_str(&format!("- {author}: {count}\n"));
        }
    }

    if let Some(own) = view.latest_by_author.get(&handle.agent_id) {
        prompt.push_str(&format!("\nYour own last answer ({}): {}\n", own.label, own.content));
    }

    if let Some(instruction) = planning_mode_instruction {
        prompt.push_str("\n");
        prompt.push_str(instruction);
        prompt.push('\n');
    }

    prompt
}

fn build_final_prompt(handle: &AgentHandle, view: &ImmutableView, deferred: &[DeferredCall]) -> String {
    let mut prompt = String::new();
    prompt.push_str(&handle.task);

    if let Some(own) = view.latest_by_author.get(&handle.agent_id) {
        prompt.push_str(&format!(
            "\n\nYou were selected as the winning agent. Your published answer was:\n{}\n",
            own.content
        ));
    }

    if !deferred.is_empty() {
        prompt.push_str("\nDuring coordination you deferred the following side-effecting tool calls; now is the time to execute them if still appropriate:\n");
        for call in deferred {
            prompt.push_str(&format!("- {}({})\n", call.tool_name, call.arguments));
        }
    }

    prompt.push_str("\nProduce your final answer now.\n");
    prompt
}
