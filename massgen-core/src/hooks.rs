//! Lifecycle hook dispatch for the Agent Runner.
//!
//! [`HookPair`] fires the session's [`EventBus`] and an optional
//! caller-supplied [`RunnerHooks`] observer concurrently via `tokio::join!`,
//! mirroring the teacher's `agent::hook::HookPair` dual-dispatch pattern
//! (run-level hooks + per-agent hooks) generalized to (event bus + external
//! observer).

use async_trait::async_trait;

use crate::events::{DomainEvent, EventBus};
use crate::state::AgentStatus;

/// Caller-supplied observer for runner lifecycle events, independent of the
/// [`EventBus`] presentation channel (e.g. for metrics or test assertions).
///
/// Every method has a no-op default; implementors override only what they need.
#[async_trait]
pub trait RunnerHooks: Send + Sync {
    /// An agent's runner started its first turn.
    async fn on_agent_started(&self, agent: &str) {
        let _ = agent;
    }

    /// Incremental text output from an agent's turn.
    async fn on_text_delta(&self, agent: &str, text: &str) {
        let _ = (agent, text);
    }

    /// Incremental text from the winner's final-presentation turn.
    async fn on_final_text_delta(&self, text: &str) {
        let _ = text;
    }

    /// A tool call was observed.
    async fn on_tool_call(&self, agent: &str, name: &str, args_summary: &str) {
        let _ = (agent, name, args_summary);
    }

    /// An answer was published.
    async fn on_answer_published(&self, label: &str, author: &str) {
        let _ = (label, author);
    }

    /// A vote was cast.
    async fn on_vote_cast(&self, voter: &str, target: &str, reason: &str) {
        let _ = (voter, target, reason);
    }

    /// An agent's status changed.
    async fn on_status_changed(&self, agent: &str, status: AgentStatus) {
        let _ = (agent, status);
    }
}

/// Dispatches runner lifecycle events to the event bus and an optional observer.
pub struct HookPair<'a> {
    bus: &'a EventBus,
    observer: Option<&'a dyn RunnerHooks>,
}

impl<'a> HookPair<'a> {
    /// Pair a session's event bus with an optional external observer.
    #[must_use]
    pub const fn new(bus: &'a EventBus, observer: Option<&'a dyn RunnerHooks>) -> Self {
        Self { bus, observer }
    }

    /// Fire on agent start.
    pub async fn agent_started(&self, agent: &str) {
        let event = DomainEvent::AgentStarted { agent: agent.to_owned() };
        if let Some(observer) = self.observer {
            tokio::join!(self.bus.send(event), observer.on_agent_started(agent));
        } else {
            self.bus.send(event).await;
        }
    }

    /// Fire on a text delta.
    pub async fn text_delta(&self, agent: &str, text: &str) {
        let event = DomainEvent::AgentTextDelta { agent: agent.to_owned(), text: text.to_owned() };
        if let Some(observer) = self.observer {
            tokio::join!(self.bus.send(event), observer.on_text_delta(agent, text));
        } else {
            self.bus.send(event).await;
        }
    }

    /// Fire on a final-presentation text delta.
    pub async fn final_text_delta(&self, text: &str) {
        let event = DomainEvent::FinalAnswerDelta { text: text.to_owned() };
        if let Some(observer) = self.observer {
            tokio::join!(self.bus.send(event), observer.on_final_text_delta(text));
        } else {
            self.bus.send(event).await;
        }
    }

    /// Fire on an observed tool call.
    pub async fn tool_call(&self, agent: &str, name: &str, args_summary: &str) {
        let event = DomainEvent::ToolCallObserved {
            agent: agent.to_owned(),
            name: name.to_owned(),
            args_summary: args_summary.to_owned(),
        };
        if let Some(observer) = self.observer {
            tokio::join!(self.bus.send(event), observer.on_tool_call(agent, name, args_summary));
        } else {
            self.bus.send(event).await;
        }
    }

    /// Fire on a published answer.
    pub async fn answer_published(&self, label: &str, author: &str) {
        let event = DomainEvent::AnswerPublished { label: label.to_owned(), author: author.to_owned() };
        if let Some(observer) = self.observer {
            tokio::join!(self.bus.send(event), observer.on_answer_published(label, author));
        } else {
            self.bus.send(event).await;
        }
    }

    /// Fire on a cast vote.
    pub async fn vote_cast(&self, voter: &str, target: &str, reason: &str) {
        let event = DomainEvent::VoteCast {
            voter: voter.to_owned(),
            target: target.to_owned(),
            reason: reason.to_owned(),
        };
        if let Some(observer) = self.observer {
            tokio::join!(self.bus.send(event), observer.on_vote_cast(voter, target, reason));
        } else {
            self.bus.send(event).await;
        }
    }

    /// Fire on an agent status transition.
    pub async fn status_changed(&self, agent: &str, status: AgentStatus) {
        let event = DomainEvent::AgentStatusChanged { agent: agent.to_owned(), status };
        if let Some(observer) = self.observer {
            tokio::join!(self.bus.send(event), observer.on_status_changed(agent, status));
        } else {
            self.bus.send(event).await;
        }
    }
}
