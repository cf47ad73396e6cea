//! Event Bus (C7): typed domain events describing session progress, fanned
//! out to a presentation layer independently of `tracing` (§10.1 — tracing is
//! for operators, this bus is for the presentation layer).

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::state::AgentStatus;

/// A typed domain event describing a step of session progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    /// An agent's runner started its first turn.
    AgentStarted {
        /// Agent id.
        agent: String,
    },
    /// Incremental text output from an agent's turn.
    AgentTextDelta {
        /// Agent id.
        agent: String,
        /// Text fragment.
        text: String,
    },
    /// A tool call was observed (for presentation; not the routing decision itself).
    ToolCallObserved {
        /// Agent id.
        agent: String,
        /// Tool name.
        name: String,
        /// Short summary of the arguments, safe to display.
        args_summary: String,
    },
    /// An answer was published.
    AnswerPublished {
        /// Answer label.
        label: String,
        /// Author agent id.
        author: String,
    },
    /// A vote was cast or replaced.
    VoteCast {
        /// Voter agent id.
        voter: String,
        /// Target label.
        target: String,
        /// Stated reason.
        reason: String,
    },
    /// An agent's status changed.
    AgentStatusChanged {
        /// Agent id.
        agent: String,
        /// New status.
        status: AgentStatus,
    },
    /// Consensus was reached; carries the winning label.
    ConsensusReached {
        /// Winning answer label.
        winner_label: String,
    },
    /// Incremental text from the winner's final-presentation turn.
    FinalAnswerDelta {
        /// Text fragment.
        text: String,
    },
    /// The session ended.
    SessionEnded {
        /// Outcome summary.
        outcome: SessionOutcome,
    },
}

impl DomainEvent {
    /// Returns `true` for events that must never be dropped under
    /// backpressure, per §5's coalescing policy.
    #[must_use]
    pub const fn is_undroppable(&self) -> bool {
        !matches!(self, Self::AgentTextDelta { .. } | Self::FinalAnswerDelta { .. })
    }
}

/// Terminal outcome of a session, carried by [`DomainEvent::SessionEnded`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Consensus was reached normally.
    Consensus {
        /// Winning answer label.
        winner_label: String,
    },
    /// The session timed out; a fallback winner was forced.
    Timeout {
        /// Fallback winning answer label, if any agent had published.
        winner_label: Option<String>,
    },
    /// Fewer than two agents remained non-failed; the survivor's latest answer won.
    Degenerate {
        /// Winning answer label.
        winner_label: String,
    },
    /// A fatal, unrecoverable error aborted the session with no winner.
    Aborted {
        /// Diagnostic message.
        message: String,
    },
}

/// Sending half of the event bus, cloned into the Orchestrator and handed to hooks.
pub type EventSender = mpsc::Sender<DomainEvent>;
/// Receiving half of the event bus, held by the presentation layer.
pub type EventReceiver = mpsc::Receiver<DomainEvent>;

/// Bounded multi-producer/single-consumer channel backing the event bus.
///
/// The bound only ever applies backpressure to droppable events in practice:
/// callers should use [`EventBus::send`], which coalesces
/// `AgentTextDelta`/`FinalAnswerDelta` into a best-effort `try_send` while
/// coordination events always go through a blocking `send`.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: EventSender,
}

impl EventBus {
    /// Default channel capacity.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create a new event bus, returning the publisher and the receiver the
    /// presentation layer should drain.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Publish an event, applying the coalescing policy from §5: droppable
    /// events are sent best-effort; coordination events always go through,
    /// blocking the caller if the channel is momentarily full.
    pub async fn send(&self, event: DomainEvent) {
        if event.is_undroppable() {
            // An undroppable event is only lost if every receiver has been
            // dropped, which means there is nothing left to observe it.
            let _ = self.sender.send(event).await;
        } else {
            let _ = self.sender.try_send(event);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn text_delta_events_are_droppable() {
        let event = DomainEvent::AgentTextDelta {
            agent: "agent1".to_owned(),
            text: "hi".to_owned(),
        };
        assert!(!event.is_undroppable());
    }

    #[test]
    fn coordination_events_are_undroppable() {
        let event = DomainEvent::AnswerPublished {
            label: "agent1.1".to_owned(),
            author: "agent1".to_owned(),
        };
        assert!(event.is_undroppable());

        let event = DomainEvent::ConsensusReached {
            winner_label: "agent1.1".to_owned(),
        };
        assert!(event.is_undroppable());
    }

    #[tokio::test]
    async fn send_and_receive() {
        let (bus, mut rx) = EventBus::new(4);
        bus.send(DomainEvent::AgentStarted { agent: "agent1".to_owned() }).await;
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, DomainEvent::AgentStarted { .. }));
    }

    #[tokio::test]
    async fn full_channel_drops_droppable_events_without_blocking() {
        let (bus, _rx) = EventBus::new(1);
        bus.send(DomainEvent::AgentTextDelta { agent: "a".into(), text: "1".into() }).await;
        // Channel capacity 1 is now full; this must not block forever.
        bus.send(DomainEvent::AgentTextDelta { agent: "a".into(), text: "2".into() }).await;
    }
}
