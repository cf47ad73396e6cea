//! Orchestrator (C6): the single-writer coordinator that spawns Agent Runner
//! turns, applies their outcomes to [`CoordinationState`], restarts lagging
//! agents when state changes, checks for consensus, and drives the winner's
//! final presentation (§4.6).
//!
//! Mirrors the teacher's `Runner` driving loop generalized from one agent to
//! N concurrent ones: each agent's Working transition runs as an owned task
//! in a [`JoinSet`], and the Orchestrator itself never blocks on any single
//! agent — it reacts to whichever turn finishes first, exactly as
//! `agent::runner::Runner::process_step` reacts to whichever tool call or
//! LLM response arrives next.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::events::{DomainEvent, EventBus, SessionOutcome};
use crate::hooks::HookPair;
use crate::runner::{AgentHandle, CoordinationOutcome, Runner};
use crate::state::{AgentStatus, CoordinationState};
use crate::tool::router::DeferredCall;

/// Session-wide knobs the Orchestrator is constructed with.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Whether side-effecting tool calls are deferred during coordination.
    pub planning_mode: bool,
    /// Extra prompt text appended while `planning_mode` is active.
    pub planning_mode_instruction: Option<String>,
    /// Wall-clock budget for the whole session.
    pub session_timeout: Duration,
    /// Consecutive non-cancellation errors an agent tolerates before being
    /// marked [`AgentStatus::Failed`].
    pub max_consecutive_failures: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            planning_mode: true,
            planning_mode_instruction: None,
            session_timeout: Duration::from_secs(15 * 60),
            max_consecutive_failures: 3,
        }
    }
}

/// What a completed session produced, alongside the raw [`SessionOutcome`]
/// recorded on the event bus.
#[derive(Debug)]
pub struct SessionResult {
    /// Terminal outcome classification.
    pub outcome: SessionOutcome,
    /// The winner's final-presentation text, if a winner was selected and
    /// final presentation ran successfully.
    pub final_answer: Option<String>,
}

/// Drives a session of N agents to consensus (or a forced termination).
pub struct Orchestrator {
    state: CoordinationState,
    event_bus: EventBus,
    config: OrchestratorConfig,
}

struct RunningAgent {
    cancel: CancellationToken,
    started_at_generation: u64,
}

impl Orchestrator {
    /// Construct an orchestrator over `agent_ids`, all starting `Idle`.
    #[must_use]
    pub fn new(agent_ids: impl IntoIterator<Item = String>, event_bus: EventBus, config: OrchestratorConfig) -> Self {
        Self {
            state: CoordinationState::new(agent_ids),
            event_bus,
            config,
        }
    }

    /// Run the session to completion: coordination phase, then the winner's
    /// final presentation.
    ///
    /// # Errors
    ///
    /// Propagates workspace errors encountered while snapshotting or
    /// refreshing peer views, and errors from the winner's final-presentation
    /// turn.
    #[instrument(skip_all)]
    pub async fn run(mut self, handles: Vec<Arc<AgentHandle>>) -> Result<SessionResult> {
        let by_id: HashMap<String, Arc<AgentHandle>> =
            handles.iter().map(|h| (h.agent_id.clone(), Arc::clone(h))).collect();

        for handle in &handles {
            handle.workspace.prepare(&handle.agent_id).await?;
        }

        let mut deferred_by_agent: HashMap<String, Vec<DeferredCall>> = HashMap::new();
        let mut running: HashMap<String, RunningAgent> = HashMap::new();
        let mut failures: HashMap<String, u32> = HashMap::new();
        let mut tasks: JoinSet<(String, Result<(CoordinationOutcome, Vec<DeferredCall>)>)> = JoinSet::new();

        for handle in &handles {
            HookPair::new(&self.event_bus, None).agent_started(&handle.agent_id).await;
            self.spawn_turn(handle, &mut tasks, &mut running).await;
        }

        let deadline = tokio::time::Instant::now() + self.config.session_timeout;

        let outcome = loop {
            if self.state.consensus_reached() {
                break self.finalize_consensus().await;
            }
            if self.state.all_terminal() {
                break self.build_outcome(ConsensusKind::Exhausted);
            }

            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    warn!("session timed out");
                    break self.build_outcome(ConsensusKind::TimedOut);
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else {
                        // No agent is running and nobody reached consensus: stuck.
                        break self.build_outcome(ConsensusKind::Exhausted);
                    };
                    let (agent_id, result) = joined.map_err(|e| Error::fatal(format!("agent task panicked: {e}")))?;
                    running.remove(&agent_id);

                    let Some(handle) = by_id.get(&agent_id) else { continue };
                    self.handle_turn_result(handle, result, &mut deferred_by_agent, &mut failures).await?;

                    if self.state.status_of(&agent_id).is_some_and(|s| !s.is_terminal()) {
                        self.spawn_turn(handle, &mut tasks, &mut running).await;
                    }
                    self.restart_stale_agents(&running);
                }
            }
        };

        for agent in running.values() {
            agent.cancel.cancel();
        }
        while tasks.join_next().await.is_some() {}

        let final_answer = match outcome.winner_label() {
            Some(label) => self.run_final_presentation(label, &by_id, &deferred_by_agent).await?,
            None => None,
        };

        self.event_bus.send(DomainEvent::SessionEnded { outcome: outcome.clone() }).await;

        Ok(SessionResult { outcome, final_answer })
    }

    async fn spawn_turn(
        &mut self,
        handle: &Arc<AgentHandle>,
        tasks: &mut JoinSet<(String, Result<(CoordinationOutcome, Vec<DeferredCall>)>)>,
        running: &mut HashMap<String, RunningAgent>,
    ) {
        let agent_id = handle.agent_id.clone();
        self.state.apply_status(&agent_id, AgentStatus::Working);
        HookPair::new(&self.event_bus, None).status_changed(&agent_id, AgentStatus::Working).await;
        let view = self.state.snapshot();
        let generation = view.generation;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let instruction = self.config.planning_mode_instruction.clone();
        let handle = Arc::clone(handle);

        tasks.spawn(async move {
            let result = Runner::run_turn(&handle, &view, instruction.as_deref(), &task_cancel).await;
            (handle.agent_id.clone(), result)
        });

        running.insert(agent_id, RunningAgent { cancel, started_at_generation: generation });
    }

    async fn handle_turn_result(
        &mut self,
        handle: &Arc<AgentHandle>,
        result: Result<(CoordinationOutcome, Vec<DeferredCall>)>,
        deferred_by_agent: &mut HashMap<String, Vec<DeferredCall>>,
        failures: &mut HashMap<String, u32>,
    ) -> Result<()> {
        let agent_id = &handle.agent_id;

        match result {
            Ok((outcome, deferred)) => {
                failures.remove(agent_id);
                deferred_by_agent.entry(agent_id.clone()).or_default().extend(deferred);
                match self.apply_outcome(handle, outcome).await {
                    Ok(()) | Err(Error::SessionClosed) => {}
                    Err(err) => return Err(err),
                }
            }
            Err(Error::Cancelled) => {
                info!(agent = agent_id.as_str(), "turn cancelled for restart");
                self.state.apply_status(agent_id, AgentStatus::Restarted);
                HookPair::new(&self.event_bus, None).status_changed(agent_id, AgentStatus::Restarted).await;
            }
            Err(err) => {
                warn!(agent = agent_id.as_str(), error = %err, "agent turn failed");
                let count = failures.entry(agent_id.clone()).or_insert(0);
                *count += 1;
                let status = if *count >= self.config.max_consecutive_failures {
                    AgentStatus::Failed
                } else {
                    AgentStatus::Restarted
                };
                self.state.apply_status(agent_id, status);
                HookPair::new(&self.event_bus, None).status_changed(agent_id, status).await;
            }
        }
        Ok(())
    }

    async fn apply_outcome(&mut self, handle: &Arc<AgentHandle>, outcome: CoordinationOutcome) -> Result<()> {
        let agent_id = &handle.agent_id;
        let hooks = HookPair::new(&self.event_bus, None);

        if !matches!(outcome, CoordinationOutcome::NoAction) && self.state.consensus_reached() {
            warn!(agent = agent_id.as_str(), "coordination call rejected: session already closed");
            return Err(Error::SessionClosed);
        }

        match outcome {
            CoordinationOutcome::Answer { content } => {
                let snapshot_id = format!("{agent_id}-{}", Uuid::new_v4());
                handle.workspace.snapshot(agent_id, &snapshot_id).await?;
                let answer = self.state.apply_new_answer(agent_id, content, snapshot_id);
                hooks.answer_published(&answer.label, agent_id).await;
                hooks.status_changed(agent_id, AgentStatus::AnswerPublished).await;
                for other in self.state.snapshot().status.keys() {
                    if other != agent_id {
                        handle.workspace.refresh_shared_view(other, agent_id, &answer.snapshot_id).await?;
                    }
                }
            }
            CoordinationOutcome::Vote { target, reason } => match self.state.apply_vote(agent_id, target, reason) {
                Ok(vote) => {
                    hooks.vote_cast(agent_id, &vote.target_label, &vote.reason).await;
                    hooks.status_changed(agent_id, AgentStatus::Voted).await;
                }
                Err(err) => {
                    warn!(agent = agent_id.as_str(), error = %err, "vote targeted a stale answer, restarting");
                    self.state.apply_status(agent_id, AgentStatus::Restarted);
                    hooks.status_changed(agent_id, AgentStatus::Restarted).await;
                }
            },
            CoordinationOutcome::NoAction => {
                self.state.apply_status(agent_id, AgentStatus::Completed);
                hooks.status_changed(agent_id, AgentStatus::Completed).await;
            }
        }
        Ok(())
    }

    /// Cancel every running turn whose view predates the current generation,
    /// except an agent whose current vote still targets a live answer: a
    /// plain generation bump elsewhere does not invalidate that vote, so
    /// restarting it would just re-cast the same vote after wasting a turn
    /// (§4.6 step 2). Each cancelled agent comes back through
    /// `tasks.join_next()` as `Err(Error::Cancelled)`, which
    /// [`Self::handle_turn_result`] turns into an `AgentStatus::Restarted`
    /// transition and a fresh spawn.
    fn restart_stale_agents(&self, running: &HashMap<String, RunningAgent>) {
        let current_generation = self.state.generation();
        for (agent_id, agent) in running {
            if agent.started_at_generation < current_generation && !self.state.has_live_vote(agent_id) {
                agent.cancel.cancel();
            }
        }
    }

    /// Freeze the session on consensus (§4.6 step 3): mark every agent still
    /// in a live status `Completed` so the session satisfies "all runners
    /// reached terminal status" before building the consensus outcome.
    async fn finalize_consensus(&mut self) -> SessionOutcome {
        let live: Vec<String> = self
            .state
            .snapshot()
            .status
            .iter()
            .filter(|(_, status)| !status.is_terminal())
            .map(|(agent, _)| agent.clone())
            .collect();

        let hooks = HookPair::new(&self.event_bus, None);
        for agent in live {
            self.state.apply_status(&agent, AgentStatus::Completed);
            hooks.status_changed(&agent, AgentStatus::Completed).await;
        }

        self.build_outcome(ConsensusKind::Reached)
    }

    fn build_outcome(&self, kind: ConsensusKind) -> SessionOutcome {
        match kind {
            ConsensusKind::Reached => {
                let winner_label = self.state.select_winner().map(|a| a.label.clone()).unwrap_or_default();
                SessionOutcome::Consensus { winner_label }
            }
            ConsensusKind::TimedOut => SessionOutcome::Timeout {
                winner_label: self.state.select_winner().map(|a| a.label.clone()),
            },
            ConsensusKind::Exhausted => match self.state.select_winner() {
                Some(answer) => SessionOutcome::Degenerate { winner_label: answer.label.clone() },
                None => SessionOutcome::Aborted { message: "no agent published an answer".to_owned() },
            },
        }
    }

    async fn run_final_presentation(
        &self,
        winner_label: String,
        by_id: &HashMap<String, Arc<AgentHandle>>,
        deferred_by_agent: &HashMap<String, Vec<DeferredCall>>,
    ) -> Result<Option<String>> {
        let view = self.state.snapshot();
        let Some(winner_answer) = view.latest_by_author.values().find(|a| a.label == winner_label) else {
            return Ok(None);
        };
        let Some(winner_handle) = by_id.get(&winner_answer.author) else {
            return Ok(None);
        };

        self.event_bus
            .send(DomainEvent::ConsensusReached { winner_label: winner_label.clone() })
            .await;

        let empty = Vec::new();
        let deferred = deferred_by_agent.get(&winner_answer.author).unwrap_or(&empty);
        let cancel = CancellationToken::new();
        let text = Runner::run_final(winner_handle, &view, deferred, &cancel).await?;
        Ok(Some(text))
    }
}

enum ConsensusKind {
    Reached,
    TimedOut,
    Exhausted,
}

impl SessionOutcome {
    /// Label of the winning answer, if this outcome selected one.
    #[must_use]
    pub fn winner_label(&self) -> Option<String> {
        match self {
            Self::Consensus { winner_label } | Self::Degenerate { winner_label } => Some(winner_label.clone()),
            Self::Timeout { winner_label } => winner_label.clone(),
            Self::Aborted { .. } => None,
        }
    }
}
