//! Coordination State (C5): the single-writer store of answers, votes, and
//! agent status that the Orchestrator mutates and every Agent Runner reads
//! immutable snapshots of.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Status of an agent's participation in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Not yet started.
    Idle,
    /// Mid-turn with the backend.
    Working,
    /// Has a currently-live published answer.
    AnswerPublished,
    /// Has a currently-live cast vote.
    Voted,
    /// Was signaled to restart and has not yet re-published or re-voted.
    Restarted,
    /// Reached a terminal successful state for this session.
    Completed,
    /// Reached a terminal failure state (e.g. repeated backend errors).
    Failed,
}

impl AgentStatus {
    /// Returns `true` if this status is terminal (`Completed` or `Failed`).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// An immutable answer published by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Label of the form `agent{N}.{attempt}`, or `agent{N}.final` for the winner's final answer.
    pub label: String,
    /// Author agent id.
    pub author: String,
    /// Answer body.
    pub content: String,
    /// Workspace snapshot frozen at publish time.
    pub snapshot_id: String,
    /// Logical publish order; strictly increasing across the whole session.
    pub created_at: u64,
}

/// A vote cast by one agent for another agent's latest answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    /// Agent that cast the vote.
    pub voter: String,
    /// Label of the targeted answer.
    pub target_label: String,
    /// Stated reason for the vote.
    pub reason: String,
    /// Logical order the vote was cast at.
    pub cast_at: u64,
}

/// Cheap, immutable handle over coordination state as of a given `generation`,
/// used to build Agent Runner prompts without holding a lock on the writer.
#[derive(Debug, Clone)]
pub struct ImmutableView {
    /// Generation this view was taken at.
    pub generation: u64,
    /// Latest answer authored by each agent, keyed by agent id.
    pub latest_by_author: BTreeMap<String, Answer>,
    /// Current vote per voter.
    pub votes: BTreeMap<String, Vote>,
    /// Current status per agent.
    pub status: BTreeMap<String, AgentStatus>,
}

impl ImmutableView {
    /// Vote tally over `latest_by_author`, keyed by target author agent id.
    #[must_use]
    pub fn tally(&self) -> BTreeMap<String, usize> {
        let mut tally: BTreeMap<String, usize> = self
            .latest_by_author
            .keys()
            .map(|author| (author.clone(), 0))
            .collect();
        for vote in self.votes.values() {
            if let Some(author) = self
                .latest_by_author
                .iter()
                .find(|(_, answer)| answer.label == vote.target_label)
                .map(|(author, _)| author.clone())
            {
                *tally.entry(author).or_insert(0) += 1;
            }
        }
        tally
    }
}

/// Single-writer store of the session's answers, votes, and agent status.
///
/// Every mutating method is `&mut self`; the Orchestrator is the only owner.
/// Readers operate on [`ImmutableView`]s produced by [`Self::snapshot`].
#[derive(Debug, Default)]
pub struct CoordinationState {
    answers: Vec<Answer>,
    latest_by_author: BTreeMap<String, Answer>,
    attempts: BTreeMap<String, u32>,
    votes: BTreeMap<String, Vote>,
    status: BTreeMap<String, AgentStatus>,
    generation: u64,
    clock: u64,
}

impl CoordinationState {
    /// Construct an empty state with every agent in `Idle` status.
    #[must_use]
    pub fn new(agent_ids: impl IntoIterator<Item = String>) -> Self {
        let status = agent_ids
            .into_iter()
            .map(|id| (id, AgentStatus::Idle))
            .collect();
        Self {
            status,
            ..Self::default()
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// Current generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply a newly published answer from `agent`.
    ///
    /// Increments the agent's attempt counter, appends to the answer log,
    /// updates `latest_by_author`, and bumps `generation`. Any vote targeting
    /// the agent's previous latest answer is left in place but becomes stale
    /// (see [`Self::vote_is_stale`]): the vote record itself is the only
    /// place its target label is remembered, so removing it here would make
    /// `vote_is_stale` unable to tell a superseded vote from no vote at all.
    pub fn apply_new_answer(
        &mut self,
        agent: &str,
        content: impl Into<String>,
        snapshot_id: impl Into<String>,
    ) -> Answer {
        let attempt = self.attempts.entry(agent.to_owned()).or_insert(0);
        *attempt += 1;
        let label = format!("{agent}.{attempt}", attempt = *attempt);

        let created_at = self.tick();
        let answer = Answer {
            label: label.clone(),
            author: agent.to_owned(),
            content: content.into(),
            snapshot_id: snapshot_id.into(),
            created_at,
        };

        self.answers.push(answer.clone());
        self.latest_by_author.insert(agent.to_owned(), answer.clone());

        self.status.insert(agent.to_owned(), AgentStatus::AnswerPublished);
        self.bump_generation();
        answer
    }

    /// Apply a cast or replaced vote from `voter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinationCall`] if `target_label` is not
    /// one of the currently-live latest answers.
    pub fn apply_vote(
        &mut self,
        voter: &str,
        target_label: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<Vote> {
        let target_label = target_label.into();
        let target_live = self
            .latest_by_author
            .values()
            .any(|answer| answer.label == target_label);
        if !target_live {
            return Err(Error::invalid_coordination_call(
                "vote",
                format!("'{target_label}' is not a current latest answer"),
            ));
        }

        let cast_at = self.tick();
        let vote = Vote {
            voter: voter.to_owned(),
            target_label,
            reason: reason.into(),
            cast_at,
        };
        self.votes.insert(voter.to_owned(), vote.clone());
        self.status.insert(voter.to_owned(), AgentStatus::Voted);
        self.bump_generation();
        Ok(vote)
    }

    /// Apply an agent status transition.
    ///
    /// Bumps `generation` only when the transition is externally visible,
    /// i.e. it is not a no-op and not a purely-internal `Working` re-entry.
    pub fn apply_status(&mut self, agent: &str, status: AgentStatus) {
        let previous = self.status.insert(agent.to_owned(), status);
        if previous != Some(status) {
            self.bump_generation();
        }
    }

    /// Status of `agent`, if known.
    #[must_use]
    pub fn status_of(&self, agent: &str) -> Option<AgentStatus> {
        self.status.get(agent).copied()
    }

    /// Returns `true` if every agent has reached a terminal status.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        !self.status.is_empty() && self.status.values().all(|s| s.is_terminal())
    }

    /// Whether `voter`'s current vote, if any, still targets a live answer.
    #[must_use]
    pub fn vote_is_stale(&self, voter: &str) -> bool {
        match self.votes.get(voter) {
            None => false,
            Some(vote) => !self
                .latest_by_author
                .values()
                .any(|a| a.label == vote.target_label),
        }
    }

    /// Whether `agent` currently holds a vote that still targets a live
    /// answer. Restarting an agent for a mere generation bump should not
    /// disturb it if this holds (§4.6 step 2).
    #[must_use]
    pub fn has_live_vote(&self, agent: &str) -> bool {
        self.votes.contains_key(agent) && !self.vote_is_stale(agent)
    }

    /// Take an immutable, generation-labeled view of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ImmutableView {
        ImmutableView {
            generation: self.generation,
            latest_by_author: self.latest_by_author.clone(),
            votes: self.votes.clone(),
            status: self.status.clone(),
        }
    }

    /// Full answer log, in publish order.
    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    /// Consensus predicate (§4.5): every live agent is either voting for a
    /// live answer, or is the author of a live answer that receives at
    /// least one vote from a different agent.
    #[must_use]
    pub fn consensus_reached(&self) -> bool {
        let live_agents: Vec<&String> = self
            .status
            .iter()
            .filter(|(_, status)| !status.is_terminal())
            .map(|(agent, _)| agent)
            .collect();

        if live_agents.is_empty() {
            return false;
        }

        live_agents.into_iter().all(|agent| {
            let is_voting = self
                .votes
                .get(agent)
                .is_some_and(|vote| self.latest_by_author.values().any(|a| a.label == vote.target_label));
            let is_voted_for = self.latest_by_author.get(agent).is_some_and(|answer| {
                self.votes
                    .values()
                    .any(|vote| vote.target_label == answer.label && vote.voter != *agent)
            });
            is_voting || is_voted_for
        })
    }

    /// Select the winning author: highest vote count, ties broken by
    /// earliest answer, then lexicographically smallest agent id.
    #[must_use]
    pub fn select_winner(&self) -> Option<&Answer> {
        let view = self.snapshot();
        let tally = view.tally();

        self.latest_by_author
            .values()
            .max_by(|a, b| {
                let votes_a = tally.get(&a.author).copied().unwrap_or(0);
                let votes_b = tally.get(&b.author).copied().unwrap_or(0);
                votes_a
                    .cmp(&votes_b)
                    .then_with(|| b.created_at.cmp(&a.created_at))
                    .then_with(|| b.author.cmp(&a.author))
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn state_with(agents: &[&str]) -> CoordinationState {
        CoordinationState::new(agents.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn new_answer_assigns_contiguous_attempts() {
        let mut state = state_with(&["agent1"]);
        let a1 = state.apply_new_answer("agent1", "first", "snap1");
        let a2 = state.apply_new_answer("agent1", "second", "snap2");
        assert_eq!(a1.label, "agent1.1");
        assert_eq!(a2.label, "agent1.2");
    }

    #[test]
    fn new_answer_bumps_generation() {
        let mut state = state_with(&["agent1"]);
        assert_eq!(state.generation(), 0);
        state.apply_new_answer("agent1", "x", "s1");
        assert_eq!(state.generation(), 1);
    }

    #[test]
    fn vote_for_unknown_label_is_rejected() {
        let mut state = state_with(&["agent1", "agent2"]);
        state.apply_new_answer("agent1", "x", "s1");
        let err = state.apply_vote("agent2", "agent1.99", "why not").unwrap_err();
        assert!(matches!(err, Error::InvalidCoordinationCall { .. }));
    }

    #[test]
    fn vote_for_live_label_succeeds() {
        let mut state = state_with(&["agent1", "agent2"]);
        state.apply_new_answer("agent1", "x", "s1");
        let vote = state.apply_vote("agent2", "agent1.1", "good").unwrap();
        assert_eq!(vote.target_label, "agent1.1");
    }

    #[test]
    fn supersession_invalidates_stale_vote() {
        let mut state = state_with(&["agent1", "agent2"]);
        state.apply_new_answer("agent1", "x", "s1");
        state.apply_vote("agent2", "agent1.1", "good").unwrap();
        state.apply_new_answer("agent1", "y", "s2");
        assert!(state.vote_is_stale("agent2"));
    }

    #[test]
    fn s1_three_agent_convergence() {
        let mut state = state_with(&["agent1", "agent2", "agent3"]);
        state.apply_new_answer("agent1", "answer-alpha", "s1");
        state.apply_new_answer("agent2", "answer-beta", "s2");
        state.apply_vote("agent3", "agent2.1", "best").unwrap();
        state.apply_vote("agent1", "agent2.1", "agree").unwrap();
        state.apply_vote("agent2", "agent2.1", "self").unwrap();

        assert!(state.consensus_reached());
        let winner = state.select_winner().unwrap();
        assert_eq!(winner.label, "agent2.1");
    }

    #[test]
    fn s2_supersession_marks_vote_stale_without_removing_it() {
        let mut state = state_with(&["agent1", "agent2"]);
        state.apply_new_answer("agent1", "first", "s1");
        state.apply_vote("agent2", "agent1.1", "ok").unwrap();
        state.apply_new_answer("agent1", "second", "s2");

        assert_eq!(state.latest_by_author.get("agent1").unwrap().label, "agent1.2");
        assert!(state.vote_is_stale("agent2"));
        assert_eq!(state.votes.get("agent2").unwrap().target_label, "agent1.1");
        assert!(state.answers().iter().any(|a| a.label == "agent1.1"));
    }

    #[test]
    fn s4_tie_break_by_earliest_answer() {
        let mut state = state_with(&["agent1", "agent2"]);
        state.apply_new_answer("agent1", "x", "s1");
        state.apply_new_answer("agent2", "y", "s2");
        state.apply_vote("agent2", "agent1.1", "earlier").unwrap();
        state.apply_vote("agent1", "agent2.1", "later").unwrap();

        let winner = state.select_winner().unwrap();
        assert_eq!(winner.author, "agent1");
    }

    #[test]
    fn all_terminal_false_until_every_agent_terminal() {
        let mut state = state_with(&["agent1", "agent2"]);
        assert!(!state.all_terminal());
        state.apply_status("agent1", AgentStatus::Completed);
        assert!(!state.all_terminal());
        state.apply_status("agent2", AgentStatus::Failed);
        assert!(state.all_terminal());
    }

    #[test]
    fn status_reapply_same_value_does_not_bump_generation() {
        let mut state = state_with(&["agent1"]);
        state.apply_status("agent1", AgentStatus::Working);
        let gen_before = state.generation();
        state.apply_status("agent1", AgentStatus::Working);
        assert_eq!(state.generation(), gen_before);
    }

    #[test]
    fn winner_selection_is_pure() {
        let mut state = state_with(&["agent1", "agent2"]);
        state.apply_new_answer("agent1", "x", "s1");
        state.apply_new_answer("agent2", "y", "s2");
        state.apply_vote("agent1", "agent2.1", "r").unwrap();
        state.apply_vote("agent2", "agent2.1", "r").unwrap();

        let first = state.select_winner().unwrap().label.clone();
        let second = state.select_winner().unwrap().label.clone();
        assert_eq!(first, second);
    }
}
