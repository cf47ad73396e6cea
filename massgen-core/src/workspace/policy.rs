//! Filesystem access policy for the Workspace Manager, generalized from the
//! teacher's transaction-policy `Decision::{Allow, Deny(String),
//! RequireApproval(String)}` pattern to filesystem operations (§4.3, §9).

use std::collections::HashSet;
use std::path::Path;

/// A policy decision for a requested filesystem operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Allow the operation.
    Allow,
    /// Deny the operation with a reason.
    Deny(String),
    /// Require external (human or orchestrator-level) approval before proceeding.
    RequireApproval(String),
}

/// Kind of filesystem operation a policy is asked to judge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceOp {
    /// Create or overwrite a file.
    Write,
    /// Read a file.
    Read,
    /// Delete a file.
    Delete,
}

/// Trait for pluggable workspace access policies.
pub trait WorkspacePolicy: Send + Sync {
    /// Judge whether `agent` may perform `op` on `path`.
    fn check(&self, agent: &str, op: WorkspaceOp, path: &Path) -> Decision;
}

/// A permissive policy allowing every operation; the default for sessions
/// that don't configure a stricter one.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl WorkspacePolicy for AllowAll {
    fn check(&self, _agent: &str, _op: WorkspaceOp, _path: &Path) -> Decision {
        Decision::Allow
    }
}

/// Per-agent tracker of created and read paths, used to enforce the
/// read-before-delete rule from §4.3: an agent may delete a path only if it
/// created that path this session, or has previously read it.
#[derive(Debug, Clone, Default)]
pub struct ReadBeforeDeleteTracker {
    created: HashSet<(String, String)>,
    read: HashSet<(String, String)>,
}

impl ReadBeforeDeleteTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(agent: &str, path: &Path) -> (String, String) {
        (agent.to_owned(), path.to_string_lossy().into_owned())
    }

    /// Record that `agent` created `path` this session.
    pub fn record_created(&mut self, agent: &str, path: &Path) {
        self.created.insert(Self::key(agent, path));
    }

    /// Record that `agent` read `path`.
    pub fn record_read(&mut self, agent: &str, path: &Path) {
        self.read.insert(Self::key(agent, path));
    }

    /// Returns `true` if `agent` is allowed to delete `path`: it created the
    /// path this session, or has previously read it.
    #[must_use]
    pub fn may_delete(&self, agent: &str, path: &Path) -> bool {
        let key = Self::key(agent, path);
        self.created.contains(&key) || self.read.contains(&key)
    }
}
