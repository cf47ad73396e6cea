//! Workspace Manager (C3): per-agent working directories, immutable
//! publish-time snapshots, and each agent's read-only view of its peers'
//! latest snapshots.

pub mod policy;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Error, Result};

use policy::{Decision, ReadBeforeDeleteTracker, WorkspaceOp, WorkspacePolicy};

/// Root directory layout and policy enforcement for a session's workspaces.
///
/// `work/<agent>` is exclusive to that agent; `snapshots/` is append-only and
/// globally readable; `shared_view/<agent>/<other>` is a read-only view the
/// manager points at `other`'s most recent snapshot.
pub struct WorkspaceManager {
    root: PathBuf,
    policy: Arc<dyn WorkspacePolicy>,
    tracker: Mutex<ReadBeforeDeleteTracker>,
}

impl std::fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl WorkspaceManager {
    /// Create a manager rooted at `root`, using `policy` for delete checks.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, policy: Arc<dyn WorkspacePolicy>) -> Self {
        Self {
            root: root.into(),
            policy,
            tracker: Mutex::new(ReadBeforeDeleteTracker::new()),
        }
    }

    fn work_dir(&self, agent: &str) -> PathBuf {
        self.root.join("work").join(agent)
    }

    fn snapshot_dir(&self, snapshot_id: &str) -> PathBuf {
        self.root.join("snapshots").join(snapshot_id)
    }

    fn shared_view_dir(&self, agent: &str, other: &str) -> PathBuf {
        self.root.join("shared_view").join(agent).join(other)
    }

    /// Fresh or resumed work directory for `agent`. Returns its root path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workspace`] if the directory cannot be created.
    pub async fn prepare(&self, agent: &str) -> Result<PathBuf> {
        let dir = self.work_dir(agent);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::workspace(agent, e.to_string()))?;

        let mut tracker = self.tracker.lock().await;
        tracker.record_created(agent, &dir);
        Ok(dir)
    }

    /// Atomically copy `work/<agent>` into a new snapshot directory.
    ///
    /// The copy is built under a temporary sibling directory and renamed
    /// into place so that a concurrent reader of `shared_view/<other>/`
    /// never observes a partially-written snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workspace`] if the copy or the atomic rename fails;
    /// on failure no partial snapshot is left visible.
    pub async fn snapshot(&self, agent: &str, snapshot_id: &str) -> Result<PathBuf> {
        let source = self.work_dir(agent);
        let dest = self.snapshot_dir(snapshot_id);
        let staging = self.root.join("snapshots").join(format!(".{snapshot_id}.staging"));

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::workspace(agent, e.to_string()))?;
        }

        copy_dir_recursive(&source, &staging)
            .await
            .map_err(|e| Error::workspace(agent, e.to_string()))?;

        tokio::fs::rename(&staging, &dest)
            .await
            .map_err(|e| Error::workspace(agent, e.to_string()))?;

        Ok(dest)
    }

    /// Point each sub-path of `shared_view/<agent>/` at the most recent
    /// snapshot of the corresponding other agent.
    ///
    /// Each sub-path is refreshed independently (remove then recreate as a
    /// copy of the latest snapshot), so a reader observes either the old or
    /// new target for that sub-path, never a mix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Workspace`] if any refresh fails.
    pub async fn refresh_shared_view(
        &self,
        agent: &str,
        other: &str,
        latest_snapshot_id: &str,
    ) -> Result<()> {
        let target = self.shared_view_dir(agent, other);
        let source = self.snapshot_dir(latest_snapshot_id);
        let staging = target.with_extension("staging");

        if staging.exists() {
            tokio::fs::remove_dir_all(&staging)
                .await
                .map_err(|e| Error::workspace(agent, e.to_string()))?;
        }
        copy_dir_recursive(&source, &staging)
            .await
            .map_err(|e| Error::workspace(agent, e.to_string()))?;

        if target.exists() {
            tokio::fs::remove_dir_all(&target)
                .await
                .map_err(|e| Error::workspace(agent, e.to_string()))?;
        }
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(|e| Error::workspace(agent, e.to_string()))?;

        Ok(())
    }

    /// Record that `agent` read `path`, enabling a later delete.
    pub async fn record_read(&self, agent: &str, path: &Path) {
        self.tracker.lock().await.record_read(agent, path);
    }

    /// Check and perform a policy-gated delete of `path` on behalf of `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PolicyViolation`] if the policy denies the delete or
    /// the read-before-delete rule is violated; returns [`Error::Workspace`]
    /// if the underlying filesystem operation fails.
    pub async fn delete_policy(&self, agent: &str, path: &Path) -> Result<()> {
        match self.policy.check(agent, WorkspaceOp::Delete, path) {
            Decision::Deny(reason) | Decision::RequireApproval(reason) => {
                return Err(Error::policy_violation("delete", reason));
            }
            Decision::Allow => {}
        }

        let tracker = self.tracker.lock().await;
        if !tracker.may_delete(agent, path) {
            return Err(Error::policy_violation(
                "delete",
                format!("'{}' was not created or read by '{agent}' this session", path.display()),
            ));
        }
        drop(tracker);

        if path.is_dir() {
            tokio::fs::remove_dir_all(path)
                .await
                .map_err(|e| Error::workspace(agent, e.to_string()))?;
        } else {
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| Error::workspace(agent, e.to_string()))?;
        }
        Ok(())
    }
}

fn copy_dir_recursive<'a>(
    source: &'a Path,
    dest: &'a Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dest).await?;
        if !source.exists() {
            return Ok(());
        }
        let mut entries = tokio::fs::read_dir(source).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let src_path = entry.path();
            let dst_path = dest.join(entry.file_name());
            if file_type.is_dir() {
                copy_dir_recursive(&src_path, &dst_path).await?;
            } else {
                tokio::fs::copy(&src_path, &dst_path).await?;
            }
        }
        Ok(())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use policy::AllowAll;

    fn manager(root: &Path) -> WorkspaceManager {
        WorkspaceManager::new(root, Arc::new(AllowAll))
    }

    #[tokio::test]
    async fn prepare_creates_work_dir() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mgr = manager(tmp.path());
        let dir = mgr.prepare("agent1").await.unwrap();
        assert!(dir.exists());
    }

    #[tokio::test]
    async fn snapshot_copies_work_dir_contents() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mgr = manager(tmp.path());
        let work = mgr.prepare("agent1").await.unwrap();
        tokio::fs::write(work.join("note.txt"), b"hello").await.unwrap();

        let snap = mgr.snapshot("agent1", "snap-1").await.unwrap();
        let contents = tokio::fs::read(snap.join("note.txt")).await.unwrap();
        assert_eq!(contents, b"hello");
    }

    #[tokio::test]
    async fn refresh_shared_view_exposes_latest_snapshot() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mgr = manager(tmp.path());
        let work = mgr.prepare("agent2").await.unwrap();
        tokio::fs::write(work.join("answer.txt"), b"agent2 says hi").await.unwrap();
        mgr.snapshot("agent2", "snap-2").await.unwrap();

        mgr.refresh_shared_view("agent1", "agent2", "snap-2").await.unwrap();

        let view_path = mgr.shared_view_dir("agent1", "agent2").join("answer.txt");
        let contents = tokio::fs::read(view_path).await.unwrap();
        assert_eq!(contents, b"agent2 says hi");
    }

    #[tokio::test]
    async fn delete_without_read_or_create_is_denied() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mgr = manager(tmp.path());
        let untouched = tmp.path().join("untouched.txt");
        tokio::fs::write(&untouched, b"x").await.unwrap();

        let err = mgr.delete_policy("agent1", &untouched).await.unwrap_err();
        assert!(matches!(err, Error::PolicyViolation { .. }));
        assert!(untouched.exists());
    }

    #[tokio::test]
    async fn delete_after_create_succeeds() {
        let tmp = assert_fs::TempDir::new().unwrap();
        let mgr = manager(tmp.path());
        let work = mgr.prepare("agent1").await.unwrap();
        let file = work.join("scratch.txt");
        tokio::fs::write(&file, b"x").await.unwrap();
        mgr.record_read("agent1", &work).await;

        mgr.delete_policy("agent1", &file).await.unwrap();
        assert!(!file.exists());
    }
}
