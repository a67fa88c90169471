//! Worktree manager (C5).
//!
//! Gives every spawned agent an isolated git worktree branched off a base
//! ref, so parallel agents never collide on the same working tree. One
//! worktree per task, created just before the agent's session starts and
//! destroyed once the agent is terminated.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Worktree, WorktreeStatus};
use crate::domain::ports::WorktreeRepository;

/// Configuration for where/how worktrees are created.
#[derive(Debug, Clone)]
pub struct WorktreeServiceConfig {
    /// Parent directory worktrees are created under.
    pub base_path: String,
    /// Branch/ref new task branches are created from.
    pub base_ref: String,
}

impl Default for WorktreeServiceConfig {
    fn default() -> Self {
        Self { base_path: ".abathur/worktrees".to_string(), base_ref: "main".to_string() }
    }
}

/// Worktree manager: creates and destroys one git worktree per task.
pub struct WorktreeService {
    repository: std::sync::Arc<dyn WorktreeRepository>,
    config: WorktreeServiceConfig,
}

impl WorktreeService {
    pub fn new(repository: std::sync::Arc<dyn WorktreeRepository>, config: WorktreeServiceConfig) -> Self {
        Self { repository, config }
    }

    pub fn with_defaults(repository: std::sync::Arc<dyn WorktreeRepository>) -> Self {
        Self::new(repository, WorktreeServiceConfig::default())
    }

    /// Create a worktree for a task: a fresh branch off `base_ref`, checked
    /// out at `<base_path>/task-<short id>`. Idempotent: if an active
    /// worktree already exists for this task, it is returned unchanged.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn create(&self, task_id: Uuid) -> DomainResult<Worktree> {
        if let Some(existing) = self.repository.get_by_task(task_id).await? {
            if !existing.status.is_terminal() {
                debug!(task_id = %task_id, path = %existing.path, "reusing existing worktree");
                return Ok(existing);
            }
        }

        let branch = Worktree::branch_name_for_task(task_id);
        let path = Worktree::path_for_task(&self.config.base_path, task_id);

        self.ensure_parent_exists(&path).await?;
        self.verify_base_ref_exists(&self.config.base_ref).await?;
        self.git_worktree_add(&branch, &self.config.base_ref, &path).await?;

        let mut worktree = Worktree::new(task_id, path.clone(), branch.clone(), self.config.base_ref.clone());
        worktree.activate();
        self.repository.create(&worktree).await?;

        info!(task_id = %task_id, branch = %branch, path = %path, "worktree created");
        Ok(worktree)
    }

    /// Remove the task's worktree and delete its branch. A missing worktree
    /// is not an error: termination must be safe to call more than once.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn destroy(&self, task_id: Uuid) -> DomainResult<()> {
        let Some(mut worktree) = self.repository.get_by_task(task_id).await? else {
            return Ok(());
        };
        if worktree.status == WorktreeStatus::Removed {
            return Ok(());
        }

        if Path::new(&worktree.path).exists() {
            if let Err(e) = self.git_worktree_remove(&worktree.path).await {
                warn!(task_id = %task_id, error = %e, "worktree remove failed, leaving directory for manual cleanup");
            }
        }
        let _ = self.git_branch_delete(&worktree.branch).await;

        worktree.remove();
        self.repository.update(&worktree).await?;
        Ok(())
    }

    /// Mark a worktree's work complete without removing it (e.g. a validator
    /// still needs to read it).
    pub async fn mark_complete(&self, task_id: Uuid) -> DomainResult<()> {
        let Some(mut worktree) = self.repository.get_by_task(task_id).await? else {
            return Ok(());
        };
        worktree.complete();
        self.repository.update(&worktree).await?;
        Ok(())
    }

    async fn ensure_parent_exists(&self, worktree_path: &str) -> DomainResult<()> {
        if let Some(parent) = Path::new(worktree_path).parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DomainError::ExecutionFailed(format!("failed to create worktree parent dir: {e}")))?;
            }
        }
        Ok(())
    }

    async fn verify_base_ref_exists(&self, base_ref: &str) -> DomainResult<()> {
        let status = Command::new("git")
            .args(["show-ref", "--verify", "--quiet", &format!("refs/heads/{base_ref}")])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("failed to check base ref: {e}")))?;

        if status.success() {
            return Ok(());
        }

        // Fall back to a remote-tracking ref (fresh clones rarely have local main checked out).
        let remote_status = Command::new("git")
            .args(["show-ref", "--verify", "--quiet", &format!("refs/remotes/origin/{base_ref}")])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("failed to check base ref: {e}")))?;

        if !remote_status.success() {
            return Err(DomainError::ExecutionFailed(format!("base ref '{base_ref}' does not exist locally or on origin")));
        }
        Ok(())
    }

    async fn git_worktree_add(&self, branch: &str, base_ref: &str, worktree_path: &str) -> DomainResult<()> {
        let branch_exists = Command::new("git")
            .args(["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false);

        let output = if branch_exists {
            Command::new("git")
                .args(["worktree", "add", worktree_path, branch])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
        } else {
            Command::new("git")
                .args(["worktree", "add", "-b", branch, worktree_path, base_ref])
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output()
                .await
        }
        .map_err(|e| DomainError::ExecutionFailed(format!("failed to spawn git worktree add: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(branch = %branch, worktree_path = %worktree_path, stderr = %stderr, "git worktree add failed");
            return Err(DomainError::ExecutionFailed(format!("git worktree add failed: {stderr}")));
        }
        Ok(())
    }

    async fn git_worktree_remove(&self, worktree_path: &str) -> DomainResult<()> {
        let output = Command::new("git")
            .args(["worktree", "remove", worktree_path])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("failed to spawn git worktree remove: {e}")))?;

        if output.status.success() {
            return Ok(());
        }

        let force_output = Command::new("git")
            .args(["worktree", "remove", "--force", worktree_path])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("failed to spawn git worktree remove --force: {e}")))?;

        if !force_output.status.success() {
            let stderr = String::from_utf8_lossy(&force_output.stderr);
            return Err(DomainError::ExecutionFailed(format!("git worktree remove --force failed: {stderr}")));
        }
        Ok(())
    }

    async fn git_branch_delete(&self, branch: &str) -> DomainResult<()> {
        let output = Command::new("git")
            .args(["branch", "-D", branch])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("failed to spawn git branch -D: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(branch = %branch, stderr = %stderr, "branch delete failed (may already be gone)");
        }
        Ok(())
    }
}
