//! Agent domain model.
//!
//! An agent is a child AI-coding process owning one terminal session and one
//! worktree, working on at most one task at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What role this agent was spawned to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Ordinary phase worker.
    Phase,
    /// Validates a task-level result against declared criteria.
    Validator,
    /// Validates a workflow-level result.
    ResultValidator,
    /// "Workflow doctor" spawned when the workflow has fully stalled.
    Diagnostic,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phase => "phase",
            Self::Validator => "validator",
            Self::ResultValidator => "result_validator",
            Self::Diagnostic => "diagnostic",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "phase" => Some(Self::Phase),
            "validator" => Some(Self::Validator),
            "result_validator" => Some(Self::ResultValidator),
            "diagnostic" => Some(Self::Diagnostic),
            _ => None,
        }
    }

    /// Validator-type agents are never eligible for Conductor duplicate
    /// detection (spec testable property 7).
    pub const fn is_validator(&self) -> bool {
        matches!(self, Self::Validator | Self::ResultValidator)
    }
}

/// Agent lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Worktree/session creation in progress.
    Spawning,
    /// Session live, prompt injected.
    Working,
    /// Session killed and worktree destroyed.
    Terminated,
    /// Session exited without a clean termination.
    Failed,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Working => "working",
            Self::Terminated => "terminated",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "spawning" => Some(Self::Spawning),
            "working" => Some(Self::Working),
            "terminated" => Some(Self::Terminated),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminated/failed agents no longer hold a session or worktree.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Failed)
    }
}

/// A spawned child agent: one session, one worktree, at most one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub task_id: Option<Uuid>,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    /// Opaque handle into the session driver (C4).
    pub session_name: String,
    pub worktree_path: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Kept alive past task completion so a validator can read its worktree.
    pub kept_alive_for_validation: bool,
}

impl Agent {
    pub fn new(workflow_id: Uuid, agent_type: AgentType, session_name: impl Into<String>, worktree_path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            task_id: None,
            agent_type,
            status: AgentStatus::Spawning,
            session_name: session_name.into(),
            worktree_path: worktree_path.into(),
            created_at: now,
            last_activity: now,
            kept_alive_for_validation: false,
        }
    }

    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// `spawning -> working`, called once the initial prompt has been injected.
    pub fn mark_working(&mut self) {
        self.status = AgentStatus::Working;
        self.last_activity = Utc::now();
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn mark_kept_alive_for_validation(&mut self) {
        self.kept_alive_for_validation = true;
    }

    /// Idempotent: calling this on an already-terminal agent is a no-op
    /// (testable property 9).
    pub fn terminate(&mut self) {
        if !self.status.is_terminal() {
            self.status = AgentStatus::Terminated;
            self.last_activity = Utc::now();
        }
    }

    pub fn fail(&mut self) {
        if !self.status.is_terminal() {
            self.status = AgentStatus::Failed;
            self.last_activity = Utc::now();
        }
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }

    pub fn is_eligible_for_monitoring(&self, now: DateTime<Utc>, min_age_seconds: i64) -> bool {
        self.status == AgentStatus::Working && self.age_seconds(now) >= min_age_seconds
    }
}
