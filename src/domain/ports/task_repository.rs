//! Task repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Task, TaskPriority, TaskStatus};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub workflow_id: Option<Uuid>,
    pub phase_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub assigned_agent_id: Option<Uuid>,
    pub agent_type: Option<String>,
}

/// Repository interface for Task persistence.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Create a new task.
    async fn create(&self, task: &Task) -> DomainResult<()>;

    /// Get a task by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Update an existing task (status, queue bookkeeping, review state, ...).
    async fn update(&self, task: &Task) -> DomainResult<()>;

    /// Delete a task by ID.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// List tasks with optional filters.
    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// Get tasks belonging to a workflow.
    async fn list_by_workflow(&self, workflow_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Get tasks belonging to a phase.
    async fn list_by_phase(&self, phase_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Get tasks by status.
    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>>;

    /// Get subtasks of a parent task (diagnostic-spawned follow-ups).
    async fn get_subtasks(&self, parent_task_id: Uuid) -> DomainResult<Vec<Task>>;

    /// Get tasks in `Queued` status within a workflow/phase, ordered by the
    /// dense `queue_position` ascending (lowest pops first).
    async fn get_queued_ordered(
        &self,
        workflow_id: Uuid,
        phase_id: Option<Uuid>,
    ) -> DomainResult<Vec<Task>>;

    /// Get tasks not yet terminal and assigned to a specific agent type.
    async fn get_by_agent_type(&self, agent_type: &str) -> DomainResult<Vec<Task>>;

    /// Get the task currently assigned to an agent, if any.
    async fn get_by_assigned_agent(&self, agent_id: Uuid) -> DomainResult<Option<Task>>;

    /// Candidate tasks for dedup comparison: non-terminal tasks in the same
    /// (workflow_id, phase_id) that carry a description embedding.
    async fn get_dedup_candidates(
        &self,
        workflow_id: Uuid,
        phase_id: Option<Uuid>,
    ) -> DomainResult<Vec<Task>>;

    /// Count tasks by status, for `/queue_status`.
    async fn count_by_status(&self) -> DomainResult<std::collections::HashMap<TaskStatus, u64>>;
}
