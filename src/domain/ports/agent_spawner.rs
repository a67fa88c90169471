//! Agent spawner port.
//!
//! Breaks the construction-order cycle between the task queue (C6), which
//! must hand a dispatched task off to the agent manager (C8), and the agent
//! manager, which must ask the queue to reprocess after a termination. The
//! queue depends on this trait; the agent manager implements it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Spawns an agent for a task that the queue has just dispatched.
#[async_trait]
pub trait AgentSpawner: Send + Sync {
    /// Spawn an agent against `task_id`, which must already be in
    /// `TaskStatus::Assigned`. Returns the new agent's ID.
    async fn spawn_for_task(&self, task_id: Uuid) -> DomainResult<Uuid>;
}
