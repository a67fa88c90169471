//! Agent repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, AgentStatus, AgentType};

/// Filter criteria for listing agents.
#[derive(Debug, Clone, Default)]
pub struct AgentFilter {
    pub agent_type: Option<AgentType>,
    pub status: Option<AgentStatus>,
    pub task_id: Option<Uuid>,
}

/// Repository interface for Agent persistence.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Create a new agent record.
    async fn create(&self, agent: &Agent) -> DomainResult<()>;

    /// Get an agent by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>>;

    /// Update an agent record (status, heartbeat, task assignment, ...).
    async fn update(&self, agent: &Agent) -> DomainResult<()>;

    /// Delete an agent record.
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// List agents with optional filters.
    async fn list(&self, filter: AgentFilter) -> DomainResult<Vec<Agent>>;

    /// List agents in non-terminal status (`Spawning` or `Working`).
    async fn list_active(&self) -> DomainResult<Vec<Agent>>;

    /// List agents whose last-seen heartbeat is older than `older_than_seconds`,
    /// used by the monitoring loop to find stalled or orphaned agents.
    async fn list_stale(&self, older_than_seconds: i64) -> DomainResult<Vec<Agent>>;

    /// Get the agent currently working a given task, if any.
    async fn get_by_task(&self, task_id: Uuid) -> DomainResult<Option<Agent>>;

    /// Count active agents by type, used to enforce `max_concurrent`.
    async fn count_active_by_type(&self) -> DomainResult<std::collections::HashMap<AgentType, u64>>;
}
