//! Agent terminator port.
//!
//! Mirrors `AgentSpawner`/`QueueProcessor`: the monitoring loop (C13) and the
//! Conductor (C10) must be able to stop an agent, but only the agent manager
//! (C8) owns the substrate session and worktree teardown that a termination
//! involves. Callers depend on this trait; the agent manager implements it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Terminates a running agent: stops its substrate session, tears down its
/// worktree, and fails its task if the task was still in progress.
#[async_trait]
pub trait AgentTerminator: Send + Sync {
    async fn terminate_agent(&self, agent_id: Uuid, reason: &str) -> DomainResult<()>;
}
