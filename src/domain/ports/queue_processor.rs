//! Queue processor port.
//!
//! The mirror image of `AgentSpawner`: the agent manager (C8) must trigger
//! queue reprocessing whenever an agent terminates, but the task queue (C6)
//! is what actually owns that logic. The agent manager depends on this
//! trait; the task queue service implements it.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Reprocesses the queue for a workflow, dispatching queued tasks while
/// capacity allows.
#[async_trait]
pub trait QueueProcessor: Send + Sync {
    async fn process_queue(&self, workflow_id: Uuid) -> DomainResult<()>;
}
