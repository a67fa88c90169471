//! Workflow repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Phase, Workflow};

/// Repository interface for workflow + phase persistence.
///
/// Phases are immutable once a workflow has started, so there is no
/// `update_phase`: phases are written once at workflow creation.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Create the workflow record.
    async fn create(&self, workflow: &Workflow) -> DomainResult<()>;

    /// Get a workflow by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Workflow>>;

    /// Update a workflow (board config, on_result_found policy, ...).
    async fn update(&self, workflow: &Workflow) -> DomainResult<()>;

    /// List every workflow, most recently created first.
    async fn list(&self) -> DomainResult<Vec<Workflow>>;

    /// Create all phases for a workflow in one call, in sequence order.
    async fn create_phases(&self, phases: &[Phase]) -> DomainResult<()>;

    /// Get a single phase by ID.
    async fn get_phase(&self, id: Uuid) -> DomainResult<Option<Phase>>;

    /// Get all phases for a workflow, ordered by `sequence` ascending.
    async fn get_phases(&self, workflow_id: Uuid) -> DomainResult<Vec<Phase>>;

    /// Get the phase immediately following the given one, if any.
    async fn get_next_phase(&self, workflow_id: Uuid, current_sequence: u32) -> DomainResult<Option<Phase>>;
}
