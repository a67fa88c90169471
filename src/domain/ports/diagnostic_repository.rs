//! Diagnostic run repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::DiagnosticRun;

/// Repository interface for diagnostic ("workflow doctor") runs.
#[async_trait]
pub trait DiagnosticRepository: Send + Sync {
    /// Persist a new diagnostic run.
    async fn create(&self, run: &DiagnosticRun) -> DomainResult<()>;

    /// Update a run (status, diagnosis, tasks created).
    async fn update(&self, run: &DiagnosticRun) -> DomainResult<()>;

    /// Get a run by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<DiagnosticRun>>;

    /// The most recent run for a workflow, if any. Used to compute the
    /// cooldown term of the §4.11 trigger predicate.
    async fn get_last_run(&self, workflow_id: Uuid) -> DomainResult<Option<DiagnosticRun>>;

    /// Most recent `limit` runs for a workflow, newest first.
    async fn get_recent_runs(&self, workflow_id: Uuid, limit: usize) -> DomainResult<Vec<DiagnosticRun>>;
}
