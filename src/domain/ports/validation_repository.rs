//! Validation pipeline repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{TaskResult, ValidationReview, WorkflowResult, WorkflowResultStatus};

/// Repository interface for validation reviews, task-level results, and
/// workflow-level results.
#[async_trait]
pub trait ValidationRepository: Send + Sync {
    /// Persist a validator verdict.
    async fn save_review(&self, review: &ValidationReview) -> DomainResult<()>;

    /// All reviews for a task, ordered by `iteration` ascending.
    async fn get_reviews_for_task(&self, task_id: Uuid) -> DomainResult<Vec<ValidationReview>>;

    /// The most recent review for a task, if any.
    async fn get_last_review(&self, task_id: Uuid) -> DomainResult<Option<ValidationReview>>;

    /// Persist a task-level result.
    async fn save_task_result(&self, result: &TaskResult) -> DomainResult<()>;

    /// Get a task-level result by ID.
    async fn get_task_result(&self, id: Uuid) -> DomainResult<Option<TaskResult>>;

    /// Update a task-level result (verification status transitions only).
    async fn update_task_result(&self, result: &TaskResult) -> DomainResult<()>;

    /// List task-level results, newest first, for `GET /results`.
    async fn list_task_results(&self, task_id: Option<Uuid>) -> DomainResult<Vec<TaskResult>>;

    /// Persist a workflow-level result.
    async fn save_workflow_result(&self, result: &WorkflowResult) -> DomainResult<()>;

    /// Get a workflow-level result by ID.
    async fn get_workflow_result(&self, id: Uuid) -> DomainResult<Option<WorkflowResult>>;

    /// Update a workflow-level result (validation transitions only).
    async fn update_workflow_result(&self, result: &WorkflowResult) -> DomainResult<()>;

    /// List workflow-level results by status, e.g. to find the single
    /// `Validated` one, or all still `PendingValidation`.
    async fn list_workflow_results_by_status(&self, workflow_id: Uuid, status: WorkflowResultStatus) -> DomainResult<Vec<WorkflowResult>>;
}
