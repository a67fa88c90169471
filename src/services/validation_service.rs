//! Validation pipeline (C12): task-level validator verdicts and
//! workflow-level result submission/validation.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ResultType, Task, TaskResult, TaskStatus, ValidationReview, WorkflowResult, WorkflowResultStatus};
use crate::domain::ports::{TaskRepository, ValidationRepository};

#[derive(Debug, Clone, Copy)]
pub struct ValidationServiceConfig {
    pub max_iterations: u32,
}

impl Default for ValidationServiceConfig {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

/// What the caller (monitoring loop / RPC layer) should do after a
/// workflow-level result is validated. Kept separate from
/// `ValidationService` so this service never has to depend on agent/task
/// termination logic itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub status: WorkflowResultStatus,
    pub should_stop_all: bool,
}

pub struct ValidationService {
    repository: Arc<dyn ValidationRepository>,
    tasks: Arc<dyn TaskRepository>,
    config: ValidationServiceConfig,
}

impl ValidationService {
    pub fn new(repository: Arc<dyn ValidationRepository>, tasks: Arc<dyn TaskRepository>, config: ValidationServiceConfig) -> Self {
        Self { repository, tasks, config }
    }

    async fn get_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))
    }

    /// Record a validator's verdict for a task currently `ValidationInProgress`.
    /// On failure, re-queues the task for another attempt (`NeedsWork` ->
    /// `InProgress`) unless `max_iterations` has been reached, in which case
    /// the task is left in `NeedsWork` for a human to pick up.
    #[instrument(skip(self, feedback, evidence), fields(task_id = %task_id, validator_agent_id = %validator_agent_id))]
    pub async fn submit_task_review(
        &self,
        task_id: Uuid,
        validator_agent_id: Uuid,
        validation_passed: bool,
        feedback: impl Into<String>,
        evidence: serde_json::Value,
    ) -> DomainResult<ValidationReview> {
        let mut task = self.get_task(task_id).await?;
        let feedback = feedback.into();
        let review = ValidationReview::new(task_id, validator_agent_id, task.validation_iteration, validation_passed, feedback.clone()).with_evidence(evidence);
        self.repository.save_review(&review).await?;

        if validation_passed {
            task.transition_to(TaskStatus::Done, None).map_err(DomainError::ValidationFailed)?;
        } else {
            task.last_validation_feedback = Some(feedback);
            task.transition_to(TaskStatus::NeedsWork, None).map_err(DomainError::ValidationFailed)?;
            if task.validation_iteration < self.config.max_iterations {
                task.transition_to(TaskStatus::InProgress, None).map_err(DomainError::ValidationFailed)?;
            } else {
                info!(task_id = %task_id, iterations = task.validation_iteration, "validation iteration cap reached, leaving task for human review");
            }
        }
        self.tasks.update(&task).await?;
        Ok(review)
    }

    pub async fn submit_task_result(
        &self,
        agent_id: Uuid,
        task_id: Uuid,
        markdown_path: impl Into<String>,
        markdown_content: impl Into<String>,
        result_type: ResultType,
        summary: impl Into<String>,
    ) -> DomainResult<TaskResult> {
        let result = TaskResult::new(agent_id, task_id, markdown_path, markdown_content, result_type, summary);
        self.repository.save_task_result(&result).await?;
        Ok(result)
    }

    /// `GET /results`: task-level results, optionally scoped to one task.
    pub async fn list_task_results(&self, task_id: Option<Uuid>) -> DomainResult<Vec<TaskResult>> {
        self.repository.list_task_results(task_id).await
    }

    pub async fn get_task_result(&self, result_id: Uuid) -> DomainResult<Option<TaskResult>> {
        self.repository.get_task_result(result_id).await
    }

    pub async fn get_workflow_result(&self, result_id: Uuid) -> DomainResult<Option<WorkflowResult>> {
        self.repository.get_workflow_result(result_id).await
    }

    pub async fn get_reviews_for_task(&self, task_id: Uuid) -> DomainResult<Vec<ValidationReview>> {
        self.repository.get_reviews_for_task(task_id).await
    }

    pub async fn mark_task_result_verified(&self, result_id: Uuid, validation_id: Uuid) -> DomainResult<TaskResult> {
        let mut result = self.repository.get_task_result(result_id).await?.ok_or(DomainError::ResultNotFound(result_id))?;
        result.mark_verified(validation_id);
        self.repository.update_task_result(&result).await?;
        Ok(result)
    }

    pub async fn mark_task_result_disputed(&self, result_id: Uuid) -> DomainResult<TaskResult> {
        let mut result = self.repository.get_task_result(result_id).await?.ok_or(DomainError::ResultNotFound(result_id))?;
        result.mark_disputed();
        self.repository.update_task_result(&result).await?;
        Ok(result)
    }

    pub async fn submit_workflow_result(
        &self,
        workflow_id: Uuid,
        agent_id: Uuid,
        markdown_path: impl Into<String>,
        markdown_content: impl Into<String>,
    ) -> DomainResult<WorkflowResult> {
        let result = WorkflowResult::new(workflow_id, agent_id, markdown_path, markdown_content);
        self.repository.save_workflow_result(&result).await?;
        Ok(result)
    }

    /// Validate or reject a submitted workflow-level result. Only one
    /// `Validated` result is ever allowed per workflow; a second validation
    /// attempt after one already exists is rejected as a validation error
    /// rather than silently overwriting it.
    #[instrument(skip(self, feedback), fields(result_id = %result_id))]
    pub async fn submit_workflow_result_validation(
        &self,
        result_id: Uuid,
        validated_by_agent_id: Uuid,
        passed: bool,
        feedback: Option<String>,
        evidence: serde_json::Value,
        stop_all_on_validation: bool,
    ) -> DomainResult<ValidationOutcome> {
        let mut result = self.repository.get_workflow_result(result_id).await?.ok_or(DomainError::ResultNotFound(result_id))?;

        if !evidence.is_null() {
            result.validation_evidence = Some(evidence);
        }

        if passed {
            let already_validated = self.repository.list_workflow_results_by_status(result.workflow_id, WorkflowResultStatus::Validated).await?;
            if !already_validated.is_empty() {
                return Err(DomainError::ValidationFailed("workflow already has a validated result".to_string()));
            }
            result.mark_validated(validated_by_agent_id);
        } else {
            result.mark_rejected(feedback.unwrap_or_default());
        }
        self.repository.update_workflow_result(&result).await?;

        let should_stop_all = passed && stop_all_on_validation;
        if should_stop_all {
            info!(workflow_id = %result.workflow_id, "workflow result validated, stop-all policy in effect");
        }
        Ok(ValidationOutcome { status: result.status, should_stop_all })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::domain::ports::TaskFilter;

    #[derive(Default)]
    struct InMemoryValidationRepo {
        reviews: Mutex<Vec<ValidationReview>>,
        task_results: Mutex<Vec<TaskResult>>,
        workflow_results: Mutex<Vec<WorkflowResult>>,
    }

    #[async_trait]
    impl ValidationRepository for InMemoryValidationRepo {
        async fn save_review(&self, review: &ValidationReview) -> DomainResult<()> {
            self.reviews.lock().unwrap().push(review.clone());
            Ok(())
        }
        async fn get_reviews_for_task(&self, task_id: Uuid) -> DomainResult<Vec<ValidationReview>> {
            Ok(self.reviews.lock().unwrap().iter().filter(|r| r.task_id == task_id).cloned().collect())
        }
        async fn get_last_review(&self, task_id: Uuid) -> DomainResult<Option<ValidationReview>> {
            Ok(self.reviews.lock().unwrap().iter().filter(|r| r.task_id == task_id).max_by_key(|r| r.iteration).cloned())
        }
        async fn save_task_result(&self, result: &TaskResult) -> DomainResult<()> {
            self.task_results.lock().unwrap().push(result.clone());
            Ok(())
        }
        async fn get_task_result(&self, id: Uuid) -> DomainResult<Option<TaskResult>> {
            Ok(self.task_results.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }
        async fn update_task_result(&self, result: &TaskResult) -> DomainResult<()> {
            let mut guard = self.task_results.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|r| r.id == result.id) {
                *existing = result.clone();
            }
            Ok(())
        }
        async fn list_task_results(&self, task_id: Option<Uuid>) -> DomainResult<Vec<TaskResult>> {
            let guard = self.task_results.lock().unwrap();
            Ok(match task_id {
                Some(id) => guard.iter().filter(|r| r.task_id == id).cloned().collect(),
                None => guard.clone(),
            })
        }
        async fn save_workflow_result(&self, result: &WorkflowResult) -> DomainResult<()> {
            self.workflow_results.lock().unwrap().push(result.clone());
            Ok(())
        }
        async fn get_workflow_result(&self, id: Uuid) -> DomainResult<Option<WorkflowResult>> {
            Ok(self.workflow_results.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }
        async fn update_workflow_result(&self, result: &WorkflowResult) -> DomainResult<()> {
            let mut guard = self.workflow_results.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|r| r.id == result.id) {
                *existing = result.clone();
            }
            Ok(())
        }
        async fn list_workflow_results_by_status(&self, workflow_id: Uuid, status: WorkflowResultStatus) -> DomainResult<Vec<WorkflowResult>> {
            Ok(self.workflow_results.lock().unwrap().iter().filter(|r| r.workflow_id == workflow_id && r.status == status).cloned().collect())
        }
    }

    #[derive(Default)]
    struct InMemoryTaskRepo {
        tasks: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl TaskRepository for InMemoryTaskRepo {
        async fn create(&self, task: &Task) -> DomainResult<()> {
            self.tasks.lock().unwrap().push(task.clone());
            Ok(())
        }
        async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
            Ok(self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned())
        }
        async fn update(&self, task: &Task) -> DomainResult<()> {
            let mut guard = self.tasks.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|t| t.id == task.id) {
                *existing = task.clone();
            }
            Ok(())
        }
        async fn delete(&self, id: Uuid) -> DomainResult<()> {
            self.tasks.lock().unwrap().retain(|t| t.id != id);
            Ok(())
        }
        async fn list(&self, _filter: TaskFilter) -> DomainResult<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().clone())
        }
        async fn list_by_workflow(&self, workflow_id: Uuid) -> DomainResult<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().iter().filter(|t| t.workflow_id == workflow_id).cloned().collect())
        }
        async fn list_by_phase(&self, _phase_id: Uuid) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().iter().filter(|t| t.status == status).cloned().collect())
        }
        async fn get_subtasks(&self, _parent_task_id: Uuid) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn get_queued_ordered(&self, _workflow_id: Uuid, _phase_id: Option<Uuid>) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn get_by_agent_type(&self, _agent_type: &str) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn get_by_assigned_agent(&self, _agent_id: Uuid) -> DomainResult<Option<Task>> {
            Ok(None)
        }
        async fn get_dedup_candidates(&self, _workflow_id: Uuid, _phase_id: Option<Uuid>) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn count_by_status(&self) -> DomainResult<std::collections::HashMap<TaskStatus, u64>> {
            Ok(std::collections::HashMap::new())
        }
    }

    fn task_in_validation() -> Task {
        let mut task = Task::new(Uuid::new_v4(), "implement feature", "tests pass");
        task.assigned_agent_id = Some(Uuid::new_v4());
        task.status = TaskStatus::ValidationInProgress;
        task
    }

    #[tokio::test]
    async fn passing_review_marks_task_done() {
        let tasks = Arc::new(InMemoryTaskRepo::default());
        let task = task_in_validation();
        let task_id = task.id;
        tasks.tasks.lock().unwrap().push(task);
        let repo = Arc::new(InMemoryValidationRepo::default());
        let service = ValidationService::new(repo, tasks.clone(), ValidationServiceConfig::default());

        service.submit_task_review(task_id, Uuid::new_v4(), true, "looks good", serde_json::Value::Null).await.unwrap();
        let updated = tasks.tasks.lock().unwrap().iter().find(|t| t.id == task_id).unwrap().clone();
        assert_eq!(updated.status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn failing_review_requeues_for_another_attempt() {
        let tasks = Arc::new(InMemoryTaskRepo::default());
        let task = task_in_validation();
        let task_id = task.id;
        tasks.tasks.lock().unwrap().push(task);
        let repo = Arc::new(InMemoryValidationRepo::default());
        let service = ValidationService::new(repo, tasks.clone(), ValidationServiceConfig::default());

        service.submit_task_review(task_id, Uuid::new_v4(), false, "missing tests", serde_json::Value::Null).await.unwrap();
        let updated = tasks.tasks.lock().unwrap().iter().find(|t| t.id == task_id).unwrap().clone();
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.validation_iteration, 1);
    }

    #[tokio::test]
    async fn failing_review_at_cap_leaves_needs_work() {
        let tasks = Arc::new(InMemoryTaskRepo::default());
        let mut task = task_in_validation();
        task.validation_iteration = 9;
        let task_id = task.id;
        tasks.tasks.lock().unwrap().push(task);
        let repo = Arc::new(InMemoryValidationRepo::default());
        let service = ValidationService::new(repo, tasks.clone(), ValidationServiceConfig { max_iterations: 10 });

        service.submit_task_review(task_id, Uuid::new_v4(), false, "still broken", serde_json::Value::Null).await.unwrap();
        let updated = tasks.tasks.lock().unwrap().iter().find(|t| t.id == task_id).unwrap().clone();
        assert_eq!(updated.status, TaskStatus::NeedsWork);
        assert_eq!(updated.validation_iteration, 10);
    }

    #[tokio::test]
    async fn second_validated_result_is_rejected() {
        let repo = Arc::new(InMemoryValidationRepo::default());
        let tasks = Arc::new(InMemoryTaskRepo::default());
        let service = ValidationService::new(repo, tasks, ValidationServiceConfig::default());
        let workflow_id = Uuid::new_v4();

        let first = service.submit_workflow_result(workflow_id, Uuid::new_v4(), "out.md", "content").await.unwrap();
        service.submit_workflow_result_validation(first.id, Uuid::new_v4(), true, None, serde_json::Value::Null, true).await.unwrap();

        let second = service.submit_workflow_result(workflow_id, Uuid::new_v4(), "out2.md", "content").await.unwrap();
        let result = service.submit_workflow_result_validation(second.id, Uuid::new_v4(), true, None, serde_json::Value::Null, true).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn validated_result_signals_stop_all_when_policy_enabled() {
        let repo = Arc::new(InMemoryValidationRepo::default());
        let tasks = Arc::new(InMemoryTaskRepo::default());
        let service = ValidationService::new(repo, tasks, ValidationServiceConfig::default());
        let workflow_id = Uuid::new_v4();

        let submitted = service.submit_workflow_result(workflow_id, Uuid::new_v4(), "out.md", "content").await.unwrap();
        let outcome = service.submit_workflow_result_validation(submitted.id, Uuid::new_v4(), true, None, serde_json::Value::Null, true).await.unwrap();
        assert!(outcome.should_stop_all);
        assert_eq!(outcome.status, WorkflowResultStatus::Validated);
    }
}
