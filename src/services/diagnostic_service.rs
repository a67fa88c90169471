//! Workflow doctor (C11).
//!
//! Runs the §4.11-style trigger predicate once per monitoring cycle per
//! workflow: when a workflow has tasks but none of them are moving and no
//! workflow result has been validated yet, asks the LLM to diagnose why and
//! creates follow-up tasks to unstick it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::llm::templates::DIAGNOSTIC_WORKFLOW_REVIEW;
use crate::domain::errors::DomainResult;
use crate::domain::models::diagnostic::should_trigger_diagnostic;
use crate::domain::models::{DiagnosticRun, DiagnosticTriggerInputs, DiagnosticTriggerStats, Task, TaskStatus, WorkflowResultStatus};
use crate::domain::ports::{CompletionRequest, DiagnosticRepository, LlmClient, TaskRepository, ValidationRepository};

const RESPONSE_SCHEMA: &str = r#"{
  "type": "object",
  "required": ["diagnosis", "follow_up_tasks"],
  "properties": {
    "diagnosis": {"type": "string"},
    "follow_up_tasks": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["description", "done_definition"],
        "properties": {
          "description": {"type": "string"},
          "done_definition": {"type": "string"}
        }
      }
    }
  }
}"#;

/// Non-terminal, non-`Pending` statuses: a task in one of these is still
/// being actively worked, so the workflow is not considered stalled.
fn is_active(status: TaskStatus) -> bool {
    matches!(
        status,
        TaskStatus::Queued | TaskStatus::Assigned | TaskStatus::InProgress | TaskStatus::UnderReview | TaskStatus::ValidationInProgress | TaskStatus::NeedsWork
    )
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticServiceConfig {
    pub cooldown_seconds: i64,
    pub min_stuck_time_seconds: i64,
    pub max_tasks_per_run: usize,
    pub history_n: usize,
}

impl Default for DiagnosticServiceConfig {
    fn default() -> Self {
        Self { cooldown_seconds: 60, min_stuck_time_seconds: 60, max_tasks_per_run: 5, history_n: 15 }
    }
}

pub struct DiagnosticService {
    repository: Arc<dyn DiagnosticRepository>,
    tasks: Arc<dyn TaskRepository>,
    validation: Arc<dyn ValidationRepository>,
    llm: Arc<dyn LlmClient>,
    config: DiagnosticServiceConfig,
}

impl DiagnosticService {
    pub fn new(
        repository: Arc<dyn DiagnosticRepository>,
        tasks: Arc<dyn TaskRepository>,
        validation: Arc<dyn ValidationRepository>,
        llm: Arc<dyn LlmClient>,
        config: DiagnosticServiceConfig,
    ) -> Self {
        Self { repository, tasks, validation, llm, config }
    }

    async fn trigger_inputs(&self, workflow_id: Uuid, tasks: &[Task]) -> DomainResult<DiagnosticTriggerInputs> {
        let any_workflow_result_validated = !self.validation.list_workflow_results_by_status(workflow_id, WorkflowResultStatus::Validated).await?.is_empty();
        let last_run = self.repository.get_last_run(workflow_id).await?;
        let seconds_since_last_diagnostic_run = last_run.map(|r| (Utc::now() - r.triggered_at).num_seconds());
        let last_activity = tasks.iter().map(|t| t.completed_at.unwrap_or(t.created_at)).max();
        let seconds_since_last_task_activity = last_activity.map(|t| (Utc::now() - t).num_seconds()).unwrap_or(i64::MAX);

        Ok(DiagnosticTriggerInputs {
            workflow_has_tasks: !tasks.is_empty(),
            any_task_active: tasks.iter().any(|t| is_active(t.status)),
            any_workflow_result_validated,
            seconds_since_last_diagnostic_run,
            seconds_since_last_task_activity,
            diagnostic_cooldown_seconds: self.config.cooldown_seconds,
            min_stuck_time_seconds: self.config.min_stuck_time_seconds,
        })
    }

    /// Evaluate the trigger for one workflow and, if it fires, run a
    /// diagnostic pass. Returns `None` when the trigger does not fire.
    #[instrument(skip(self, workflow_goal), fields(workflow_id = %workflow_id))]
    pub async fn evaluate_and_maybe_trigger(&self, workflow_id: Uuid, workflow_goal: &str) -> DomainResult<Option<DiagnosticRun>> {
        let tasks = self.tasks.list_by_workflow(workflow_id).await?;
        let inputs = self.trigger_inputs(workflow_id, &tasks).await?;
        if !should_trigger_diagnostic(&inputs) {
            return Ok(None);
        }

        let stats = DiagnosticTriggerStats {
            pending_task_count: tasks.iter().filter(|t| t.status == TaskStatus::Pending).count(),
            queued_task_count: tasks.iter().filter(|t| t.status == TaskStatus::Queued).count(),
            last_task_created_at: tasks.iter().map(|t| t.created_at).max(),
            last_task_completed_at: tasks.iter().filter_map(|t| t.completed_at).max(),
        };
        let mut run = DiagnosticRun::new(workflow_id, stats);
        self.repository.create(&run).await?;
        run.mark_running();
        self.repository.update(&run).await?;
        info!(run_id = %run.id, "diagnostic run triggered");

        let history = self.repository.get_recent_runs(workflow_id, self.config.history_n).await?;
        let variables = json!({
            "workflow_goal": workflow_goal,
            "tasks": tasks.iter().map(|t| json!({
                "id": t.id.to_string(),
                "status": t.status.as_str(),
                "description": t.description,
                "failure_reason": t.failure_reason,
            })).collect::<Vec<_>>(),
            "prior_diagnoses": history.iter().filter_map(|r| r.diagnosis.clone()).collect::<Vec<_>>().join("\n"),
        });
        let response_schema: serde_json::Value = serde_json::from_str(RESPONSE_SCHEMA).expect("static schema is valid JSON");

        let completion = self
            .llm
            .complete(CompletionRequest {
                component: "diagnostic_analysis".to_string(),
                template_name: DIAGNOSTIC_WORKFLOW_REVIEW.to_string(),
                variables,
                response_schema,
            })
            .await;

        match completion {
            Ok(output) => {
                let diagnosis = output.parsed.get("diagnosis").and_then(|v| v.as_str()).unwrap_or("no diagnosis returned").to_string();
                let mut created_ids = Vec::new();
                if let Some(follow_ups) = output.parsed.get("follow_up_tasks").and_then(|v| v.as_array()) {
                    for item in follow_ups.iter().take(self.config.max_tasks_per_run) {
                        let description = item.get("description").and_then(|v| v.as_str()).unwrap_or_default();
                        let done_definition = item.get("done_definition").and_then(|v| v.as_str()).unwrap_or_default();
                        if description.is_empty() {
                            continue;
                        }
                        let task = Task::new(workflow_id, description, done_definition);
                        self.tasks.create(&task).await?;
                        created_ids.push(task.id);
                    }
                    if follow_ups.len() > self.config.max_tasks_per_run {
                        warn!(dropped = follow_ups.len() - self.config.max_tasks_per_run, "diagnostic run proposed more follow-up tasks than the per-run cap allows");
                    }
                }
                run.complete(diagnosis, created_ids);
            }
            Err(err) => {
                if err.kind().is_retryable() {
                    warn!(error = %err, "diagnostic LLM call unavailable, leaving run failed without follow-up tasks");
                    run.fail(format!("diagnostic LLM call failed: {err}"));
                } else {
                    return Err(err);
                }
            }
        }

        self.repository.update(&run).await?;
        Ok(Some(run))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::domain::errors::{DomainError, DomainResult as Result_};
    use crate::domain::models::{TaskResult, ValidationReview, WorkflowResult};
    use crate::domain::ports::{CompletionOutput, TaskFilter};

    #[derive(Default)]
    struct InMemoryDiagnosticRepo {
        runs: Mutex<Vec<DiagnosticRun>>,
    }

    #[async_trait]
    impl DiagnosticRepository for InMemoryDiagnosticRepo {
        async fn create(&self, run: &DiagnosticRun) -> DomainResult<()> {
            self.runs.lock().unwrap().push(run.clone());
            Ok(())
        }
        async fn update(&self, run: &DiagnosticRun) -> DomainResult<()> {
            let mut guard = self.runs.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|r| r.id == run.id) {
                *existing = run.clone();
            }
            Ok(())
        }
        async fn get(&self, id: Uuid) -> DomainResult<Option<DiagnosticRun>> {
            Ok(self.runs.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }
        async fn get_last_run(&self, workflow_id: Uuid) -> DomainResult<Option<DiagnosticRun>> {
            Ok(self.runs.lock().unwrap().iter().filter(|r| r.workflow_id == workflow_id).max_by_key(|r| r.triggered_at).cloned())
        }
        async fn get_recent_runs(&self, workflow_id: Uuid, limit: usize) -> DomainResult<Vec<DiagnosticRun>> {
            let mut runs: Vec<DiagnosticRun> = self.runs.lock().unwrap().iter().filter(|r| r.workflow_id == workflow_id).cloned().collect();
            runs.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
            runs.truncate(limit);
            Ok(runs)
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

    #[derive(Default)]
    struct EmptyValidationRepo;

    #[async_trait]
    impl ValidationRepository for EmptyValidationRepo {
        async fn save_review(&self, _review: &ValidationReview) -> DomainResult<()> {
            Ok(())
        }
        async fn get_reviews_for_task(&self, _task_id: Uuid) -> DomainResult<Vec<ValidationReview>> {
            Ok(Vec::new())
        }
        async fn get_last_review(&self, _task_id: Uuid) -> DomainResult<Option<ValidationReview>> {
            Ok(None)
        }
        async fn save_task_result(&self, _result: &TaskResult) -> DomainResult<()> {
            Ok(())
        }
        async fn get_task_result(&self, _id: Uuid) -> DomainResult<Option<TaskResult>> {
            Ok(None)
        }
        async fn update_task_result(&self, _result: &TaskResult) -> DomainResult<()> {
            Ok(())
        }
        async fn list_task_results(&self, _task_id: Option<Uuid>) -> DomainResult<Vec<TaskResult>> {
            Ok(Vec::new())
        }
        async fn save_workflow_result(&self, _result: &WorkflowResult) -> DomainResult<()> {
            Ok(())
        }
        async fn get_workflow_result(&self, _id: Uuid) -> DomainResult<Option<WorkflowResult>> {
            Ok(None)
        }
        async fn update_workflow_result(&self, _result: &WorkflowResult) -> DomainResult<()> {
            Ok(())
        }
        async fn list_workflow_results_by_status(&self, _workflow_id: Uuid, _status: WorkflowResultStatus) -> DomainResult<Vec<WorkflowResult>> {
            Ok(Vec::new())
        }
    }

    struct StubLlm {
        response: Result_<serde_json::Value>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _request: CompletionRequest) -> DomainResult<CompletionOutput> {
            match &self.response {
                Ok(parsed) => Ok(CompletionOutput { parsed: parsed.clone(), input_tokens: 5, output_tokens: 5, provider: "stub".to_string(), model: "stub".to_string() }),
                Err(_) => Err(DomainError::ExternalUnavailable("no provider routed for diagnostic_analysis".to_string())),
            }
        }
        fn routing_is_valid(&self) -> bool {
            true
        }
    }

    fn stalled_task(workflow_id: Uuid) -> Task {
        let mut task = Task::new(workflow_id, "investigate failure", "tests pass");
        task.status = TaskStatus::Failed;
        task.created_at = Utc::now() - chrono::Duration::seconds(200);
        task
    }

    #[tokio::test]
    async fn triggers_and_creates_follow_up_tasks() {
        let workflow_id = Uuid::new_v4();
        let task_repo = Arc::new(InMemoryTaskRepo::default());
        task_repo.tasks.lock().unwrap().push(stalled_task(workflow_id));
        let diagnostic_repo = Arc::new(InMemoryDiagnosticRepo::default());
        let llm = Arc::new(StubLlm {
            response: Ok(json!({
                "diagnosis": "the task keeps failing on a missing dependency",
                "follow_up_tasks": [
                    {"description": "install the missing dependency", "done_definition": "build succeeds"}
                ]
            })),
        });

        let service = DiagnosticService::new(diagnostic_repo.clone(), task_repo.clone(), Arc::new(EmptyValidationRepo), llm, DiagnosticServiceConfig::default());
        let run = service.evaluate_and_maybe_trigger(workflow_id, "ship the feature").await.unwrap();
        let run = run.expect("trigger should fire for a fully stalled workflow");
        assert_eq!(run.tasks_created_ids.len(), 1);
        assert_eq!(task_repo.tasks.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn does_not_trigger_with_active_task() {
        let workflow_id = Uuid::new_v4();
        let task_repo = Arc::new(InMemoryTaskRepo::default());
        let mut task = stalled_task(workflow_id);
        task.status = TaskStatus::InProgress;
        task_repo.tasks.lock().unwrap().push(task);
        let diagnostic_repo = Arc::new(InMemoryDiagnosticRepo::default());
        let llm = Arc::new(StubLlm { response: Ok(json!({})) });

        let service = DiagnosticService::new(diagnostic_repo, task_repo, Arc::new(EmptyValidationRepo), llm, DiagnosticServiceConfig::default());
        let run = service.evaluate_and_maybe_trigger(workflow_id, "ship the feature").await.unwrap();
        assert!(run.is_none());
    }

    #[tokio::test]
    async fn llm_unavailable_marks_run_failed_without_propagating() {
        let workflow_id = Uuid::new_v4();
        let task_repo = Arc::new(InMemoryTaskRepo::default());
        task_repo.tasks.lock().unwrap().push(stalled_task(workflow_id));
        let diagnostic_repo = Arc::new(InMemoryDiagnosticRepo::default());
        let llm = Arc::new(StubLlm { response: Err(DomainError::ExternalUnavailable("x".to_string())) });

        let service = DiagnosticService::new(diagnostic_repo, task_repo, Arc::new(EmptyValidationRepo), llm, DiagnosticServiceConfig::default());
        let run = service.evaluate_and_maybe_trigger(workflow_id, "ship the feature").await.unwrap();
        let run = run.expect("trigger should still fire");
        assert_eq!(run.status, crate::domain::models::DiagnosticRunStatus::Failed);
    }
}
