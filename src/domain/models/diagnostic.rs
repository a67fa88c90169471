//! Diagnostic agent domain model.
//!
//! A `DiagnosticRun` records one invocation of the "workflow doctor": the
//! specialised agent spawned when a workflow has fully stalled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticRunStatus {
    Created,
    Running,
    Completed,
    Failed,
}

/// Trigger statistics captured at the moment a diagnostic run was started,
/// kept for audit and for cooldown bookkeeping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticTriggerStats {
    pub pending_task_count: usize,
    pub queued_task_count: usize,
    pub last_task_created_at: Option<DateTime<Utc>>,
    pub last_task_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRun {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub triggered_at: DateTime<Utc>,
    pub trigger_stats: DiagnosticTriggerStats,
    pub tasks_created_ids: Vec<Uuid>,
    pub diagnosis: Option<String>,
    pub status: DiagnosticRunStatus,
}

impl DiagnosticRun {
    pub fn new(workflow_id: Uuid, trigger_stats: DiagnosticTriggerStats) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            triggered_at: Utc::now(),
            trigger_stats,
            tasks_created_ids: Vec::new(),
            diagnosis: None,
            status: DiagnosticRunStatus::Created,
        }
    }

    pub fn mark_running(&mut self) {
        self.status = DiagnosticRunStatus::Running;
    }

    pub fn complete(&mut self, diagnosis: impl Into<String>, tasks_created_ids: Vec<Uuid>) {
        self.diagnosis = Some(diagnosis.into());
        self.tasks_created_ids = tasks_created_ids;
        self.status = DiagnosticRunStatus::Completed;
    }

    pub fn fail(&mut self, diagnosis: impl Into<String>) {
        self.diagnosis = Some(diagnosis.into());
        self.status = DiagnosticRunStatus::Failed;
    }
}

/// Evaluates the §4.11 trigger predicate. All fields are pre-computed by the
/// caller so this stays a pure function over plain data.
pub struct DiagnosticTriggerInputs {
    pub workflow_has_tasks: bool,
    pub any_task_active: bool,
    pub any_workflow_result_validated: bool,
    pub seconds_since_last_diagnostic_run: Option<i64>,
    pub seconds_since_last_task_activity: i64,
    pub diagnostic_cooldown_seconds: i64,
    pub min_stuck_time_seconds: i64,
}

pub fn should_trigger_diagnostic(inputs: &DiagnosticTriggerInputs) -> bool {
    if !inputs.workflow_has_tasks || inputs.any_task_active || inputs.any_workflow_result_validated {
        return false;
    }
    if let Some(since_last_run) = inputs.seconds_since_last_diagnostic_run {
        if since_last_run < inputs.diagnostic_cooldown_seconds {
            return false;
        }
    }
    inputs.seconds_since_last_task_activity >= inputs.min_stuck_time_seconds
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> DiagnosticTriggerInputs {
        DiagnosticTriggerInputs {
            workflow_has_tasks: true,
            any_task_active: false,
            any_workflow_result_validated: false,
            seconds_since_last_diagnostic_run: None,
            seconds_since_last_task_activity: 120,
            diagnostic_cooldown_seconds: 60,
            min_stuck_time_seconds: 60,
        }
    }

    #[test]
    fn triggers_when_fully_stalled() {
        assert!(should_trigger_diagnostic(&base_inputs()));
    }

    #[test]
    fn does_not_trigger_with_active_tasks() {
        let mut inputs = base_inputs();
        inputs.any_task_active = true;
        assert!(!should_trigger_diagnostic(&inputs));
    }

    #[test]
    fn does_not_trigger_within_cooldown() {
        let mut inputs = base_inputs();
        inputs.seconds_since_last_diagnostic_run = Some(10);
        assert!(!should_trigger_diagnostic(&inputs));
    }

    #[test]
    fn does_not_trigger_when_result_already_validated() {
        let mut inputs = base_inputs();
        inputs.any_workflow_result_validated = true;
        assert!(!should_trigger_diagnostic(&inputs));
    }

    #[test]
    fn does_not_trigger_before_min_stuck_time() {
        let mut inputs = base_inputs();
        inputs.seconds_since_last_task_activity = 10;
        assert!(!should_trigger_diagnostic(&inputs));
    }
}
