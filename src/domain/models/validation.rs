//! Validation pipeline domain models: reviews, task-level results, and
//! workflow-level results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One validator verdict against a task, for one iteration of the
/// task-level validation loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReview {
    pub id: Uuid,
    pub task_id: Uuid,
    pub validator_agent_id: Uuid,
    pub iteration: u32,
    pub validation_passed: bool,
    pub feedback: String,
    pub evidence: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ValidationReview {
    pub fn new(task_id: Uuid, validator_agent_id: Uuid, iteration: u32, validation_passed: bool, feedback: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            validator_agent_id,
            iteration,
            validation_passed,
            feedback: feedback.into(),
            evidence: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_evidence(mut self, evidence: serde_json::Value) -> Self {
        self.evidence = evidence;
        self
    }
}

/// What kind of deliverable a `TaskResult` represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Implementation,
    Analysis,
    Fix,
    Design,
    Test,
    Documentation,
}

/// Whether a result's claims have been checked by a validator yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    Verified,
    Disputed,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        Self::Unverified
    }
}

/// A task-level result: the Markdown writeup an agent produces for a task.
/// Immutable once stored — verification only ever flips `verification_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub task_id: Uuid,
    pub markdown_path: String,
    pub markdown_content: String,
    pub result_type: ResultType,
    pub summary: String,
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by_validation_id: Option<Uuid>,
}

impl TaskResult {
    pub fn new(agent_id: Uuid, task_id: Uuid, markdown_path: impl Into<String>, markdown_content: impl Into<String>, result_type: ResultType, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            task_id,
            markdown_path: markdown_path.into(),
            markdown_content: markdown_content.into(),
            result_type,
            summary: summary.into(),
            verification_status: VerificationStatus::Unverified,
            created_at: Utc::now(),
            verified_at: None,
            verified_by_validation_id: None,
        }
    }

    pub fn mark_verified(&mut self, validation_id: Uuid) {
        self.verification_status = VerificationStatus::Verified;
        self.verified_by_validation_id = Some(validation_id);
        self.verified_at = Some(Utc::now());
    }

    pub fn mark_disputed(&mut self) {
        self.verification_status = VerificationStatus::Disputed;
    }
}

/// A workflow-level result status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowResultStatus {
    PendingValidation,
    Validated,
    Rejected,
}

/// A workflow-level result submitted via `submit_result`. Only one
/// `validated` result is ever allowed per workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub agent_id: Uuid,
    pub markdown_path: String,
    pub markdown_content: String,
    pub status: WorkflowResultStatus,
    pub validation_feedback: Option<String>,
    pub validation_evidence: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub validated_at: Option<DateTime<Utc>>,
    pub validated_by_agent_id: Option<Uuid>,
}

impl WorkflowResult {
    pub fn new(workflow_id: Uuid, agent_id: Uuid, markdown_path: impl Into<String>, markdown_content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            agent_id,
            markdown_path: markdown_path.into(),
            markdown_content: markdown_content.into(),
            status: WorkflowResultStatus::PendingValidation,
            validation_feedback: None,
            validation_evidence: None,
            created_at: Utc::now(),
            validated_at: None,
            validated_by_agent_id: None,
        }
    }

    pub fn mark_validated(&mut self, validated_by_agent_id: Uuid) {
        self.status = WorkflowResultStatus::Validated;
        self.validated_by_agent_id = Some(validated_by_agent_id);
        self.validated_at = Some(Utc::now());
    }

    pub fn mark_rejected(&mut self, feedback: impl Into<String>) {
        self.status = WorkflowResultStatus::Rejected;
        self.validation_feedback = Some(feedback.into());
    }
}

/// Declarative criterion the validator agent for a phase is told to check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorCriterion {
    FileExists { path: String },
    FileContains { path: String, pattern: String },
    CommandExitsZero { command: String },
    TestSuitePasses { command: String },
    ManualVerification { instructions: String },
}
