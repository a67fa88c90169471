//! SQLite implementation of the ValidationRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ResultType, TaskResult, ValidationReview, VerificationStatus, WorkflowResult, WorkflowResultStatus,
};
use crate::domain::ports::ValidationRepository;

use super::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};

#[derive(Clone)]
pub struct SqliteValidationRepository {
    pool: SqlitePool,
}

impl SqliteValidationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn result_type_str(t: ResultType) -> &'static str {
    match t {
        ResultType::Implementation => "implementation",
        ResultType::Analysis => "analysis",
        ResultType::Fix => "fix",
        ResultType::Design => "design",
        ResultType::Test => "test",
        ResultType::Documentation => "documentation",
    }
}

fn parse_result_type(s: &str) -> ResultType {
    match s {
        "analysis" => ResultType::Analysis,
        "fix" => ResultType::Fix,
        "design" => ResultType::Design,
        "test" => ResultType::Test,
        "documentation" => ResultType::Documentation,
        _ => ResultType::Implementation,
    }
}

fn verification_status_str(s: VerificationStatus) -> &'static str {
    match s {
        VerificationStatus::Unverified => "unverified",
        VerificationStatus::Verified => "verified",
        VerificationStatus::Disputed => "disputed",
    }
}

fn parse_verification_status(s: &str) -> VerificationStatus {
    match s {
        "verified" => VerificationStatus::Verified,
        "disputed" => VerificationStatus::Disputed,
        _ => VerificationStatus::Unverified,
    }
}

fn workflow_result_status_str(s: WorkflowResultStatus) -> &'static str {
    match s {
        WorkflowResultStatus::PendingValidation => "pending_validation",
        WorkflowResultStatus::Validated => "validated",
        WorkflowResultStatus::Rejected => "rejected",
    }
}

fn parse_workflow_result_status(s: &str) -> WorkflowResultStatus {
    match s {
        "validated" => WorkflowResultStatus::Validated,
        "rejected" => WorkflowResultStatus::Rejected,
        _ => WorkflowResultStatus::PendingValidation,
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: String,
    task_id: String,
    validator_agent_id: String,
    iteration: i64,
    validation_passed: i64,
    feedback: String,
    evidence: String,
    created_at: String,
}

impl ReviewRow {
    fn into_domain(self) -> DomainResult<ValidationReview> {
        Ok(ValidationReview {
            id: parse_uuid(&self.id)?,
            task_id: parse_uuid(&self.task_id)?,
            validator_agent_id: parse_uuid(&self.validator_agent_id)?,
            iteration: self.iteration as u32,
            validation_passed: self.validation_passed != 0,
            feedback: self.feedback,
            evidence: serde_json::from_str(&self.evidence).unwrap_or(serde_json::Value::Null),
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskResultRow {
    id: String,
    agent_id: String,
    task_id: String,
    markdown_path: String,
    markdown_content: String,
    result_type: String,
    summary: String,
    verification_status: String,
    created_at: String,
    verified_at: Option<String>,
    verified_by_validation_id: Option<String>,
}

impl TaskResultRow {
    fn into_domain(self) -> DomainResult<TaskResult> {
        Ok(TaskResult {
            id: parse_uuid(&self.id)?,
            agent_id: parse_uuid(&self.agent_id)?,
            task_id: parse_uuid(&self.task_id)?,
            markdown_path: self.markdown_path,
            markdown_content: self.markdown_content,
            result_type: parse_result_type(&self.result_type),
            summary: self.summary,
            verification_status: parse_verification_status(&self.verification_status),
            created_at: parse_datetime(&self.created_at)?,
            verified_at: parse_optional_datetime(self.verified_at)?,
            verified_by_validation_id: parse_optional_uuid(self.verified_by_validation_id)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowResultRow {
    id: String,
    workflow_id: String,
    agent_id: String,
    markdown_path: String,
    markdown_content: String,
    status: String,
    validation_feedback: Option<String>,
    validation_evidence: Option<String>,
    created_at: String,
    validated_at: Option<String>,
    validated_by_agent_id: Option<String>,
}

impl WorkflowResultRow {
    fn into_domain(self) -> DomainResult<WorkflowResult> {
        Ok(WorkflowResult {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            agent_id: parse_uuid(&self.agent_id)?,
            markdown_path: self.markdown_path,
            markdown_content: self.markdown_content,
            status: parse_workflow_result_status(&self.status),
            validation_feedback: self.validation_feedback,
            validation_evidence: self
                .validation_evidence
                .map(|e| serde_json::from_str(&e))
                .transpose()?,
            created_at: parse_datetime(&self.created_at)?,
            validated_at: parse_optional_datetime(self.validated_at)?,
            validated_by_agent_id: parse_optional_uuid(self.validated_by_agent_id)?,
        })
    }
}

#[async_trait]
impl ValidationRepository for SqliteValidationRepository {
    async fn save_review(&self, review: &ValidationReview) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO validation_reviews (id, task_id, validator_agent_id, iteration,
               validation_passed, feedback, evidence, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(review.id.to_string())
        .bind(review.task_id.to_string())
        .bind(review.validator_agent_id.to_string())
        .bind(review.iteration as i64)
        .bind(review.validation_passed as i32)
        .bind(&review.feedback)
        .bind(serde_json::to_string(&review.evidence)?)
        .bind(review.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_reviews_for_task(&self, task_id: Uuid) -> DomainResult<Vec<ValidationReview>> {
        let rows: Vec<ReviewRow> = sqlx::query_as(
            "SELECT * FROM validation_reviews WHERE task_id = ? ORDER BY iteration ASC",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ReviewRow::into_domain).collect()
    }

    async fn get_last_review(&self, task_id: Uuid) -> DomainResult<Option<ValidationReview>> {
        let row: Option<ReviewRow> = sqlx::query_as(
            "SELECT * FROM validation_reviews WHERE task_id = ? ORDER BY iteration DESC LIMIT 1",
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(ReviewRow::into_domain).transpose()
    }

    async fn save_task_result(&self, result: &TaskResult) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO task_results (id, agent_id, task_id, markdown_path, markdown_content,
               result_type, summary, verification_status, created_at, verified_at, verified_by_validation_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(result.id.to_string())
        .bind(result.agent_id.to_string())
        .bind(result.task_id.to_string())
        .bind(&result.markdown_path)
        .bind(&result.markdown_content)
        .bind(result_type_str(result.result_type))
        .bind(&result.summary)
        .bind(verification_status_str(result.verification_status))
        .bind(result.created_at.to_rfc3339())
        .bind(result.verified_at.map(|t| t.to_rfc3339()))
        .bind(result.verified_by_validation_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task_result(&self, id: Uuid) -> DomainResult<Option<TaskResult>> {
        let row: Option<TaskResultRow> = sqlx::query_as("SELECT * FROM task_results WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskResultRow::into_domain).transpose()
    }

    async fn update_task_result(&self, result: &TaskResult) -> DomainResult<()> {
        sqlx::query(
            "UPDATE task_results SET verification_status = ?, verified_at = ?, verified_by_validation_id = ? WHERE id = ?",
        )
        .bind(verification_status_str(result.verification_status))
        .bind(result.verified_at.map(|t| t.to_rfc3339()))
        .bind(result.verified_by_validation_id.map(|id| id.to_string()))
        .bind(result.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_task_results(&self, task_id: Option<Uuid>) -> DomainResult<Vec<TaskResult>> {
        let rows: Vec<TaskResultRow> = match task_id {
            Some(task_id) => {
                sqlx::query_as("SELECT * FROM task_results WHERE task_id = ? ORDER BY created_at DESC")
                    .bind(task_id.to_string())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM task_results ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(TaskResultRow::into_domain).collect()
    }

    async fn save_workflow_result(&self, result: &WorkflowResult) -> DomainResult<()> {
        let validation_evidence = result
            .validation_evidence
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO workflow_results (id, workflow_id, agent_id, markdown_path, markdown_content,
               status, validation_feedback, validation_evidence, created_at, validated_at, validated_by_agent_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(result.id.to_string())
        .bind(result.workflow_id.to_string())
        .bind(result.agent_id.to_string())
        .bind(&result.markdown_path)
        .bind(&result.markdown_content)
        .bind(workflow_result_status_str(result.status))
        .bind(&result.validation_feedback)
        .bind(&validation_evidence)
        .bind(result.created_at.to_rfc3339())
        .bind(result.validated_at.map(|t| t.to_rfc3339()))
        .bind(result.validated_by_agent_id.map(|id| id.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_workflow_result(&self, id: Uuid) -> DomainResult<Option<WorkflowResult>> {
        let row: Option<WorkflowResultRow> = sqlx::query_as("SELECT * FROM workflow_results WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkflowResultRow::into_domain).transpose()
    }

    async fn update_workflow_result(&self, result: &WorkflowResult) -> DomainResult<()> {
        let validation_evidence = result
            .validation_evidence
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"UPDATE workflow_results SET status = ?, validation_feedback = ?, validation_evidence = ?,
               validated_at = ?, validated_by_agent_id = ? WHERE id = ?"#,
        )
        .bind(workflow_result_status_str(result.status))
        .bind(&result.validation_feedback)
        .bind(&validation_evidence)
        .bind(result.validated_at.map(|t| t.to_rfc3339()))
        .bind(result.validated_by_agent_id.map(|id| id.to_string()))
        .bind(result.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_workflow_results_by_status(
        &self,
        workflow_id: Uuid,
        status: WorkflowResultStatus,
    ) -> DomainResult<Vec<WorkflowResult>> {
        let rows: Vec<WorkflowResultRow> = sqlx::query_as(
            "SELECT * FROM workflow_results WHERE workflow_id = ? AND status = ? ORDER BY created_at DESC",
        )
        .bind(workflow_id.to_string())
        .bind(workflow_result_status_str(status))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(WorkflowResultRow::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn task_result_round_trips_and_marks_verified() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteValidationRepository::new(pool);

        let mut result = TaskResult::new(Uuid::new_v4(), Uuid::new_v4(), "out.md", "content", ResultType::Fix, "fixed it");
        repo.save_task_result(&result).await.unwrap();

        let review = ValidationReview::new(result.task_id, Uuid::new_v4(), 1, true, "looks good");
        repo.save_review(&review).await.unwrap();

        result.mark_verified(review.id);
        repo.update_task_result(&result).await.unwrap();

        let fetched = repo.get_task_result(result.id).await.unwrap().unwrap();
        assert_eq!(fetched.verification_status, VerificationStatus::Verified);
        assert_eq!(fetched.verified_by_validation_id, Some(review.id));
    }

    #[tokio::test]
    async fn workflow_result_rejection_round_trips() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteValidationRepository::new(pool);

        let mut result = WorkflowResult::new(Uuid::new_v4(), Uuid::new_v4(), "out.md", "content");
        repo.save_workflow_result(&result).await.unwrap();

        result.mark_rejected("missing tests");
        repo.update_workflow_result(&result).await.unwrap();

        let fetched = repo.get_workflow_result(result.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, WorkflowResultStatus::Rejected);
        assert_eq!(fetched.validation_feedback.as_deref(), Some("missing tests"));
    }

    #[tokio::test]
    async fn lists_workflow_results_by_status() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteValidationRepository::new(pool);

        let workflow_id = Uuid::new_v4();
        let result = WorkflowResult::new(workflow_id, Uuid::new_v4(), "out.md", "content");
        repo.save_workflow_result(&result).await.unwrap();

        let pending = repo
            .list_workflow_results_by_status(workflow_id, WorkflowResultStatus::PendingValidation)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }
}
