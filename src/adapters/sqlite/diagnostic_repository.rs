//! SQLite implementation of the DiagnosticRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DiagnosticRun, DiagnosticRunStatus, DiagnosticTriggerStats};
use crate::domain::ports::DiagnosticRepository;

use super::{parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteDiagnosticRepository {
    pool: SqlitePool,
}

impl SqliteDiagnosticRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn status_str(status: DiagnosticRunStatus) -> &'static str {
    match status {
        DiagnosticRunStatus::Created => "created",
        DiagnosticRunStatus::Running => "running",
        DiagnosticRunStatus::Completed => "completed",
        DiagnosticRunStatus::Failed => "failed",
    }
}

fn parse_status(s: &str) -> DiagnosticRunStatus {
    match s {
        "running" => DiagnosticRunStatus::Running,
        "completed" => DiagnosticRunStatus::Completed,
        "failed" => DiagnosticRunStatus::Failed,
        _ => DiagnosticRunStatus::Created,
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    id: String,
    workflow_id: String,
    triggered_at: String,
    trigger_stats: String,
    tasks_created_ids: String,
    diagnosis: Option<String>,
    status: String,
}

impl RunRow {
    fn into_domain(self) -> DomainResult<DiagnosticRun> {
        let trigger_stats: DiagnosticTriggerStats = serde_json::from_str(&self.trigger_stats)?;
        let task_ids: Vec<String> = serde_json::from_str(&self.tasks_created_ids)?;
        let tasks_created_ids = task_ids
            .into_iter()
            .map(|id| parse_uuid(&id))
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(DiagnosticRun {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            triggered_at: parse_datetime(&self.triggered_at)?,
            trigger_stats,
            tasks_created_ids,
            diagnosis: self.diagnosis,
            status: parse_status(&self.status),
        })
    }
}

#[async_trait]
impl DiagnosticRepository for SqliteDiagnosticRepository {
    async fn create(&self, run: &DiagnosticRun) -> DomainResult<()> {
        let ids: Vec<String> = run.tasks_created_ids.iter().map(|id| id.to_string()).collect();
        sqlx::query(
            r#"INSERT INTO diagnostic_runs (id, workflow_id, triggered_at, trigger_stats, tasks_created_ids, diagnosis, status)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run.id.to_string())
        .bind(run.workflow_id.to_string())
        .bind(run.triggered_at.to_rfc3339())
        .bind(serde_json::to_string(&run.trigger_stats)?)
        .bind(serde_json::to_string(&ids)?)
        .bind(&run.diagnosis)
        .bind(status_str(run.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, run: &DiagnosticRun) -> DomainResult<()> {
        let ids: Vec<String> = run.tasks_created_ids.iter().map(|id| id.to_string()).collect();
        sqlx::query(
            "UPDATE diagnostic_runs SET tasks_created_ids = ?, diagnosis = ?, status = ? WHERE id = ?",
        )
        .bind(serde_json::to_string(&ids)?)
        .bind(&run.diagnosis)
        .bind(status_str(run.status))
        .bind(run.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<DiagnosticRun>> {
        let row: Option<RunRow> = sqlx::query_as("SELECT * FROM diagnostic_runs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(RunRow::into_domain).transpose()
    }

    async fn get_last_run(&self, workflow_id: Uuid) -> DomainResult<Option<DiagnosticRun>> {
        let row: Option<RunRow> = sqlx::query_as(
            "SELECT * FROM diagnostic_runs WHERE workflow_id = ? ORDER BY triggered_at DESC LIMIT 1",
        )
        .bind(workflow_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(RunRow::into_domain).transpose()
    }

    async fn get_recent_runs(&self, workflow_id: Uuid, limit: usize) -> DomainResult<Vec<DiagnosticRun>> {
        let rows: Vec<RunRow> = sqlx::query_as(
            "SELECT * FROM diagnostic_runs WHERE workflow_id = ? ORDER BY triggered_at DESC LIMIT ?",
        )
        .bind(workflow_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RunRow::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::adapters::sqlite::SqliteWorkflowRepository;
    use crate::domain::models::Workflow;
    use crate::domain::ports::WorkflowRepository;

    async fn seed_workflow(pool: &SqlitePool) -> Uuid {
        let repo = SqliteWorkflowRepository::new(pool.clone());
        let workflow = Workflow::new("w", "goal");
        let id = workflow.id;
        repo.create(&workflow).await.unwrap();
        id
    }

    #[tokio::test]
    async fn create_and_update_round_trips() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let workflow_id = seed_workflow(&pool).await;
        let repo = SqliteDiagnosticRepository::new(pool);

        let mut run = DiagnosticRun::new(workflow_id, DiagnosticTriggerStats::default());
        repo.create(&run).await.unwrap();

        run.complete("queue was empty", vec![Uuid::new_v4()]);
        repo.update(&run).await.unwrap();

        let fetched = repo.get(run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DiagnosticRunStatus::Completed);
        assert_eq!(fetched.tasks_created_ids.len(), 1);
    }

    #[tokio::test]
    async fn get_last_run_picks_most_recent() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let workflow_id = seed_workflow(&pool).await;
        let repo = SqliteDiagnosticRepository::new(pool);

        let run1 = DiagnosticRun::new(workflow_id, DiagnosticTriggerStats::default());
        repo.create(&run1).await.unwrap();
        let run2 = DiagnosticRun::new(workflow_id, DiagnosticTriggerStats::default());
        repo.create(&run2).await.unwrap();

        let last = repo.get_last_run(workflow_id).await.unwrap().unwrap();
        assert!(last.id == run1.id || last.id == run2.id);
    }
}
