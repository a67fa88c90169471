//! SQLite implementation of the WorkflowRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{BoardConfig, OnResultFound, Phase, PhaseValidation, Workflow};
use crate::domain::ports::WorkflowRepository;

use super::{parse_datetime, parse_json_or_default, parse_uuid};

#[derive(Clone)]
pub struct SqliteWorkflowRepository {
    pool: SqlitePool,
}

impl SqliteWorkflowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn on_result_found_str(policy: OnResultFound) -> &'static str {
    match policy {
        OnResultFound::StopAll => "stop_all",
        OnResultFound::DoNothing => "do_nothing",
    }
}

fn parse_on_result_found(s: &str) -> OnResultFound {
    match s {
        "stop_all" => OnResultFound::StopAll,
        _ => OnResultFound::DoNothing,
    }
}

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: String,
    name: String,
    goal_text: String,
    result_required: i64,
    result_criteria: Option<String>,
    on_result_found: String,
    board_config: String,
    created_at: String,
}

impl WorkflowRow {
    fn into_domain(self) -> DomainResult<Workflow> {
        let board_config: BoardConfig = parse_json_or_default(Some(self.board_config))?;
        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            name: self.name,
            goal_text: self.goal_text,
            result_required: self.result_required != 0,
            result_criteria: self.result_criteria.unwrap_or_default(),
            on_result_found: parse_on_result_found(&self.on_result_found),
            board_config,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PhaseRow {
    id: String,
    workflow_id: String,
    sequence: i64,
    name: String,
    description: String,
    done_definitions: String,
    additional_notes: Option<String>,
    validation: String,
}

impl PhaseRow {
    fn into_domain(self) -> DomainResult<Phase> {
        let done_definitions: Vec<String> = parse_json_or_default(Some(self.done_definitions))?;
        let validation: PhaseValidation = parse_json_or_default(Some(self.validation))?;
        Ok(Phase {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            sequence: self.sequence as u32,
            name: self.name,
            description: self.description,
            done_definitions,
            additional_notes: self.additional_notes.unwrap_or_default(),
            validation,
        })
    }
}

#[async_trait]
impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create(&self, workflow: &Workflow) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO workflows (id, name, goal_text, result_required, result_criteria,
               on_result_found, board_config, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.goal_text)
        .bind(workflow.result_required as i32)
        .bind(&workflow.result_criteria)
        .bind(on_result_found_str(workflow.on_result_found))
        .bind(serde_json::to_string(&workflow.board_config)?)
        .bind(workflow.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Workflow>> {
        let row: Option<WorkflowRow> = sqlx::query_as("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(WorkflowRow::into_domain).transpose()
    }

    async fn update(&self, workflow: &Workflow) -> DomainResult<()> {
        sqlx::query(
            r#"UPDATE workflows SET name = ?, goal_text = ?, result_required = ?, result_criteria = ?,
               on_result_found = ?, board_config = ? WHERE id = ?"#,
        )
        .bind(&workflow.name)
        .bind(&workflow.goal_text)
        .bind(workflow.result_required as i32)
        .bind(&workflow.result_criteria)
        .bind(on_result_found_str(workflow.on_result_found))
        .bind(serde_json::to_string(&workflow.board_config)?)
        .bind(workflow.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self) -> DomainResult<Vec<Workflow>> {
        let rows: Vec<WorkflowRow> = sqlx::query_as("SELECT * FROM workflows ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(WorkflowRow::into_domain).collect()
    }

    async fn create_phases(&self, phases: &[Phase]) -> DomainResult<()> {
        for phase in phases {
            sqlx::query(
                r#"INSERT INTO phases (id, workflow_id, sequence, name, description,
                   done_definitions, additional_notes, validation) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(phase.id.to_string())
            .bind(phase.workflow_id.to_string())
            .bind(phase.sequence as i64)
            .bind(&phase.name)
            .bind(&phase.description)
            .bind(serde_json::to_string(&phase.done_definitions)?)
            .bind(&phase.additional_notes)
            .bind(serde_json::to_string(&phase.validation)?)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn get_phase(&self, id: Uuid) -> DomainResult<Option<Phase>> {
        let row: Option<PhaseRow> = sqlx::query_as("SELECT * FROM phases WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(PhaseRow::into_domain).transpose()
    }

    async fn get_phases(&self, workflow_id: Uuid) -> DomainResult<Vec<Phase>> {
        let rows: Vec<PhaseRow> =
            sqlx::query_as("SELECT * FROM phases WHERE workflow_id = ? ORDER BY sequence ASC")
                .bind(workflow_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(PhaseRow::into_domain).collect()
    }

    async fn get_next_phase(&self, workflow_id: Uuid, current_sequence: u32) -> DomainResult<Option<Phase>> {
        let row: Option<PhaseRow> = sqlx::query_as(
            "SELECT * FROM phases WHERE workflow_id = ? AND sequence > ? ORDER BY sequence ASC LIMIT 1",
        )
        .bind(workflow_id.to_string())
        .bind(current_sequence as i64)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PhaseRow::into_domain).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteWorkflowRepository::new(pool);

        let workflow = Workflow::new("demo", "ship the feature").with_on_result_found(OnResultFound::StopAll);
        repo.create(&workflow).await.unwrap();

        let fetched = repo.get(workflow.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "demo");
        assert_eq!(fetched.on_result_found, OnResultFound::StopAll);
    }

    #[tokio::test]
    async fn phases_are_ordered_by_sequence() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteWorkflowRepository::new(pool);

        let workflow = Workflow::new("demo", "goal");
        repo.create(&workflow).await.unwrap();

        let phases = vec![
            Phase::new(workflow.id, 2, "Build", "implement"),
            Phase::new(workflow.id, 1, "Analyze", "understand"),
        ];
        repo.create_phases(&phases).await.unwrap();

        let fetched = repo.get_phases(workflow.id).await.unwrap();
        assert_eq!(fetched[0].sequence, 1);
        assert_eq!(fetched[1].sequence, 2);
    }

    #[tokio::test]
    async fn get_next_phase_returns_following_sequence() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteWorkflowRepository::new(pool);

        let workflow = Workflow::new("demo", "goal");
        repo.create(&workflow).await.unwrap();

        let phases = vec![
            Phase::new(workflow.id, 1, "Analyze", "understand"),
            Phase::new(workflow.id, 2, "Build", "implement"),
        ];
        repo.create_phases(&phases).await.unwrap();

        let next = repo.get_next_phase(workflow.id, 1).await.unwrap().unwrap();
        assert_eq!(next.sequence, 2);

        let none = repo.get_next_phase(workflow.id, 2).await.unwrap();
        assert!(none.is_none());
    }
}
