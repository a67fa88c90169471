//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentType, Task, TaskPriority, TaskStatus};
use crate::domain::ports::{TaskFilter, TaskRepository};

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> DomainResult<()> {
        let embedding_json = task.description_embedding.as_ref().map(|e| serde_json::to_string(e)).transpose()?;

        sqlx::query(
            r#"INSERT INTO tasks (id, workflow_id, phase_id, ticket_id, parent_task_id,
               created_by_agent_id, agent_type, description, done_definition, priority,
               description_embedding, status, failure_reason, completion_notes,
               duplicate_of_task_id, similarity_score, queued_at, queue_position,
               priority_boosted, validation_enabled, validation_iteration,
               last_validation_feedback, review_done, assigned_agent_id, started_at,
               completed_at, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(task.id.to_string())
        .bind(task.workflow_id.to_string())
        .bind(task.phase_id.map(|id| id.to_string()))
        .bind(task.ticket_id.map(|id| id.to_string()))
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(task.created_by_agent_id.map(|id| id.to_string()))
        .bind(task.agent_type.as_str())
        .bind(&task.description)
        .bind(&task.done_definition)
        .bind(task.priority.rank() as i32)
        .bind(embedding_json)
        .bind(task.status.as_str())
        .bind(&task.failure_reason)
        .bind(&task.completion_notes)
        .bind(task.duplicate_of_task_id.map(|id| id.to_string()))
        .bind(task.similarity_score)
        .bind(task.queued_at.map(|t| t.to_rfc3339()))
        .bind(task.queue_position)
        .bind(task.priority_boosted as i32)
        .bind(task.validation_enabled as i32)
        .bind(task.validation_iteration as i32)
        .bind(&task.last_validation_feedback)
        .bind(task.review_done as i32)
        .bind(task.assigned_agent_id.map(|id| id.to_string()))
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn update(&self, task: &Task) -> DomainResult<()> {
        let embedding_json = task.description_embedding.as_ref().map(|e| serde_json::to_string(e)).transpose()?;

        let result = sqlx::query(
            r#"UPDATE tasks SET phase_id = ?, ticket_id = ?, description = ?, done_definition = ?,
               priority = ?, description_embedding = ?, status = ?, failure_reason = ?,
               completion_notes = ?, duplicate_of_task_id = ?, similarity_score = ?,
               queued_at = ?, queue_position = ?, priority_boosted = ?, validation_enabled = ?,
               validation_iteration = ?, last_validation_feedback = ?, review_done = ?,
               assigned_agent_id = ?, started_at = ?, completed_at = ?
               WHERE id = ?"#
        )
        .bind(task.phase_id.map(|id| id.to_string()))
        .bind(task.ticket_id.map(|id| id.to_string()))
        .bind(&task.description)
        .bind(&task.done_definition)
        .bind(task.priority.rank() as i32)
        .bind(embedding_json)
        .bind(task.status.as_str())
        .bind(&task.failure_reason)
        .bind(&task.completion_notes)
        .bind(task.duplicate_of_task_id.map(|id| id.to_string()))
        .bind(task.similarity_score)
        .bind(task.queued_at.map(|t| t.to_rfc3339()))
        .bind(task.queue_position)
        .bind(task.priority_boosted as i32)
        .bind(task.validation_enabled as i32)
        .bind(task.validation_iteration as i32)
        .bind(&task.last_validation_feedback)
        .bind(task.review_done as i32)
        .bind(task.assigned_agent_id.map(|id| id.to_string()))
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(task.id.to_string()));
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TaskNotFound(id.to_string()));
        }

        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut sql = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(priority) = &filter.priority {
            sql.push_str(" AND priority = ?");
            bindings.push(priority.rank().to_string());
        }
        if let Some(workflow_id) = &filter.workflow_id {
            sql.push_str(" AND workflow_id = ?");
            bindings.push(workflow_id.to_string());
        }
        if let Some(phase_id) = &filter.phase_id {
            sql.push_str(" AND phase_id = ?");
            bindings.push(phase_id.to_string());
        }
        if let Some(ticket_id) = &filter.ticket_id {
            sql.push_str(" AND ticket_id = ?");
            bindings.push(ticket_id.to_string());
        }
        if let Some(assigned_agent_id) = &filter.assigned_agent_id {
            sql.push_str(" AND assigned_agent_id = ?");
            bindings.push(assigned_agent_id.to_string());
        }
        if let Some(agent_type) = &filter.agent_type {
            sql.push_str(" AND agent_type = ?");
            bindings.push(agent_type.clone());
        }

        sql.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, TaskRow>(&sql);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_by_workflow(&self, workflow_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE workflow_id = ? ORDER BY created_at"
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_by_phase(&self, phase_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE phase_id = ? ORDER BY created_at"
        )
        .bind(phase_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_by_status(&self, status: TaskStatus) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE status = ? ORDER BY created_at"
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn get_subtasks(&self, parent_task_id: Uuid) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE parent_task_id = ? ORDER BY created_at"
        )
        .bind(parent_task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Dense-position ordering for the queue/task engine: `priority desc,
    /// queue_position asc`, restricted to `status = 'queued'`.
    async fn get_queued_ordered(&self, workflow_id: Uuid, phase_id: Option<Uuid>) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = if let Some(phase_id) = phase_id {
            sqlx::query_as(
                r#"SELECT * FROM tasks WHERE workflow_id = ? AND phase_id = ? AND status = 'queued'
                   ORDER BY priority DESC, queue_position ASC"#
            )
            .bind(workflow_id.to_string())
            .bind(phase_id.to_string())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                r#"SELECT * FROM tasks WHERE workflow_id = ? AND status = 'queued'
                   ORDER BY priority DESC, queue_position ASC"#
            )
            .bind(workflow_id.to_string())
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn get_by_agent_type(&self, agent_type: &str) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE agent_type = ? ORDER BY created_at"
        )
        .bind(agent_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn get_by_assigned_agent(&self, agent_id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT * FROM tasks WHERE assigned_agent_id = ? ORDER BY created_at DESC LIMIT 1"
        )
        .bind(agent_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    /// Candidates for semantic dedup: pending/queued tasks in the same phase
    /// (or workflow, if unscoped) that carry a description embedding.
    async fn get_dedup_candidates(&self, workflow_id: Uuid, phase_id: Option<Uuid>) -> DomainResult<Vec<Task>> {
        let rows: Vec<TaskRow> = if let Some(phase_id) = phase_id {
            sqlx::query_as(
                r#"SELECT * FROM tasks WHERE workflow_id = ? AND phase_id = ?
                   AND status IN ('pending', 'queued') AND description_embedding IS NOT NULL"#
            )
            .bind(workflow_id.to_string())
            .bind(phase_id.to_string())
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as(
                r#"SELECT * FROM tasks WHERE workflow_id = ?
                   AND status IN ('pending', 'queued') AND description_embedding IS NOT NULL"#
            )
            .bind(workflow_id.to_string())
            .fetch_all(&self.pool)
            .await?
        };

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn count_by_status(&self) -> DomainResult<HashMap<TaskStatus, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM tasks GROUP BY status"
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            if let Some(status) = TaskStatus::parse_str(&status_str) {
                counts.insert(status, count as u64);
            }
        }
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    workflow_id: String,
    phase_id: Option<String>,
    ticket_id: Option<String>,
    parent_task_id: Option<String>,
    created_by_agent_id: Option<String>,
    agent_type: String,
    description: String,
    done_definition: String,
    priority: i32,
    description_embedding: Option<String>,
    status: String,
    failure_reason: Option<String>,
    completion_notes: Option<String>,
    duplicate_of_task_id: Option<String>,
    similarity_score: Option<f32>,
    queued_at: Option<String>,
    queue_position: Option<i64>,
    priority_boosted: i32,
    validation_enabled: i32,
    validation_iteration: i32,
    last_validation_feedback: Option<String>,
    review_done: i32,
    assigned_agent_id: Option<String>,
    started_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
}

fn priority_from_rank(rank: i32) -> TaskPriority {
    match rank {
        0 => TaskPriority::Low,
        2 => TaskPriority::High,
        _ => TaskPriority::Med,
    }
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = super::parse_uuid(&row.id)?;
        let workflow_id = super::parse_uuid(&row.workflow_id)?;
        let phase_id = super::parse_optional_uuid(row.phase_id)?;
        let ticket_id = super::parse_optional_uuid(row.ticket_id)?;
        let parent_task_id = super::parse_optional_uuid(row.parent_task_id)?;
        let created_by_agent_id = super::parse_optional_uuid(row.created_by_agent_id)?;
        let duplicate_of_task_id = super::parse_optional_uuid(row.duplicate_of_task_id)?;
        let assigned_agent_id = super::parse_optional_uuid(row.assigned_agent_id)?;

        let agent_type = AgentType::parse_str(&row.agent_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid agent_type: {}", row.agent_type)))?;

        let status = TaskStatus::parse_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        let description_embedding = row.description_embedding
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e: serde_json::Error| DomainError::SerializationError(e.to_string()))?;

        let queued_at = super::parse_optional_datetime(row.queued_at)?;
        let started_at = super::parse_optional_datetime(row.started_at)?;
        let completed_at = super::parse_optional_datetime(row.completed_at)?;
        let created_at = super::parse_datetime(&row.created_at)?;

        Ok(Task {
            id,
            workflow_id,
            phase_id,
            ticket_id,
            parent_task_id,
            created_by_agent_id,
            agent_type,
            description: row.description,
            done_definition: row.done_definition,
            priority: priority_from_rank(row.priority),
            description_embedding,
            status,
            failure_reason: row.failure_reason,
            completion_notes: row.completion_notes,
            duplicate_of_task_id,
            similarity_score: row.similarity_score,
            queued_at,
            queue_position: row.queue_position,
            priority_boosted: row.priority_boosted != 0,
            validation_enabled: row.validation_enabled != 0,
            validation_iteration: row.validation_iteration as u32,
            last_validation_feedback: row.last_validation_feedback,
            review_done: row.review_done != 0,
            assigned_agent_id,
            started_at,
            completed_at,
            created_at,
        })
    }
}
