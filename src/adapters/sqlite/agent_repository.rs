//! SQLite implementation of the AgentRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentStatus, AgentType};
use crate::domain::ports::{AgentFilter, AgentRepository};

pub struct SqliteAgentRepository {
    pool: SqlitePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &Agent) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO agents (id, workflow_id, task_id, agent_type, status, session_name,
               worktree_path, created_at, last_activity, kept_alive_for_validation)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        )
        .bind(agent.id.to_string())
        .bind(agent.workflow_id.to_string())
        .bind(agent.task_id.map(|id| id.to_string()))
        .bind(agent.agent_type.as_str())
        .bind(agent.status.as_str())
        .bind(&agent.session_name)
        .bind(&agent.worktree_path)
        .bind(agent.created_at.to_rfc3339())
        .bind(agent.last_activity.to_rfc3339())
        .bind(agent.kept_alive_for_validation as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn update(&self, agent: &Agent) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE agents SET task_id = ?, status = ?, last_activity = ?,
               kept_alive_for_validation = ? WHERE id = ?"#
        )
        .bind(agent.task_id.map(|id| id.to_string()))
        .bind(agent.status.as_str())
        .bind(agent.last_activity.to_rfc3339())
        .bind(agent.kept_alive_for_validation as i32)
        .bind(agent.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AgentNotFound(agent.id.to_string()));
        }

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::AgentNotFound(id.to_string()));
        }

        Ok(())
    }

    async fn list(&self, filter: AgentFilter) -> DomainResult<Vec<Agent>> {
        let mut sql = String::from("SELECT * FROM agents WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(agent_type) = &filter.agent_type {
            sql.push_str(" AND agent_type = ?");
            bindings.push(agent_type.as_str().to_string());
        }
        if let Some(status) = &filter.status {
            sql.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(task_id) = &filter.task_id {
            sql.push_str(" AND task_id = ?");
            bindings.push(task_id.to_string());
        }

        sql.push_str(" ORDER BY created_at DESC");

        let mut q = sqlx::query_as::<_, AgentRow>(&sql);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<AgentRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_active(&self) -> DomainResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            "SELECT * FROM agents WHERE status IN ('spawning', 'working') ORDER BY created_at"
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn list_stale(&self, older_than_seconds: i64) -> DomainResult<Vec<Agent>> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::seconds(older_than_seconds)).to_rfc3339();
        let rows: Vec<AgentRow> = sqlx::query_as(
            "SELECT * FROM agents WHERE status = 'working' AND last_activity < ? ORDER BY last_activity"
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    async fn get_by_task(&self, task_id: Uuid) -> DomainResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as(
            "SELECT * FROM agents WHERE task_id = ? ORDER BY created_at DESC LIMIT 1"
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.try_into()).transpose()
    }

    async fn count_active_by_type(&self) -> DomainResult<HashMap<AgentType, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT agent_type, COUNT(*) FROM agents WHERE status IN ('spawning', 'working') GROUP BY agent_type"
        )
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for (type_str, count) in rows {
            if let Some(agent_type) = AgentType::parse_str(&type_str) {
                counts.insert(agent_type, count as u64);
            }
        }
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    workflow_id: String,
    task_id: Option<String>,
    agent_type: String,
    status: String,
    session_name: String,
    worktree_path: String,
    created_at: String,
    last_activity: String,
    kept_alive_for_validation: i32,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let id = super::parse_uuid(&row.id)?;
        let workflow_id = super::parse_uuid(&row.workflow_id)?;
        let task_id = super::parse_optional_uuid(row.task_id)?;

        let agent_type = AgentType::parse_str(&row.agent_type)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid agent_type: {}", row.agent_type)))?;

        let status = AgentStatus::parse_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid status: {}", row.status)))?;

        let created_at = super::parse_datetime(&row.created_at)?;
        let last_activity = super::parse_datetime(&row.last_activity)?;

        Ok(Agent {
            id,
            workflow_id,
            task_id,
            agent_type,
            status,
            session_name: row.session_name,
            worktree_path: row.worktree_path,
            created_at,
            last_activity,
            kept_alive_for_validation: row.kept_alive_for_validation != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup_test_repo() -> SqliteAgentRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteAgentRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_agent() {
        let repo = setup_test_repo().await;
        let workflow_id = Uuid::new_v4();

        let agent = Agent::new(workflow_id, AgentType::Phase, "session-1", "/tmp/wt-1");
        repo.create(&agent).await.unwrap();

        let retrieved = repo.get(agent.id).await.unwrap();
        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().session_name, "session-1");
    }

    #[tokio::test]
    async fn test_update_transitions_status() {
        let repo = setup_test_repo().await;
        let mut agent = Agent::new(Uuid::new_v4(), AgentType::Phase, "session-2", "/tmp/wt-2");
        repo.create(&agent).await.unwrap();

        agent.mark_working();
        repo.update(&agent).await.unwrap();

        let retrieved = repo.get(agent.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, AgentStatus::Working);
    }

    #[tokio::test]
    async fn test_list_active() {
        let repo = setup_test_repo().await;
        let mut working = Agent::new(Uuid::new_v4(), AgentType::Phase, "s1", "/tmp/1");
        working.mark_working();
        repo.create(&working).await.unwrap();

        let mut terminated = Agent::new(Uuid::new_v4(), AgentType::Phase, "s2", "/tmp/2");
        terminated.terminate();
        repo.create(&terminated).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, working.id);
    }

    #[tokio::test]
    async fn test_get_by_task() {
        let repo = setup_test_repo().await;
        let task_id = Uuid::new_v4();
        let agent = Agent::new(Uuid::new_v4(), AgentType::Validator, "s3", "/tmp/3").with_task(task_id);
        repo.create(&agent).await.unwrap();

        let found = repo.get_by_task(task_id).await.unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().agent_type, AgentType::Validator);
    }

    #[tokio::test]
    async fn test_count_active_by_type() {
        let repo = setup_test_repo().await;
        let mut a = Agent::new(Uuid::new_v4(), AgentType::Phase, "s4", "/tmp/4");
        a.mark_working();
        repo.create(&a).await.unwrap();
        let mut b = Agent::new(Uuid::new_v4(), AgentType::Validator, "s5", "/tmp/5");
        b.mark_working();
        repo.create(&b).await.unwrap();

        let counts = repo.count_active_by_type().await.unwrap();
        assert_eq!(*counts.get(&AgentType::Phase).unwrap_or(&0), 1);
        assert_eq!(*counts.get(&AgentType::Validator).unwrap_or(&0), 1);
    }
}
