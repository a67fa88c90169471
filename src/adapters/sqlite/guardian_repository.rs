//! SQLite implementation of the GuardianRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{GuardianAnalysis, SteeringIntervention, SteeringType};
use crate::domain::ports::GuardianRepository;

use super::{parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteGuardianRepository {
    pool: SqlitePool,
}

impl SqliteGuardianRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    agent_id: String,
    timestamp: String,
    current_phase: Option<String>,
    alignment_score: f64,
    trajectory_aligned: i64,
    trajectory_summary: String,
    needs_steering: i64,
    steering_type: Option<String>,
    steering_message: Option<String>,
    details: String,
}

impl AnalysisRow {
    fn into_domain(self) -> DomainResult<GuardianAnalysis> {
        Ok(GuardianAnalysis {
            id: parse_uuid(&self.id)?,
            agent_id: parse_uuid(&self.agent_id)?,
            timestamp: parse_datetime(&self.timestamp)?,
            current_phase: self.current_phase.unwrap_or_default(),
            alignment_score: self.alignment_score as f32,
            trajectory_aligned: self.trajectory_aligned != 0,
            trajectory_summary: self.trajectory_summary,
            needs_steering: self.needs_steering != 0,
            steering_type: self.steering_type.as_deref().and_then(SteeringType::parse_str),
            steering_message: self.steering_message,
            details: serde_json::from_str(&self.details).unwrap_or(serde_json::Value::Null),
        })
    }
}

#[derive(sqlx::FromRow)]
struct InterventionRow {
    id: String,
    agent_id: String,
    guardian_analysis_id: String,
    timestamp: String,
    steering_type: String,
    message: String,
    was_successful: Option<i64>,
}

impl InterventionRow {
    fn into_domain(self) -> DomainResult<SteeringIntervention> {
        Ok(SteeringIntervention {
            id: parse_uuid(&self.id)?,
            agent_id: parse_uuid(&self.agent_id)?,
            guardian_analysis_id: parse_uuid(&self.guardian_analysis_id)?,
            timestamp: parse_datetime(&self.timestamp)?,
            steering_type: SteeringType::parse_str(&self.steering_type).unwrap_or(SteeringType::None),
            message: self.message,
            was_successful: self.was_successful.map(|v| v != 0),
        })
    }
}

#[async_trait]
impl GuardianRepository for SqliteGuardianRepository {
    async fn save_analysis(&self, analysis: &GuardianAnalysis) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO guardian_analyses (id, agent_id, timestamp, current_phase, alignment_score,
               trajectory_aligned, trajectory_summary, needs_steering, steering_type, steering_message, details)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(analysis.id.to_string())
        .bind(analysis.agent_id.to_string())
        .bind(analysis.timestamp.to_rfc3339())
        .bind(&analysis.current_phase)
        .bind(analysis.alignment_score as f64)
        .bind(analysis.trajectory_aligned as i32)
        .bind(&analysis.trajectory_summary)
        .bind(analysis.needs_steering as i32)
        .bind(analysis.steering_type.map(|t| t.as_str()))
        .bind(&analysis.steering_message)
        .bind(serde_json::to_string(&analysis.details)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_recent_analyses(&self, agent_id: Uuid, limit: usize) -> DomainResult<Vec<GuardianAnalysis>> {
        let rows: Vec<AnalysisRow> = sqlx::query_as(
            "SELECT * FROM guardian_analyses WHERE agent_id = ? ORDER BY timestamp DESC LIMIT ?",
        )
        .bind(agent_id.to_string())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AnalysisRow::into_domain).collect()
    }

    async fn get_last_analysis(&self, agent_id: Uuid) -> DomainResult<Option<GuardianAnalysis>> {
        let row: Option<AnalysisRow> = sqlx::query_as(
            "SELECT * FROM guardian_analyses WHERE agent_id = ? ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(agent_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(AnalysisRow::into_domain).transpose()
    }

    async fn save_intervention(&self, intervention: &SteeringIntervention) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO steering_interventions (id, agent_id, guardian_analysis_id, timestamp,
               steering_type, message, was_successful) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(intervention.id.to_string())
        .bind(intervention.agent_id.to_string())
        .bind(intervention.guardian_analysis_id.to_string())
        .bind(intervention.timestamp.to_rfc3339())
        .bind(intervention.steering_type.as_str())
        .bind(&intervention.message)
        .bind(intervention.was_successful.map(|v| v as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_intervention(&self, intervention: &SteeringIntervention) -> DomainResult<()> {
        sqlx::query("UPDATE steering_interventions SET was_successful = ? WHERE id = ?")
            .bind(intervention.was_successful.map(|v| v as i64))
            .bind(intervention.id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_interventions(&self, agent_id: Uuid) -> DomainResult<Vec<SteeringIntervention>> {
        let rows: Vec<InterventionRow> = sqlx::query_as(
            "SELECT * FROM steering_interventions WHERE agent_id = ? ORDER BY timestamp ASC",
        )
        .bind(agent_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(InterventionRow::into_domain).collect()
    }

    async fn get_pending_intervention(&self, agent_id: Uuid) -> DomainResult<Option<SteeringIntervention>> {
        let row: Option<InterventionRow> = sqlx::query_as(
            "SELECT * FROM steering_interventions WHERE agent_id = ? AND was_successful IS NULL ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(agent_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(InterventionRow::into_domain).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::adapters::sqlite::SqliteAgentRepository;
    use crate::domain::models::{Agent, AgentType};
    use crate::domain::ports::AgentRepository;

    async fn seed_agent(pool: &SqlitePool) -> Uuid {
        let repo = SqliteAgentRepository::new(pool.clone());
        let agent = Agent::new(Uuid::new_v4(), AgentType::Phase, "session-1", "/tmp/worktree");
        let id = agent.id;
        repo.create(&agent).await.unwrap();
        id
    }

    #[tokio::test]
    async fn saves_and_fetches_last_analysis() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let agent_id = seed_agent(&pool).await;
        let repo = SqliteGuardianRepository::new(pool);

        let analysis = GuardianAnalysis::new(agent_id, "build", 0.8, "on track");
        repo.save_analysis(&analysis).await.unwrap();

        let fetched = repo.get_last_analysis(agent_id).await.unwrap().unwrap();
        assert_eq!(fetched.id, analysis.id);
        assert!(fetched.trajectory_aligned);
    }

    #[tokio::test]
    async fn intervention_round_trips_and_updates() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let agent_id = seed_agent(&pool).await;
        let repo = SqliteGuardianRepository::new(pool);

        let analysis = GuardianAnalysis::new(agent_id, "build", 0.2, "stuck")
            .with_steering(SteeringType::Stuck, "try another approach");
        repo.save_analysis(&analysis).await.unwrap();

        let mut intervention = SteeringIntervention::new(agent_id, analysis.id, SteeringType::Stuck, "try another approach");
        repo.save_intervention(&intervention).await.unwrap();

        let pending = repo.get_pending_intervention(agent_id).await.unwrap();
        assert!(pending.is_some());

        intervention.record_outcome(0.2, 0.6);
        repo.update_intervention(&intervention).await.unwrap();

        let pending = repo.get_pending_intervention(agent_id).await.unwrap();
        assert!(pending.is_none());
    }
}
