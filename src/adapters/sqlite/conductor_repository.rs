//! SQLite implementation of the ConductorRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConductorAnalysis, DuplicatePair, TerminationRecommendation};
use crate::domain::ports::ConductorRepository;

use super::{parse_datetime, parse_uuid};

#[derive(Clone)]
pub struct SqliteConductorRepository {
    pool: SqlitePool,
}

impl SqliteConductorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct AnalysisRow {
    id: String,
    timestamp: String,
    coherence_score: f64,
    num_agents: i64,
    system_status: String,
    recommendations: Option<String>,
    detected_duplicates: String,
    termination_recommendations: String,
}

impl AnalysisRow {
    fn into_domain(self) -> DomainResult<ConductorAnalysis> {
        let detected_duplicates: Vec<DuplicatePair> = serde_json::from_str(&self.detected_duplicates)?;
        let termination_recommendations: Vec<TerminationRecommendation> =
            serde_json::from_str(&self.termination_recommendations)?;
        Ok(ConductorAnalysis {
            id: parse_uuid(&self.id)?,
            timestamp: parse_datetime(&self.timestamp)?,
            coherence_score: self.coherence_score as f32,
            num_agents: self.num_agents as usize,
            system_status: self.system_status,
            recommendations: self.recommendations,
            detected_duplicates,
            termination_recommendations,
        })
    }
}

#[async_trait]
impl ConductorRepository for SqliteConductorRepository {
    async fn save_analysis(&self, analysis: &ConductorAnalysis) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO conductor_analyses (id, timestamp, coherence_score, num_agents, system_status,
               recommendations, detected_duplicates, termination_recommendations)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(analysis.id.to_string())
        .bind(analysis.timestamp.to_rfc3339())
        .bind(analysis.coherence_score as f64)
        .bind(analysis.num_agents as i64)
        .bind(&analysis.system_status)
        .bind(&analysis.recommendations)
        .bind(serde_json::to_string(&analysis.detected_duplicates)?)
        .bind(serde_json::to_string(&analysis.termination_recommendations)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_last_analysis(&self) -> DomainResult<Option<ConductorAnalysis>> {
        let row: Option<AnalysisRow> =
            sqlx::query_as("SELECT * FROM conductor_analyses ORDER BY timestamp DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;
        row.map(AnalysisRow::into_domain).transpose()
    }

    async fn get_recent_analyses(&self, limit: usize) -> DomainResult<Vec<ConductorAnalysis>> {
        let rows: Vec<AnalysisRow> =
            sqlx::query_as("SELECT * FROM conductor_analyses ORDER BY timestamp DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(AnalysisRow::into_domain).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn saves_and_fetches_last_analysis() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteConductorRepository::new(pool);

        let analysis = ConductorAnalysis::new(0.9, 3, "healthy");
        repo.save_analysis(&analysis).await.unwrap();

        let fetched = repo.get_last_analysis().await.unwrap().unwrap();
        assert_eq!(fetched.id, analysis.id);
        assert_eq!(fetched.num_agents, 3);
    }

    #[tokio::test]
    async fn recent_analyses_ordered_newest_first() {
        let pool: SqlitePool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteConductorRepository::new(pool);

        for i in 0..3 {
            let analysis = ConductorAnalysis::new(0.5, i, "status");
            repo.save_analysis(&analysis).await.unwrap();
        }

        let recent = repo.get_recent_analyses(2).await.unwrap();
        assert_eq!(recent.len(), 2);
    }
}
