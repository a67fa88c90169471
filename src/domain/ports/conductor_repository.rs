//! Conductor repository port.
//!
//! An orchestrator instance pursues a single active workflow, so analyses
//! are not keyed by workflow id.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::ConductorAnalysis;

/// Repository interface for Conductor analyses.
#[async_trait]
pub trait ConductorRepository: Send + Sync {
    /// Persist a system-wide coherence judgement.
    async fn save_analysis(&self, analysis: &ConductorAnalysis) -> DomainResult<()>;

    /// The single most recent analysis, if any.
    async fn get_last_analysis(&self) -> DomainResult<Option<ConductorAnalysis>>;

    /// Most recent `limit` analyses, newest first.
    async fn get_recent_analyses(&self, limit: usize) -> DomainResult<Vec<ConductorAnalysis>>;
}
