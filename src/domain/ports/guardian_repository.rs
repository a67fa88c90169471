//! Guardian repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{GuardianAnalysis, SteeringIntervention};

/// Repository interface for Guardian analyses and steering interventions.
#[async_trait]
pub trait GuardianRepository: Send + Sync {
    /// Persist a Guardian judgement.
    async fn save_analysis(&self, analysis: &GuardianAnalysis) -> DomainResult<()>;

    /// Most recent `limit` analyses for an agent, newest first. Used to
    /// build `guardian_history_k` context for the next judgement.
    async fn get_recent_analyses(&self, agent_id: Uuid, limit: usize) -> DomainResult<Vec<GuardianAnalysis>>;

    /// The single most recent analysis for an agent, if any.
    async fn get_last_analysis(&self, agent_id: Uuid) -> DomainResult<Option<GuardianAnalysis>>;

    /// Persist a steering intervention.
    async fn save_intervention(&self, intervention: &SteeringIntervention) -> DomainResult<()>;

    /// Update an intervention, used once its outcome is known.
    async fn update_intervention(&self, intervention: &SteeringIntervention) -> DomainResult<()>;

    /// Interventions for an agent, oldest first.
    async fn get_interventions(&self, agent_id: Uuid) -> DomainResult<Vec<SteeringIntervention>>;

    /// The most recent intervention still awaiting an outcome judgement.
    async fn get_pending_intervention(&self, agent_id: Uuid) -> DomainResult<Option<SteeringIntervention>>;

    /// Delete every analysis and intervention tied to an agent. Used by the
    /// task engine's restart path (spec §4.5): a restarted task gets a fresh
    /// agent and should not carry forward its predecessor's trajectory
    /// history into the new Guardian context.
    async fn delete_for_agent(&self, agent_id: Uuid) -> DomainResult<()>;
}
