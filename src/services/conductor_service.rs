//! Conductor system-wide coherence analyser (C10).
//!
//! Runs once per monitoring cycle over the batch of agents that just
//! received a fresh Guardian analysis: asks the LLM to judge overall
//! coherence and flag duplicate work, then narrows the raw duplicate pairs
//! down to actual termination recommendations the monitoring loop can act
//! on through `AgentTerminator`.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::adapters::llm::templates::CONDUCTOR_COHERENCE_REVIEW;
use crate::domain::errors::DomainResult;
use crate::domain::models::conductor::resolve_duplicate_terminations;
use crate::domain::models::{Agent, AgentRanking, ConductorAnalysis, DuplicatePair, TerminationRecommendation};
use crate::domain::ports::{AgentRepository, AgentTerminator, CompletionRequest, ConductorRepository, GuardianRepository, LlmClient, TaskRepository, WorkflowRepository};

const RESPONSE_SCHEMA: &str = r#"{
  "type": "object",
  "required": ["coherence_score", "system_status", "detected_duplicates"],
  "properties": {
    "coherence_score": {"type": "number"},
    "system_status": {"type": "string"},
    "recommendations": {"type": "string"},
    "detected_duplicates": {
      "type": "array",
      "items": {
        "type": "object",
        "required": ["agent_a", "agent_b", "similarity", "work_description"],
        "properties": {
          "agent_a": {"type": "string"},
          "agent_b": {"type": "string"},
          "similarity": {"type": "number"},
          "work_description": {"type": "string"}
        }
      }
    }
  }
}"#;

#[derive(Debug, Clone, Copy)]
pub struct ConductorServiceConfig {
    pub duplicate_similarity_threshold: f32,
}

impl Default for ConductorServiceConfig {
    fn default() -> Self {
        Self { duplicate_similarity_threshold: 0.8 }
    }
}

pub struct ConductorService {
    repository: Arc<dyn ConductorRepository>,
    agents: Arc<dyn AgentRepository>,
    tasks: Arc<dyn TaskRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    guardian: Arc<dyn GuardianRepository>,
    llm: Arc<dyn LlmClient>,
    config: ConductorServiceConfig,
}

impl ConductorService {
    pub fn new(
        repository: Arc<dyn ConductorRepository>,
        agents: Arc<dyn AgentRepository>,
        tasks: Arc<dyn TaskRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        guardian: Arc<dyn GuardianRepository>,
        llm: Arc<dyn LlmClient>,
        config: ConductorServiceConfig,
    ) -> Self {
        Self { repository, agents, tasks, workflows, guardian, llm, config }
    }

    async fn build_rankings(&self, agents: &[Agent]) -> DomainResult<Vec<AgentRanking>> {
        let mut rankings = Vec::with_capacity(agents.len());
        for agent in agents {
            let mut phase_sequence = 0;
            if let Some(task_id) = agent.task_id {
                if let Some(task) = self.tasks.get(task_id).await? {
                    if let Some(phase_id) = task.phase_id {
                        if let Some(phase) = self.workflows.get_phase(phase_id).await? {
                            phase_sequence = phase.sequence;
                        }
                    }
                }
            }
            let last_alignment_score = self.guardian.get_last_analysis(agent.id).await?.map(|a| a.alignment_score).unwrap_or(0.5);
            rankings.push(AgentRanking {
                agent_id: agent.id,
                agent_type: agent.agent_type,
                created_at: agent.created_at,
                phase_sequence,
                last_alignment_score,
            });
        }
        Ok(rankings)
    }

    async fn work_summary(&self, agent: &Agent) -> DomainResult<String> {
        let task_description = match agent.task_id {
            Some(task_id) => self.tasks.get(task_id).await?.map(|t| t.description).unwrap_or_default(),
            None => String::new(),
        };
        let trajectory = self.guardian.get_last_analysis(agent.id).await?.map(|a| a.trajectory_summary).unwrap_or_default();
        Ok(format!("{task_description} :: {trajectory}"))
    }

    /// Judge the given batch of working agents. Callers should only pass
    /// agents eligible for monitoring (spec's min-age gate); an empty batch
    /// is not worth an LLM call, so `agents.len() < 2` short-circuits to a
    /// trivially coherent analysis with no duplicates.
    #[instrument(skip(self, agents))]
    pub async fn analyze(&self, agents: &[Agent]) -> DomainResult<ConductorAnalysis> {
        if agents.len() < 2 {
            let analysis = ConductorAnalysis::new(1.0, agents.len(), "nominal");
            self.repository.save_analysis(&analysis).await?;
            return Ok(analysis);
        }

        let rankings = self.build_rankings(agents).await?;
        let mut agent_summaries = Vec::with_capacity(agents.len());
        for agent in agents {
            agent_summaries.push(json!({
                "agent_id": agent.id.to_string(),
                "agent_type": agent.agent_type.as_str(),
                "work": self.work_summary(agent).await?,
            }));
        }

        let variables = json!({ "agents": agent_summaries });
        let response_schema: serde_json::Value = serde_json::from_str(RESPONSE_SCHEMA).expect("static schema is valid JSON");

        let output = self
            .llm
            .complete(CompletionRequest {
                component: "conductor_analysis".to_string(),
                template_name: CONDUCTOR_COHERENCE_REVIEW.to_string(),
                variables,
                response_schema,
            })
            .await?;

        let coherence_score = output.parsed.get("coherence_score").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32;
        let system_status = output.parsed.get("system_status").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        let recommendations = output.parsed.get("recommendations").and_then(|v| v.as_str()).map(str::to_string);

        let detected_duplicates = parse_duplicate_pairs(&output.parsed);

        let mut analysis = ConductorAnalysis::new(coherence_score, agents.len(), system_status);
        analysis.recommendations = recommendations;
        analysis.detected_duplicates = detected_duplicates;

        let to_terminate = resolve_duplicate_terminations(&analysis.detected_duplicates, &rankings, self.config.duplicate_similarity_threshold);
        analysis.termination_recommendations = to_terminate
            .into_iter()
            .map(|agent_id| TerminationRecommendation { agent_id, reason: "duplicate work detected by coherence review".to_string() })
            .collect();

        self.repository.save_analysis(&analysis).await?;
        info!(coherence_score, num_terminations = analysis.termination_recommendations.len(), "conductor analysis complete");
        Ok(analysis)
    }

    /// Carry out an analysis's termination recommendations through the
    /// agent manager. Kept separate from `analyze` so the monitoring loop
    /// can log/skip recommendations before acting on them.
    pub async fn execute_terminations(&self, analysis: &ConductorAnalysis, terminator: &dyn AgentTerminator) -> DomainResult<()> {
        for recommendation in &analysis.termination_recommendations {
            terminator.terminate_agent(recommendation.agent_id, &recommendation.reason).await?;
        }
        Ok(())
    }

    pub async fn list_active_agents(&self) -> DomainResult<Vec<Agent>> {
        self.agents.list_active().await
    }
}

fn parse_duplicate_pairs(parsed: &serde_json::Value) -> Vec<DuplicatePair> {
    let Some(items) = parsed.get("detected_duplicates").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let agent_a = Uuid::parse_str(item.get("agent_a")?.as_str()?).ok()?;
            let agent_b = Uuid::parse_str(item.get("agent_b")?.as_str()?).ok()?;
            let similarity = item.get("similarity")?.as_f64()? as f32;
            let work_description = item.get("work_description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
            Some(DuplicatePair { agent_a, agent_b, similarity, work_description })
        })
        .collect()
}
