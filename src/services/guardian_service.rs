//! Guardian per-agent trajectory analyser (C9).
//!
//! Runs once per monitoring cycle against every eligible working agent:
//! reads its recent scrollback and prior trajectory summaries, asks the LLM
//! whether it is still on track, and if not injects a steering message into
//! its live session.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::llm::templates::GUARDIAN_TRAJECTORY_REVIEW;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentContextSummary, GuardianAnalysis, SteeringIntervention, SteeringType};
use crate::domain::ports::{CompletionRequest, GuardianRepository, LlmClient, Substrate};

const RESPONSE_SCHEMA: &str = r#"{
  "type": "object",
  "required": ["alignment_score", "trajectory_summary", "needs_steering"],
  "properties": {
    "alignment_score": {"type": "number"},
    "trajectory_summary": {"type": "string"},
    "needs_steering": {"type": "boolean"},
    "steering_type": {"type": "string"},
    "steering_message": {"type": "string"}
  }
}"#;

/// How many identical scrollback lines in a row count as "stuck" on their own,
/// fed into the LLM's context rather than overriding its judgement.
const REPEATED_LINE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct GuardianServiceConfig {
    pub history_k: usize,
    pub scrollback_lines: usize,
}

impl Default for GuardianServiceConfig {
    fn default() -> Self {
        Self { history_k: 10, scrollback_lines: 200 }
    }
}

pub struct GuardianService {
    repository: Arc<dyn GuardianRepository>,
    llm: Arc<dyn LlmClient>,
    substrate: Arc<dyn Substrate>,
    config: GuardianServiceConfig,
}

impl GuardianService {
    pub fn new(repository: Arc<dyn GuardianRepository>, llm: Arc<dyn LlmClient>, substrate: Arc<dyn Substrate>, config: GuardianServiceConfig) -> Self {
        Self { repository, llm, substrate, config }
    }

    /// Judge one agent's trajectory and, if warranted, steer it. `agent` must
    /// be `AgentStatus::Working`; `current_phase` is a human-readable label
    /// (phase name or task description) used only for the LLM's context.
    #[instrument(skip(self, task_description, done_definition, current_phase), fields(agent_id = %agent.id))]
    pub async fn analyze_agent(
        &self,
        agent: &Agent,
        task_description: &str,
        done_definition: &str,
        current_phase: &str,
    ) -> DomainResult<GuardianAnalysis> {
        let session_id = session_uuid(agent)?;
        let scrollback = self.substrate.capture(session_id, self.config.scrollback_lines).await?;
        let lines: Vec<String> = scrollback.lines().map(String::from).collect();

        let history = self.repository.get_recent_analyses(agent.id, self.config.history_k).await?;
        let prior_score = history.first().map(|a| a.alignment_score);
        let _context = AgentContextSummary::extract(&lines);
        if AgentContextSummary::has_repeated_line(&lines, REPEATED_LINE_THRESHOLD) {
            warn!(agent_id = %agent.id, "agent scrollback shows a repeated line, likely stuck");
        }

        let variables = json!({
            "task_description": task_description,
            "done_definition": done_definition,
            "scrollback": lines.join("\n"),
            "history": history.iter().map(|a| a.trajectory_summary.clone()).collect::<Vec<_>>().join("\n"),
        });
        let response_schema: serde_json::Value = serde_json::from_str(RESPONSE_SCHEMA).expect("static schema is valid JSON");

        let output = self
            .llm
            .complete(CompletionRequest {
                component: "guardian_analysis".to_string(),
                template_name: GUARDIAN_TRAJECTORY_REVIEW.to_string(),
                variables,
                response_schema,
            })
            .await?;

        let alignment_score = output.parsed.get("alignment_score").and_then(|v| v.as_f64()).unwrap_or(0.5) as f32;
        let trajectory_summary = output.parsed.get("trajectory_summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let needs_steering = output.parsed.get("needs_steering").and_then(|v| v.as_bool()).unwrap_or(false);

        let mut analysis = GuardianAnalysis::new(agent.id, current_phase, alignment_score, trajectory_summary);
        analysis.details = output.parsed.clone();

        if needs_steering {
            let steering_type = output
                .parsed
                .get("steering_type")
                .and_then(|v| v.as_str())
                .and_then(SteeringType::parse_str)
                .unwrap_or(SteeringType::Drifting);
            let steering_message = output
                .parsed
                .get("steering_message")
                .and_then(|v| v.as_str())
                .unwrap_or("Re-read the task description and done definition; you may have drifted from the goal.")
                .to_string();
            analysis = analysis.with_steering(steering_type, steering_message);
        }

        self.repository.save_analysis(&analysis).await?;

        if let Some(pending) = self.repository.get_pending_intervention(agent.id).await? {
            let mut pending = pending;
            pending.record_outcome(prior_score.unwrap_or(analysis.alignment_score), analysis.alignment_score);
            self.repository.update_intervention(&pending).await?;
        }

        if analysis.needs_steering {
            let steering_type = analysis.steering_type.unwrap_or(SteeringType::Drifting);
            let message = analysis.steering_message.clone().unwrap_or_default();
            self.substrate.resume(session_id, Some(message.clone())).await?;
            let intervention = SteeringIntervention::new(agent.id, analysis.id, steering_type, message);
            self.repository.save_intervention(&intervention).await?;
            info!(agent_id = %agent.id, steering_type = steering_type.as_str(), "steered agent");
        }

        Ok(analysis)
    }
}

fn session_uuid(agent: &Agent) -> DomainResult<Uuid> {
    Uuid::parse_str(&agent.session_name)
        .map_err(|_| DomainError::ExecutionFailed(format!("agent {} has a non-UUID session handle '{}'", agent.id, agent.session_name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    use crate::domain::models::{SessionStatus, SteeringIntervention as Intervention, SubstrateOutput, SubstrateRequest, SubstrateSession};
    use crate::domain::ports::{CompletionOutput, GuardianRepository};

    #[derive(Default)]
    struct InMemoryGuardianRepo {
        analyses: Mutex<Vec<GuardianAnalysis>>,
        interventions: Mutex<Vec<Intervention>>,
    }

    #[async_trait]
    impl GuardianRepository for InMemoryGuardianRepo {
        async fn save_analysis(&self, analysis: &GuardianAnalysis) -> DomainResult<()> {
            self.analyses.lock().unwrap().push(analysis.clone());
            Ok(())
        }
        async fn get_recent_analyses(&self, agent_id: Uuid, limit: usize) -> DomainResult<Vec<GuardianAnalysis>> {
            let mut analyses: Vec<GuardianAnalysis> = self.analyses.lock().unwrap().iter().filter(|a| a.agent_id == agent_id).cloned().collect();
            analyses.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            analyses.truncate(limit);
            Ok(analyses)
        }
        async fn get_last_analysis(&self, agent_id: Uuid) -> DomainResult<Option<GuardianAnalysis>> {
            Ok(self.get_recent_analyses(agent_id, 1).await?.into_iter().next())
        }
        async fn save_intervention(&self, intervention: &Intervention) -> DomainResult<()> {
            self.interventions.lock().unwrap().push(intervention.clone());
            Ok(())
        }
        async fn update_intervention(&self, intervention: &Intervention) -> DomainResult<()> {
            let mut guard = self.interventions.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|i| i.id == intervention.id) {
                *existing = intervention.clone();
            }
            Ok(())
        }
        async fn get_interventions(&self, agent_id: Uuid) -> DomainResult<Vec<Intervention>> {
            Ok(self.interventions.lock().unwrap().iter().filter(|i| i.agent_id == agent_id).cloned().collect())
        }
        async fn get_pending_intervention(&self, agent_id: Uuid) -> DomainResult<Option<Intervention>> {
            Ok(self.interventions.lock().unwrap().iter().find(|i| i.agent_id == agent_id && i.was_successful.is_none()).cloned())
        }
        async fn delete_for_agent(&self, agent_id: Uuid) -> DomainResult<()> {
            self.analyses.lock().unwrap().retain(|a| a.agent_id != agent_id);
            self.interventions.lock().unwrap().retain(|i| i.agent_id != agent_id);
            Ok(())
        }
    }

    struct StubSubstrate;

    #[async_trait]
    impl Substrate for StubSubstrate {
        fn name(&self) -> &'static str {
            "stub"
        }
        async fn is_available(&self) -> DomainResult<bool> {
            Ok(true)
        }
        async fn execute(&self, _request: SubstrateRequest) -> DomainResult<SubstrateSession> {
            unimplemented!()
        }
        async fn execute_streaming(&self, _request: SubstrateRequest) -> DomainResult<(mpsc::Receiver<SubstrateOutput>, SubstrateSession)> {
            unimplemented!()
        }
        async fn resume(&self, session_id: Uuid, _additional_prompt: Option<String>) -> DomainResult<SubstrateSession> {
            let mut session = SubstrateSession::new(Uuid::new_v4(), "phase", crate::domain::models::SubstrateConfig::mock());
            session.id = session_id;
            session.status = SessionStatus::Active;
            Ok(session)
        }
        async fn terminate(&self, _session_id: Uuid) -> DomainResult<()> {
            Ok(())
        }
        async fn get_session(&self, _session_id: Uuid) -> DomainResult<Option<SubstrateSession>> {
            Ok(None)
        }
        async fn is_running(&self, _session_id: Uuid) -> DomainResult<bool> {
            Ok(true)
        }
        async fn capture(&self, _session_id: Uuid, _max_lines: usize) -> DomainResult<String> {
            Ok("compiling...\nerror: x\nerror: x\nerror: x".to_string())
        }
        async fn list_active_sessions(&self) -> DomainResult<Vec<Uuid>> {
            Ok(Vec::new())
        }
    }

    struct StubLlm {
        response: Mutex<serde_json::Value>,
    }

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _request: CompletionRequest) -> DomainResult<CompletionOutput> {
            Ok(CompletionOutput {
                parsed: self.response.lock().unwrap().clone(),
                input_tokens: 10,
                output_tokens: 10,
                provider: "stub".to_string(),
                model: "stub-model".to_string(),
            })
        }
        fn routing_is_valid(&self) -> bool {
            true
        }
    }

    fn agent() -> Agent {
        let mut a = Agent::new(Uuid::new_v4(), crate::domain::models::AgentType::Phase, Uuid::new_v4().to_string(), "/tmp/wt");
        a.mark_working();
        a
    }

    #[tokio::test]
    async fn steers_agent_when_llm_flags_it() {
        let repo = Arc::new(InMemoryGuardianRepo::default());
        let llm = Arc::new(StubLlm {
            response: Mutex::new(json!({
                "alignment_score": 0.2,
                "trajectory_summary": "stuck on the same compile error",
                "needs_steering": true,
                "steering_type": "stuck",
                "steering_message": "try a different fix"
            })),
        });
        let substrate = Arc::new(StubSubstrate);
        let service = GuardianService::new(repo.clone(), llm, substrate, GuardianServiceConfig::default());

        let analysis = service.analyze_agent(&agent(), "fix the bug", "tests pass", "implementation").await.unwrap();
        assert!(analysis.needs_steering);
        assert_eq!(repo.interventions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn no_steering_when_on_track() {
        let repo = Arc::new(InMemoryGuardianRepo::default());
        let llm = Arc::new(StubLlm {
            response: Mutex::new(json!({
                "alignment_score": 0.9,
                "trajectory_summary": "on track",
                "needs_steering": false
            })),
        });
        let substrate = Arc::new(StubSubstrate);
        let service = GuardianService::new(repo.clone(), llm, substrate, GuardianServiceConfig::default());

        let analysis = service.analyze_agent(&agent(), "fix the bug", "tests pass", "implementation").await.unwrap();
        assert!(!analysis.needs_steering);
        assert!(repo.interventions.lock().unwrap().is_empty());
    }
}
