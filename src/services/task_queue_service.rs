//! Queue + task engine (C6).
//!
//! Owns task creation (with optional semantic dedup and LLM enrichment),
//! dispatch under the concurrency cap, the priority-bump escape hatch, and
//! restart. Dispatch is split across the `AgentSpawner`/`QueueProcessor`
//! port pair to break the construction cycle with the agent manager (C8):
//! this service implements `QueueProcessor` and depends on `AgentSpawner`,
//! which the agent manager implements. The spawner can only be wired in
//! after both services exist, so it is supplied via `set_spawner` rather
//! than the constructor.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::llm::templates::TASK_ENRICHMENT;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskPriority, TaskStatus};
use crate::domain::ports::{
    AgentRepository, AgentSpawner, CompletionRequest, EmbeddingProvider, GuardianRepository, LlmClient, QueueProcessor, TaskRepository,
};

#[derive(Debug, Clone, Copy)]
pub struct TaskQueueServiceConfig {
    /// Global concurrent-agent cap (`Config::max_agents`).
    pub max_concurrent_agents: usize,
    pub dedup_enabled: bool,
    pub dedup_similarity_threshold: f32,
    /// Bumped tasks may never push active agents past this multiple of
    /// `max_concurrent_agents`.
    pub bump_safety_multiplier: usize,
}

impl Default for TaskQueueServiceConfig {
    fn default() -> Self {
        Self { max_concurrent_agents: 10, dedup_enabled: true, dedup_similarity_threshold: 0.92, bump_safety_multiplier: 2 }
    }
}

pub struct TaskQueueService {
    tasks: Arc<dyn TaskRepository>,
    agents: Arc<dyn AgentRepository>,
    guardian: Arc<dyn GuardianRepository>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    llm: Option<Arc<dyn LlmClient>>,
    spawner: OnceLock<Arc<dyn AgentSpawner>>,
    config: TaskQueueServiceConfig,
}

impl TaskQueueService {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        agents: Arc<dyn AgentRepository>,
        guardian: Arc<dyn GuardianRepository>,
        embedding: Option<Arc<dyn EmbeddingProvider>>,
        llm: Option<Arc<dyn LlmClient>>,
        config: TaskQueueServiceConfig,
    ) -> Self {
        Self { tasks, agents, guardian, embedding, llm, spawner: OnceLock::new(), config }
    }

    /// Wire the agent manager in once it has been constructed. Idempotent:
    /// a second call is a no-op.
    pub fn set_spawner(&self, spawner: Arc<dyn AgentSpawner>) {
        let _ = self.spawner.set(spawner);
    }

    fn spawner(&self) -> DomainResult<&Arc<dyn AgentSpawner>> {
        self.spawner.get().ok_or_else(|| DomainError::ExecutionFailed("agent spawner not wired into task queue service".to_string()))
    }

    async fn get_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))
    }

    #[instrument(skip(self, description, done_definition), fields(%workflow_id))]
    pub async fn create_task(
        &self,
        workflow_id: Uuid,
        description: impl Into<String>,
        done_definition: impl Into<String>,
        phase_id: Option<Uuid>,
        priority: TaskPriority,
        validation_enabled: bool,
    ) -> DomainResult<Task> {
        let description = description.into();
        let mut task = Task::new(workflow_id, description.clone(), done_definition)
            .with_priority(priority)
            .with_validation_enabled(validation_enabled);
        if let Some(phase_id) = phase_id {
            task = task.with_phase(phase_id);
        }
        if let Some(ticket_id) = task.extract_ticket_reference() {
            task = task.with_ticket(ticket_id);
        }

        if self.config.dedup_enabled {
            if let (Some(embedding_provider), Some(phase_id)) = (&self.embedding, phase_id) {
                match embedding_provider.embed(&description).await {
                    Ok(vector) => {
                        let candidates = self.tasks.get_dedup_candidates(workflow_id, Some(phase_id)).await?;
                        if let Some((duplicate_of, similarity)) = best_duplicate(&vector, &candidates, self.config.dedup_similarity_threshold) {
                            task.description_embedding = Some(vector);
                            task.mark_duplicate_of(duplicate_of, similarity);
                            self.tasks.create(&task).await?;
                            info!(task_id = %task.id, %duplicate_of, similarity, "task created as duplicate, no agent spawned");
                            return Ok(task);
                        }
                        task.description_embedding = Some(vector);
                    }
                    Err(err) => warn!(error = %err, "embedding lookup failed, dedup skipped for this task"),
                }
            }
        }

        self.tasks.create(&task).await?;

        if let Some(llm) = &self.llm {
            match llm
                .complete(CompletionRequest {
                    component: "task_enrichment".to_string(),
                    template_name: TASK_ENRICHMENT.to_string(),
                    variables: serde_json::json!({
                        "description": task.description,
                        "done_definition": task.done_definition,
                    }),
                    response_schema: serde_json::json!({
                        "type": "object",
                        "required": ["enriched_description"],
                        "properties": { "enriched_description": { "type": "string" } }
                    }),
                })
                .await
            {
                Ok(output) => {
                    if let Some(enriched) = output.parsed.get("enriched_description").and_then(|v| v.as_str()) {
                        task.description = enriched.to_string();
                        self.tasks.update(&task).await?;
                    }
                }
                Err(err) => warn!(error = %err, "task enrichment failed, continuing with original description"),
            }
        }

        self.dispatch_or_queue(&mut task).await?;
        Ok(task)
    }

    /// Unconditionally mark the task boosted and dispatch it regardless of
    /// capacity, subject to the `bump_safety_multiplier` safety rail.
    #[instrument(skip(self))]
    pub async fn bump_task_priority(&self, task_id: Uuid) -> DomainResult<()> {
        let mut task = self.get_task(task_id).await?;
        task.priority_boosted = true;

        if task.status != TaskStatus::Queued {
            self.tasks.update(&task).await?;
            return Ok(());
        }

        let active = self.agents.list_active().await?.len();
        let safety_cap = self.config.max_concurrent_agents * self.config.bump_safety_multiplier;
        if active >= safety_cap {
            self.tasks.update(&task).await?;
            return Err(DomainError::CapacityExceeded(safety_cap));
        }

        task.transition_to(TaskStatus::Assigned, None).map_err(DomainError::ExecutionFailed)?;
        self.tasks.update(&task).await?;
        self.spawner()?.spawn_for_task(task.id).await?;
        self.recompute_queue_positions(task.workflow_id).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn cancel_queued(&self, task_id: Uuid) -> DomainResult<()> {
        let mut task = self.get_task(task_id).await?;
        task.transition_to(TaskStatus::Failed, None).map_err(DomainError::ExecutionFailed)?;
        task.failure_reason = Some("cancelled".to_string());
        self.tasks.update(&task).await?;
        self.recompute_queue_positions(task.workflow_id).await?;
        Ok(())
    }

    /// Restart a `done` or `failed` task: clear its run bookkeeping, drop
    /// the prior agent's Guardian history, then re-enter dispatch.
    #[instrument(skip(self))]
    pub async fn restart_task(&self, task_id: Uuid) -> DomainResult<()> {
        let mut task = self.get_task(task_id).await?;
        if !task.status.is_terminal() {
            return Err(DomainError::ExecutionFailed(format!("task {task_id} is not in a terminal state")));
        }

        if let Some(prior_agent) = self.agents.get_by_task(task_id).await? {
            self.guardian.delete_for_agent(prior_agent.id).await?;
        }

        task.transition_to(TaskStatus::Pending, None).map_err(DomainError::ExecutionFailed)?;
        self.tasks.update(&task).await?;
        self.dispatch_or_queue(&mut task).await?;
        Ok(())
    }

    async fn dispatch_or_queue(&self, task: &mut Task) -> DomainResult<()> {
        let active = self.agents.list_active().await?.len();
        if active < self.config.max_concurrent_agents {
            task.transition_to(TaskStatus::Assigned, None).map_err(DomainError::ExecutionFailed)?;
            self.tasks.update(task).await?;
            self.spawner()?.spawn_for_task(task.id).await?;
        } else {
            task.transition_to(TaskStatus::Queued, None).map_err(DomainError::ExecutionFailed)?;
            self.tasks.update(task).await?;
            self.recompute_queue_positions(task.workflow_id).await?;
        }
        Ok(())
    }

    async fn recompute_queue_positions(&self, workflow_id: Uuid) -> DomainResult<()> {
        let queued = self.tasks.get_queued_ordered(workflow_id, None).await?;
        for (index, mut task) in queued.into_iter().enumerate() {
            let position = index as i64 + 1;
            if task.queue_position != Some(position) {
                task.queue_position = Some(position);
                self.tasks.update(&task).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl QueueProcessor for TaskQueueService {
    /// Dequeue while capacity allows, then recompute positions for what
    /// remains. Called on every terminal task event and agent termination.
    #[instrument(skip(self))]
    async fn process_queue(&self, workflow_id: Uuid) -> DomainResult<()> {
        loop {
            let active = self.agents.list_active().await?.len();
            if active >= self.config.max_concurrent_agents {
                break;
            }
            let queued = self.tasks.get_queued_ordered(workflow_id, None).await?;
            let Some(mut next) = queued.into_iter().next() else {
                break;
            };
            next.transition_to(TaskStatus::Assigned, None).map_err(DomainError::ExecutionFailed)?;
            self.tasks.update(&next).await?;
            self.spawner()?.spawn_for_task(next.id).await?;
        }
        self.recompute_queue_positions(workflow_id).await?;
        Ok(())
    }
}

/// Exposed at crate visibility so the `task_queue` benchmark can exercise it
/// directly against synthetic embedding vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// The nearest candidate at or above `threshold`, if any.
pub fn best_duplicate(candidate_embedding: &[f32], candidates: &[Task], threshold: f32) -> Option<(Uuid, f32)> {
    candidates
        .iter()
        .filter_map(|task| {
            let embedding = task.description_embedding.as_ref()?;
            let score = cosine_similarity(candidate_embedding, embedding);
            (score >= threshold).then_some((task.id, score))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
}
