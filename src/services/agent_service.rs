//! Agent manager (C8).
//!
//! Spawns one child agent per dispatched task: a worktree, a substrate
//! session seeded with the composed initial prompt, and an `Agent` record
//! tracking both. Termination is the mirror operation and must be safe to
//! call more than once (`Agent::terminate` is idempotent) since it is
//! reachable from the monitoring loop, the Conductor, and external RPC.
//!
//! Implements `AgentSpawner` for the task queue (C6) and depends on
//! `QueueProcessor`, which the task queue implements, to trigger
//! reprocessing after a termination. See `domain::ports::agent_spawner`
//! for why the dependency runs this direction.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Agent, AgentStatus, AgentType, SubstrateConfig, SubstrateRequest, TaskStatus};
use crate::domain::ports::{
    AgentRepository, AgentSpawner, AgentTerminator, DomainEvent, EventPublisher, QueueProcessor, Substrate, TaskRepository,
    WorkflowRepository,
};
use crate::services::WorktreeService;

/// MCP tool names an agent's initial prompt tells it it may call. Kept
/// here rather than in the RPC layer since the prompt composer and the
/// RPC dispatcher must agree on the exact set.
pub const AGENT_TOOL_NAMES: &[&str] = &[
    "task_report_done",
    "task_report_failed",
    "task_report_stuck",
    "memory_search",
    "memory_store",
    "ticket_list",
    "ticket_update_status",
];

/// Placeholder agent-ID strings rejected outright by authorisation, paired
/// with the mistake they usually represent.
const PLACEHOLDER_AGENT_IDS: &[(&str, &str)] = &[
    ("your-agent-id", "replace with the literal id printed at the top of your initial prompt"),
    ("agent-id", "replace with the literal id printed at the top of your initial prompt"),
    ("AGENT_ID", "replace with the literal id printed at the top of your initial prompt"),
    ("<agent-id>", "remove the angle brackets and substitute your actual id"),
    ("00000000-0000-0000-0000-000000000000", "the nil UUID is never a real agent id"),
];

#[derive(Debug, Clone)]
pub struct AgentServiceConfig {
    pub substrate_config: SubstrateConfig,
}

impl Default for AgentServiceConfig {
    fn default() -> Self {
        Self { substrate_config: SubstrateConfig::claude_code() }
    }
}

pub struct AgentService {
    agents: Arc<dyn AgentRepository>,
    tasks: Arc<dyn TaskRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    substrate: Arc<dyn Substrate>,
    worktrees: Arc<WorktreeService>,
    events: Arc<dyn EventPublisher>,
    queue_processor: OnceLock<Arc<dyn QueueProcessor>>,
    config: AgentServiceConfig,
}

impl AgentService {
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        tasks: Arc<dyn TaskRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        substrate: Arc<dyn Substrate>,
        worktrees: Arc<WorktreeService>,
        events: Arc<dyn EventPublisher>,
        config: AgentServiceConfig,
    ) -> Self {
        Self { agents, tasks, workflows, substrate, worktrees, events, queue_processor: OnceLock::new(), config }
    }

    /// Wire the task queue in once it has been constructed.
    pub fn set_queue_processor(&self, processor: Arc<dyn QueueProcessor>) {
        let _ = self.queue_processor.set(processor);
    }

    /// Parse and authorise an inbound agent-ID header. Rejects malformed
    /// UUIDs and known placeholder strings (logging the likely mistake for
    /// the caller's benefit), then confirms the id names a `working` agent.
    pub async fn authorize_agent(&self, agent_id_header: &str) -> DomainResult<Agent> {
        let trimmed = agent_id_header.trim();
        if let Some((_, hint)) = PLACEHOLDER_AGENT_IDS.iter().find(|(placeholder, _)| *placeholder == trimmed) {
            warn!(supplied = trimmed, hint, "rejected placeholder agent id");
            return Err(DomainError::NotAuthorized);
        }

        let agent_id = Uuid::parse_str(trimmed).map_err(|_| {
            warn!(supplied = trimmed, "agent id header is not a well-formed UUID");
            DomainError::NotAuthorized
        })?;

        let agent = self.agents.get(agent_id).await?.ok_or(DomainError::NotAuthorized)?;
        if agent.status != AgentStatus::Working {
            return Err(DomainError::NotAuthorized);
        }
        Ok(agent)
    }

    /// `validate_agent_id(id)`: the one format check an agent can run
    /// before it has an authorised session, so this never touches the
    /// repository, just the syntactic checks `authorize_agent` starts with.
    pub fn validate_agent_id_format(id: &str) -> Result<(), &'static str> {
        let trimmed = id.trim();
        if let Some((_, hint)) = PLACEHOLDER_AGENT_IDS.iter().find(|(placeholder, _)| *placeholder == trimmed) {
            return Err(hint);
        }
        if Uuid::parse_str(trimmed).is_err() {
            return Err("not a well-formed UUID");
        }
        Ok(())
    }

    async fn compose_prompt(&self, task: &crate::domain::models::Task, agent_id: Uuid) -> DomainResult<(String, String)> {
        let workflow = self.workflows.get(task.workflow_id).await?.ok_or(DomainError::WorkflowNotFound(task.workflow_id))?;

        let mut user_prompt = String::new();
        user_prompt.push_str(&format!(
            "Your agent id is: {agent_id}\n\
             Use this exact id, verbatim, whenever a tool requires an agent id. \
             Do not invent a placeholder id or reuse one from an example.\n\n"
        ));
        user_prompt.push_str(&format!("Workflow goal: {}\n\n", workflow.goal_text));

        if let Some(phase_id) = task.phase_id {
            if let Some(phase) = self.workflows.get_phase(phase_id).await? {
                user_prompt.push_str(&phase.prompt_snippet());
                user_prompt.push('\n');
            }
        }

        user_prompt.push_str(&format!("Task: {}\nDone when: {}\n\n", task.description, task.done_definition));
        user_prompt.push_str("You may call the following tools:\n");
        for name in AGENT_TOOL_NAMES {
            user_prompt.push_str(&format!("- {name}\n"));
        }

        let system_prompt = format!("You are a {} agent in an autonomous multi-agent workflow.", task.agent_type.as_str());
        Ok((system_prompt, user_prompt))
    }

    fn queue_processor(&self) -> DomainResult<&Arc<dyn QueueProcessor>> {
        self.queue_processor.get().ok_or_else(|| DomainError::ExecutionFailed("queue processor not wired into agent service".to_string()))
    }

    /// Spawns a validator agent against an existing agent's worktree without
    /// touching it: the worktree path is reused verbatim and the original
    /// agent is kept alive (`kept_alive_for_validation`) instead of being
    /// terminated, so its session stays inspectable until the validator
    /// finishes. Used when a task moves `in_progress -> under_review`.
    #[instrument(skip(self), fields(%task_id))]
    pub async fn spawn_validator_for_task(&self, task_id: Uuid) -> DomainResult<Uuid> {
        let task = self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;
        let mut original = self
            .agents
            .get_by_task(task_id)
            .await?
            .ok_or_else(|| DomainError::AgentNotFound(format!("no agent assigned to task {task_id}")))?;

        original.mark_kept_alive_for_validation();
        self.agents.update(&original).await?;

        let validator_id = Uuid::new_v4();
        let workflow = self.workflows.get(task.workflow_id).await?.ok_or(DomainError::WorkflowNotFound(task.workflow_id))?;

        let system_prompt = "You are a validator agent in an autonomous multi-agent workflow. \
            You have read-only access to another agent's worktree; do not modify it."
            .to_string();
        let mut user_prompt = String::new();
        user_prompt.push_str(&format!(
            "Your agent id is: {validator_id}\n\
             Use this exact id, verbatim, whenever a tool requires an agent id.\n\n"
        ));
        user_prompt.push_str(&format!("Workflow goal: {}\n\n", workflow.goal_text));
        user_prompt.push_str(&format!(
            "Review the work done for task: {}\nDone when: {}\n\n\
             Inspect the worktree at {} read-only and call give_validation_review \
             with your pass/fail verdict, feedback, and supporting evidence.",
            task.description, task.done_definition, original.worktree_path
        ));

        let request = SubstrateRequest::new(task_id, AgentType::Validator.as_str(), system_prompt, user_prompt)
            .with_config(self.config.substrate_config.clone());
        let (mut output_rx, session) = self.substrate.execute_streaming(request).await?;
        tokio::spawn(async move { while output_rx.recv().await.is_some() {} });

        let mut validator = Agent::new(task.workflow_id, AgentType::Validator, session.id.to_string(), original.worktree_path.clone())
            .with_task(task_id);
        validator.id = validator_id;
        self.agents.create(&validator).await?;
        self.events.publish(DomainEvent::AgentCreated { agent_id: validator.id });
        validator.mark_working();
        self.agents.update(&validator).await?;
        self.events.publish(DomainEvent::AgentStatusChanged { agent_id: validator.id, status: validator.status.as_str().to_string() });
        self.events.publish(DomainEvent::AgentStatusChanged { agent_id: original.id, status: original.status.as_str().to_string() });

        info!(validator_id = %validator.id, %task_id, original_agent_id = %original.id, "validator agent spawned");
        Ok(validator.id)
    }

    /// Spawns a `ResultValidator` agent to judge a workflow-level result.
    /// Unlike task-level validation this has no single originating agent's
    /// worktree to pin to, so it gets a fresh read-only checkout via the
    /// worktree service instead.
    #[instrument(skip(self, markdown_path), fields(%workflow_id))]
    pub async fn spawn_result_validator(&self, workflow_id: Uuid, markdown_path: &str) -> DomainResult<Uuid> {
        let workflow = self.workflows.get(workflow_id).await?.ok_or(DomainError::WorkflowNotFound(workflow_id))?;

        let validator_id = Uuid::new_v4();
        let system_prompt = "You are a result validator agent judging a workflow's final submitted result.".to_string();
        let user_prompt = format!(
            "Your agent id is: {validator_id}\n\
             Use this exact id, verbatim, whenever a tool requires an agent id.\n\n\
             Workflow goal: {}\n\n\
             Read the submitted result at {markdown_path} and call submit_result_validation \
             with your pass/fail verdict and feedback.",
            workflow.goal_text
        );

        let request = SubstrateRequest::new(workflow_id, AgentType::ResultValidator.as_str(), system_prompt, user_prompt)
            .with_config(self.config.substrate_config.clone());
        let (mut output_rx, session) = self.substrate.execute_streaming(request).await?;
        tokio::spawn(async move { while output_rx.recv().await.is_some() {} });

        let mut validator = Agent::new(workflow_id, AgentType::ResultValidator, session.id.to_string(), String::new());
        validator.id = validator_id;
        self.agents.create(&validator).await?;
        self.events.publish(DomainEvent::AgentCreated { agent_id: validator.id });
        validator.mark_working();
        self.agents.update(&validator).await?;
        self.events.publish(DomainEvent::AgentStatusChanged { agent_id: validator.id, status: validator.status.as_str().to_string() });

        info!(validator_id = %validator.id, %workflow_id, "result validator agent spawned");
        Ok(validator.id)
    }
}

#[async_trait]
impl AgentSpawner for AgentService {
    #[instrument(skip(self), fields(%task_id))]
    async fn spawn_for_task(&self, task_id: Uuid) -> DomainResult<Uuid> {
        let mut task = self.tasks.get(task_id).await?.ok_or(DomainError::TaskNotFound(task_id))?;

        let worktree = self.worktrees.create(task_id).await?;

        let agent_id = Uuid::new_v4();
        let (system_prompt, user_prompt) = self.compose_prompt(&task, agent_id).await?;

        let request = SubstrateRequest::new(task_id, task.agent_type.as_str(), system_prompt, user_prompt)
            .with_config(self.config.substrate_config.clone());

        let (mut output_rx, session) = self.substrate.execute_streaming(request).await?;
        tokio::spawn(async move { while output_rx.recv().await.is_some() {} });

        let mut agent = Agent::new(task.workflow_id, task.agent_type, session.id.to_string(), worktree.path.clone()).with_task(task_id);
        agent.id = agent_id;
        self.agents.create(&agent).await?;
        self.events.publish(DomainEvent::AgentCreated { agent_id: agent.id });

        agent.mark_working();
        self.agents.update(&agent).await?;
        self.events.publish(DomainEvent::AgentStatusChanged { agent_id: agent.id, status: agent.status.as_str().to_string() });

        task.transition_to(TaskStatus::InProgress, None).map_err(DomainError::ExecutionFailed)?;
        task.assigned_agent_id = Some(agent.id);
        self.tasks.update(&task).await?;

        info!(agent_id = %agent.id, %task_id, "agent spawned and working");
        Ok(agent.id)
    }
}

#[async_trait]
impl AgentTerminator for AgentService {
    #[instrument(skip(self, reason), fields(%agent_id))]
    async fn terminate_agent(&self, agent_id: Uuid, reason: &str) -> DomainResult<()> {
        let Some(mut agent) = self.agents.get(agent_id).await? else {
            return Ok(());
        };
        if agent.status.is_terminal() {
            return Ok(());
        }

        if let Ok(session_id) = Uuid::parse_str(&agent.session_name) {
            if let Err(err) = self.substrate.terminate(session_id).await {
                warn!(%agent_id, error = %err, "substrate terminate failed, continuing with local teardown");
            }
        }

        if let Some(task_id) = agent.task_id {
            if !agent.kept_alive_for_validation {
                self.worktrees.destroy(task_id).await?;
            }
        }

        agent.terminate();
        self.agents.update(&agent).await?;
        self.events.publish(DomainEvent::AgentStatusChanged { agent_id: agent.id, status: agent.status.as_str().to_string() });

        let workflow_id = agent.workflow_id;
        if let Some(task_id) = agent.task_id {
            if let Some(mut task) = self.tasks.get(task_id).await? {
                if task.status == TaskStatus::InProgress {
                    task.failure_reason = Some(reason.to_string());
                    task.transition_to(TaskStatus::Failed, None).map_err(DomainError::ExecutionFailed)?;
                    self.tasks.update(&task).await?;
                }
            }
        }

        info!(%agent_id, reason, "agent terminated");
        self.queue_processor()?.process_queue(workflow_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::domain::models::{Phase, SubstrateOutput, SubstrateSession, Task, TaskPriority, Workflow};
    use crate::domain::ports::{AgentFilter, TaskFilter};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct InMemoryAgentRepo {
        agents: Mutex<Vec<Agent>>,
    }

    #[async_trait]
    impl AgentRepository for InMemoryAgentRepo {
        async fn create(&self, agent: &Agent) -> DomainResult<()> {
            self.agents.lock().unwrap().push(agent.clone());
            Ok(())
        }
        async fn get(&self, id: Uuid) -> DomainResult<Option<Agent>> {
            Ok(self.agents.lock().unwrap().iter().find(|a| a.id == id).cloned())
        }
        async fn update(&self, agent: &Agent) -> DomainResult<()> {
            let mut guard = self.agents.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|a| a.id == agent.id) {
                *existing = agent.clone();
            }
            Ok(())
        }
        async fn delete(&self, _id: Uuid) -> DomainResult<()> {
            Ok(())
        }
        async fn list(&self, _filter: AgentFilter) -> DomainResult<Vec<Agent>> {
            Ok(self.agents.lock().unwrap().clone())
        }
        async fn list_active(&self) -> DomainResult<Vec<Agent>> {
            Ok(self.agents.lock().unwrap().iter().filter(|a| !a.status.is_terminal()).cloned().collect())
        }
        async fn list_stale(&self, _older_than_seconds: i64) -> DomainResult<Vec<Agent>> {
            Ok(Vec::new())
        }
        async fn get_by_task(&self, task_id: Uuid) -> DomainResult<Option<Agent>> {
            Ok(self.agents.lock().unwrap().iter().find(|a| a.task_id == Some(task_id)).cloned())
        }
        async fn count_active_by_type(&self) -> DomainResult<std::collections::HashMap<AgentType, u64>> {
            Ok(std::collections::HashMap::new())
        }
    }

    #[derive(Default)]
    struct InMemoryTaskRepo {
        tasks: Mutex<Vec<Task>>,
    }

    #[async_trait]
    impl TaskRepository for InMemoryTaskRepo {
        async fn create(&self, task: &Task) -> DomainResult<()> {
            self.tasks.lock().unwrap().push(task.clone());
            Ok(())
        }
        async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
            Ok(self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned())
        }
        async fn update(&self, task: &Task) -> DomainResult<()> {
            let mut guard = self.tasks.lock().unwrap();
            if let Some(existing) = guard.iter_mut().find(|t| t.id == task.id) {
                *existing = task.clone();
            }
            Ok(())
        }
        async fn delete(&self, _id: Uuid) -> DomainResult<()> {
            Ok(())
        }
        async fn list(&self, _filter: TaskFilter) -> DomainResult<Vec<Task>> {
            Ok(self.tasks.lock().unwrap().clone())
        }
        async fn list_by_workflow(&self, _workflow_id: Uuid) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn list_by_phase(&self, _phase_id: Uuid) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn list_by_status(&self, _status: TaskStatus) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn get_subtasks(&self, _parent_task_id: Uuid) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn get_queued_ordered(&self, _workflow_id: Uuid, _phase_id: Option<Uuid>) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn get_by_agent_type(&self, _agent_type: &str) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn get_by_assigned_agent(&self, _agent_id: Uuid) -> DomainResult<Option<Task>> {
            Ok(None)
        }
        async fn get_dedup_candidates(&self, _workflow_id: Uuid, _phase_id: Option<Uuid>) -> DomainResult<Vec<Task>> {
            Ok(Vec::new())
        }
        async fn count_by_status(&self) -> DomainResult<std::collections::HashMap<TaskStatus, u64>> {
            Ok(std::collections::HashMap::new())
        }
    }

    #[derive(Default)]
    struct SingleWorkflowRepo {
        workflow: Mutex<Option<Workflow>>,
        phase: Mutex<Option<Phase>>,
    }

    #[async_trait]
    impl WorkflowRepository for SingleWorkflowRepo {
        async fn create(&self, workflow: &Workflow) -> DomainResult<()> {
            *self.workflow.lock().unwrap() = Some(workflow.clone());
            Ok(())
        }
        async fn get(&self, id: Uuid) -> DomainResult<Option<Workflow>> {
            Ok(self.workflow.lock().unwrap().clone().filter(|w| w.id == id))
        }
        async fn update(&self, _workflow: &Workflow) -> DomainResult<()> {
            Ok(())
        }
        async fn list(&self) -> DomainResult<Vec<Workflow>> {
            Ok(self.workflow.lock().unwrap().clone().into_iter().collect())
        }
        async fn create_phases(&self, phases: &[Phase]) -> DomainResult<()> {
            if let Some(phase) = phases.first() {
                *self.phase.lock().unwrap() = Some(phase.clone());
            }
            Ok(())
        }
        async fn get_phase(&self, id: Uuid) -> DomainResult<Option<Phase>> {
            Ok(self.phase.lock().unwrap().clone().filter(|p| p.id == id))
        }
        async fn get_phases(&self, _workflow_id: Uuid) -> DomainResult<Vec<Phase>> {
            Ok(self.phase.lock().unwrap().clone().into_iter().collect())
        }
        async fn get_next_phase(&self, _workflow_id: Uuid, _current_sequence: u32) -> DomainResult<Option<Phase>> {
            Ok(None)
        }
    }

    struct StubSubstrate {
        terminated: Mutex<Vec<Uuid>>,
    }

    impl Default for StubSubstrate {
        fn default() -> Self {
            Self { terminated: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Substrate for StubSubstrate {
        fn name(&self) -> &'static str {
            "mock"
        }
        async fn is_available(&self) -> DomainResult<bool> {
            Ok(true)
        }
        async fn execute(&self, request: SubstrateRequest) -> DomainResult<SubstrateSession> {
            let mut session = SubstrateSession::new(request.task_id, request.agent_template, request.config);
            session.complete("done");
            Ok(session)
        }
        async fn execute_streaming(&self, request: SubstrateRequest) -> DomainResult<(mpsc::Receiver<SubstrateOutput>, SubstrateSession)> {
            let (tx, rx) = mpsc::channel(4);
            let session = SubstrateSession::new(request.task_id, request.agent_template, request.config);
            drop(tx);
            Ok((rx, session))
        }
        async fn resume(&self, _session_id: Uuid, _additional_prompt: Option<String>) -> DomainResult<SubstrateSession> {
            Err(DomainError::ExternalUnavailable("not supported in test stub".to_string()))
        }
        async fn terminate(&self, session_id: Uuid) -> DomainResult<()> {
            self.terminated.lock().unwrap().push(session_id);
            Ok(())
        }
        async fn get_session(&self, _session_id: Uuid) -> DomainResult<Option<SubstrateSession>> {
            Ok(None)
        }
        async fn is_running(&self, _session_id: Uuid) -> DomainResult<bool> {
            Ok(false)
        }
        async fn capture(&self, _session_id: Uuid, _max_lines: usize) -> DomainResult<String> {
            Ok(String::new())
        }
        async fn list_active_sessions(&self) -> DomainResult<Vec<Uuid>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct StubQueueProcessor {
        calls: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl QueueProcessor for StubQueueProcessor {
        async fn process_queue(&self, workflow_id: Uuid) -> DomainResult<()> {
            self.calls.lock().unwrap().push(workflow_id);
            Ok(())
        }
    }

    fn worktree_service() -> Arc<WorktreeService> {
        #[derive(Default)]
        struct NullWorktreeRepo {
            created: Mutex<Vec<crate::domain::models::Worktree>>,
        }
        #[async_trait]
        impl crate::domain::ports::WorktreeRepository for NullWorktreeRepo {
            async fn create(&self, worktree: &crate::domain::models::Worktree) -> DomainResult<()> {
                self.created.lock().unwrap().push(worktree.clone());
                Ok(())
            }
            async fn get(&self, _id: Uuid) -> DomainResult<Option<crate::domain::models::Worktree>> {
                Ok(None)
            }
            async fn update(&self, _worktree: &crate::domain::models::Worktree) -> DomainResult<()> {
                Ok(())
            }
            async fn get_by_task(&self, task_id: Uuid) -> DomainResult<Option<crate::domain::models::Worktree>> {
                Ok(self.created.lock().unwrap().iter().find(|w| w.task_id == task_id).cloned())
            }
            async fn get_by_path(&self, path: &str) -> DomainResult<Option<crate::domain::models::Worktree>> {
                Ok(self.created.lock().unwrap().iter().find(|w| w.path == path).cloned())
            }
            async fn delete(&self, _id: Uuid) -> DomainResult<()> {
                Ok(())
            }
            async fn list_by_status(&self, _status: crate::domain::models::WorktreeStatus) -> DomainResult<Vec<crate::domain::models::Worktree>> {
                Ok(Vec::new())
            }
            async fn list_active(&self) -> DomainResult<Vec<crate::domain::models::Worktree>> {
                Ok(Vec::new())
            }
            async fn list_for_cleanup(&self) -> DomainResult<Vec<crate::domain::models::Worktree>> {
                Ok(Vec::new())
            }
            async fn count_by_status(&self) -> DomainResult<std::collections::HashMap<crate::domain::models::WorktreeStatus, u64>> {
                Ok(std::collections::HashMap::new())
            }
        }
        Arc::new(WorktreeService::with_defaults(Arc::new(NullWorktreeRepo::default())))
    }

    async fn build_service() -> (AgentService, Uuid, Uuid, Arc<StubQueueProcessor>) {
        let workflow = Workflow::new("w1", "ship the feature");
        let phase = Phase::new(workflow.id, 1, "Build", "write the code");
        let workflow_repo = Arc::new(SingleWorkflowRepo::default());
        workflow_repo.create(&workflow).await.unwrap();
        workflow_repo.create_phases(&[phase.clone()]).await.unwrap();

        let tasks = Arc::new(InMemoryTaskRepo::default());
        let mut task = Task::new(workflow.id, "implement the thing", "tests pass")
            .with_phase(phase.id)
            .with_priority(TaskPriority::Med);
        task.transition_to(TaskStatus::Assigned, None).unwrap();
        tasks.create(&task).await.unwrap();

        let queue_processor = Arc::new(StubQueueProcessor::default());
        let service = AgentService::new(
            Arc::new(InMemoryAgentRepo::default()),
            tasks,
            workflow_repo,
            Arc::new(StubSubstrate::default()),
            worktree_service(),
            Arc::new(crate::domain::ports::NullEventPublisher),
            AgentServiceConfig::default(),
        );
        service.set_queue_processor(queue_processor.clone());
        (service, workflow.id, task.id, queue_processor)
    }

    #[tokio::test]
    async fn spawn_creates_working_agent_and_advances_task() {
        let (service, _workflow_id, task_id, _queue) = build_service().await;
        let agent_id = service.spawn_for_task(task_id).await.unwrap();

        let agent = service.agents.get(agent_id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Working);
        assert_eq!(agent.task_id, Some(task_id));

        let task = service.tasks.get(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.assigned_agent_id, Some(agent_id));
    }

    #[tokio::test]
    async fn terminate_is_idempotent_and_triggers_queue_processing() {
        let (service, workflow_id, task_id, queue) = build_service().await;
        let agent_id = service.spawn_for_task(task_id).await.unwrap();

        service.terminate_agent(agent_id, "killed externally").await.unwrap();
        service.terminate_agent(agent_id, "killed externally").await.unwrap();

        let agent = service.agents.get(agent_id).await.unwrap().unwrap();
        assert_eq!(agent.status, AgentStatus::Terminated);

        let task = service.tasks.get(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.failure_reason.as_deref(), Some("killed externally"));

        assert_eq!(queue.calls.lock().unwrap().as_slice(), &[workflow_id]);
    }

    #[tokio::test]
    async fn authorize_rejects_placeholder_id() {
        let (service, ..) = build_service().await;
        let result = service.authorize_agent("your-agent-id").await;
        assert!(matches!(result, Err(DomainError::NotAuthorized)));
    }

    #[tokio::test]
    async fn authorize_accepts_working_agent() {
        let (service, _workflow_id, task_id, _queue) = build_service().await;
        let agent_id = service.spawn_for_task(task_id).await.unwrap();
        let agent = service.authorize_agent(&agent_id.to_string()).await.unwrap();
        assert_eq!(agent.id, agent_id);
    }
}
