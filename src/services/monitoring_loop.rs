//! Monitoring loop (C13): the cron-like driver tying the Guardian,
//! Conductor, and workflow doctor together.
//!
//! Every cycle: reap orphaned agents, run a Guardian pass over every
//! eligible working agent, hand the batch to the Conductor once there are
//! at least two of them, execute any termination recommendations, then
//! check every workflow's diagnostic trigger.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Agent, GuardianAnalysis};
use crate::domain::ports::{AgentRepository, AgentTerminator, Substrate, TaskRepository, WorkflowRepository};

use super::conductor_service::ConductorService;
use super::diagnostic_service::DiagnosticService;
use super::guardian_service::GuardianService;

#[derive(Debug, Clone, Copy)]
pub struct MonitoringLoopConfig {
    pub cycle_seconds: u64,
    pub guardian_min_agent_age_seconds: i64,
    pub orphan_grace_seconds: i64,
    pub max_concurrent: usize,
}

impl Default for MonitoringLoopConfig {
    fn default() -> Self {
        Self { cycle_seconds: 60, guardian_min_agent_age_seconds: 60, orphan_grace_seconds: 120, max_concurrent: 5 }
    }
}

/// What one cycle accomplished, reported back to callers and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleSummary {
    pub orphans_reaped: usize,
    pub guardian_analyses: usize,
    pub terminations: usize,
}

#[derive(Debug, Clone)]
pub enum MonitoringEvent {
    Started,
    CycleStarted { run_number: u64 },
    CycleCompleted { run_number: u64, summary: CycleSummary, duration_ms: u64 },
    CycleFailed { run_number: u64, error: String },
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct MonitoringStatus {
    pub running: bool,
    pub total_cycles: u64,
    pub total_orphans_reaped: u64,
    pub total_terminations: u64,
    pub last_cycle: Option<Instant>,
}

/// Handle to control a running `MonitoringLoop`.
pub struct MonitoringHandle {
    stop_flag: Arc<AtomicBool>,
    status: Arc<RwLock<MonitoringStatus>>,
}

impl MonitoringHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> MonitoringStatus {
        self.status.read().await.clone()
    }
}

pub struct MonitoringLoop {
    agents: Arc<dyn AgentRepository>,
    tasks: Arc<dyn TaskRepository>,
    workflows: Arc<dyn WorkflowRepository>,
    substrate: Arc<dyn Substrate>,
    terminator: Arc<dyn AgentTerminator>,
    guardian: Arc<GuardianService>,
    conductor: Arc<ConductorService>,
    diagnostic: Arc<DiagnosticService>,
    config: MonitoringLoopConfig,
    status: Arc<RwLock<MonitoringStatus>>,
    stop_flag: Arc<AtomicBool>,
    started_at: Instant,
}

impl MonitoringLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: Arc<dyn AgentRepository>,
        tasks: Arc<dyn TaskRepository>,
        workflows: Arc<dyn WorkflowRepository>,
        substrate: Arc<dyn Substrate>,
        terminator: Arc<dyn AgentTerminator>,
        guardian: Arc<GuardianService>,
        conductor: Arc<ConductorService>,
        diagnostic: Arc<DiagnosticService>,
        config: MonitoringLoopConfig,
    ) -> Self {
        Self {
            agents,
            tasks,
            workflows,
            substrate,
            terminator,
            guardian,
            conductor,
            diagnostic,
            config,
            status: Arc::new(RwLock::new(MonitoringStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn handle(&self) -> MonitoringHandle {
        MonitoringHandle { stop_flag: self.stop_flag.clone(), status: self.status.clone() }
    }

    /// Run as a background task on its own `cycle_seconds` timer, returning
    /// a channel of lifecycle events.
    pub fn run(self) -> mpsc::Receiver<MonitoringEvent> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run_loop(tx).await;
        });
        rx
    }

    async fn run_loop(self, tx: mpsc::Sender<MonitoringEvent>) {
        {
            let mut status = self.status.write().await;
            status.running = true;
        }
        let _ = tx.send(MonitoringEvent::Started).await;

        let mut interval_timer = interval(Duration::from_secs(self.config.cycle_seconds));
        loop {
            interval_timer.tick().await;
            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }
            self.run_cycle_tracked(&tx).await;
        }

        let mut status = self.status.write().await;
        status.running = false;
        drop(status);
        let _ = tx.send(MonitoringEvent::Stopped).await;
    }

    async fn run_cycle_tracked(&self, tx: &mpsc::Sender<MonitoringEvent>) {
        let run_number = {
            let mut status = self.status.write().await;
            status.total_cycles += 1;
            status.total_cycles
        };
        let _ = tx.send(MonitoringEvent::CycleStarted { run_number }).await;

        let start = Instant::now();
        let result = self.run_cycle().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(summary) => {
                let mut status = self.status.write().await;
                status.total_orphans_reaped += summary.orphans_reaped as u64;
                status.total_terminations += summary.terminations as u64;
                status.last_cycle = Some(Instant::now());
                drop(status);
                let _ = tx.send(MonitoringEvent::CycleCompleted { run_number, summary, duration_ms }).await;
            }
            Err(err) => {
                let _ = tx.send(MonitoringEvent::CycleFailed { run_number, error: err.to_string() }).await;
            }
        }
    }

    /// Run one monitoring cycle synchronously. Used directly by callers
    /// that do their own scheduling instead of [`Self::run`].
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> DomainResult<CycleSummary> {
        let orphans_reaped = self.reap_orphans().await?;

        let eligible = self.eligible_agents().await?;
        let analyses = if eligible.is_empty() { Vec::new() } else { self.run_guardian_pass(&eligible).await? };

        let mut terminations = 0;
        if eligible.len() >= 2 {
            let conductor_analysis = self.conductor.analyze(&eligible).await?;
            terminations = conductor_analysis.termination_recommendations.len();
            self.conductor.execute_terminations(&conductor_analysis, self.terminator.as_ref()).await?;
        }

        for workflow in self.workflows.list().await? {
            if let Err(err) = self.diagnostic.evaluate_and_maybe_trigger(workflow.id, &workflow.goal_text).await {
                warn!(workflow_id = %workflow.id, error = %err, "diagnostic check failed for workflow");
            }
        }

        info!(orphans_reaped, guardian_analyses = analyses.len(), terminations, "monitoring cycle complete");
        Ok(CycleSummary { orphans_reaped, guardian_analyses: analyses.len(), terminations })
    }

    async fn eligible_agents(&self) -> DomainResult<Vec<Agent>> {
        let now = Utc::now();
        Ok(self
            .agents
            .list_active()
            .await?
            .into_iter()
            .filter(|agent| agent.is_eligible_for_monitoring(now, self.config.guardian_min_agent_age_seconds))
            .collect())
    }

    async fn run_guardian_pass(&self, agents: &[Agent]) -> DomainResult<Vec<GuardianAnalysis>> {
        let max_concurrent = self.config.max_concurrent;
        let results: Vec<DomainResult<GuardianAnalysis>> = stream::iter(agents.iter().cloned())
            .map(|agent| {
                let guardian = self.guardian.clone();
                let tasks = self.tasks.clone();
                async move {
                    let (description, done_definition) = match agent.task_id {
                        Some(task_id) => match tasks.get(task_id).await {
                            Ok(Some(task)) => (task.description, task.done_definition),
                            _ => (String::new(), String::new()),
                        },
                        None => (String::new(), String::new()),
                    };
                    guardian.analyze_agent(&agent, &description, &done_definition, "working").await
                }
            })
            .buffer_unordered(max_concurrent)
            .collect()
            .await;

        let mut analyses = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(analysis) => analyses.push(analysis),
                Err(err) => warn!(error = %err, "guardian analysis failed for an agent"),
            }
        }
        Ok(analyses)
    }

    /// Terminate agents whose substrate session is no longer running.
    ///
    /// Held off for `orphan_grace_seconds` after the loop starts: right
    /// after process start the substrate's active-session list may not yet
    /// reflect sessions that were already running, and treating that as
    /// "not running" would reap live agents.
    async fn reap_orphans(&self) -> DomainResult<usize> {
        if self.started_at.elapsed().as_secs() < self.config.orphan_grace_seconds as u64 {
            return Ok(0);
        }

        let active_sessions: HashSet<Uuid> = self.substrate.list_active_sessions().await?.into_iter().collect();
        let known_agents = self.agents.list_active().await?;
        let mut reaped = 0;

        for agent in &known_agents {
            let Ok(session_id) = Uuid::parse_str(&agent.session_name) else {
                continue;
            };
            if active_sessions.contains(&session_id) {
                continue;
            }
            match self.terminator.terminate_agent(agent.id, "orphaned: substrate session no longer running").await {
                Ok(()) => reaped += 1,
                Err(err) => warn!(agent_id = %agent.id, error = %err, "failed to reap orphaned agent"),
            }
        }
        Ok(reaped)
    }
}
