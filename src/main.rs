//! Orchestrator process entry point.
//!
//! Composition root: loads configuration, initialises logging, connects and
//! migrates the store, wires every adapter into the service layer, and runs
//! the monitoring loop until the process receives a shutdown signal. The
//! agent-facing RPC surface and the UI-facing HTTP surface are layered on
//! top of this composition separately.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info};

use abathur::adapters::embeddings::openai::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
use abathur::adapters::llm::MultiProviderLlmClient;
use abathur::adapters::sqlite::{
    initialize_database, SqliteAgentRepository, SqliteConductorRepository,
    SqliteDiagnosticRepository, SqliteGuardianRepository, SqliteMemoryRepository,
    SqliteTaskRepository, SqliteTicketRepository, SqliteValidationRepository,
    SqliteWorkflowRepository, SqliteWorktreeRepository,
};
use abathur::adapters::substrates::anthropic_api::AnthropicApiConfig;
use abathur::adapters::substrates::claude_code::ClaudeCodeConfig;
use abathur::adapters::mcp::server::{AppState, McpServerConfig};
use abathur::adapters::mcp::EventBroadcaster;
use abathur::adapters::substrates::registry::SubstrateRegistry;
use abathur::domain::models::{Config, SubstrateType};
use abathur::domain::ports::{
    AgentRepository, AgentSpawner, AgentTerminator, EmbeddingProvider, EventPublisher, LlmClient,
    NullEmbeddingProvider, QueueProcessor, Substrate, TaskRepository, WorkflowRepository,
};
use abathur::infrastructure::config::ConfigLoader;
use abathur::infrastructure::logging::{LogConfig, LogFormat, LoggerImpl, RotationPolicy};
use abathur::services::{
    AgentService, AgentServiceConfig, ConductorService, ConductorServiceConfig, DiagnosticService,
    DiagnosticServiceConfig, EmbeddingService, EmbeddingServiceConfig, GuardianService,
    GuardianServiceConfig, MemoryDecayDaemon, MemoryService, MonitoringLoop, MonitoringLoopConfig,
    TaskQueueService, TaskQueueServiceConfig, TicketService, TicketServiceConfig, ValidationService,
    ValidationServiceConfig, WorktreeService, WorktreeServiceConfig,
};

/// Every constructed service, held for the process lifetime. Not every
/// field is read yet: the RPC surface that exposes ticket, validation and
/// memory operations to agents, and the HTTP surface that exposes them to
/// UIs, are wired on top of this struct separately.
#[allow(dead_code)]
struct Orchestrator {
    task_queue: Arc<TaskQueueService>,
    agents: Arc<AgentService>,
    validation: Arc<ValidationService>,
    ticket: Arc<TicketService>,
    memory: Arc<MemoryService>,
    memory_decay_handle: abathur::services::DaemonHandle,
}

fn bridge_log_config(logging: &abathur::domain::models::LoggingConfig) -> LogConfig {
    let format = match logging.format.as_str() {
        "pretty" => LogFormat::Pretty,
        _ => LogFormat::Json,
    };
    LogConfig {
        level: logging.level.clone(),
        format,
        log_dir: Some(std::path::PathBuf::from(".abathur/logs")),
        enable_stdout: true,
        rotation: RotationPolicy::Daily,
        retention_days: i64::from(logging.retention_days),
    }
}

fn build_substrate(config: &Config) -> Arc<dyn Substrate> {
    let registry = SubstrateRegistry::new()
        .with_claude_code_config(ClaudeCodeConfig {
            binary_path: config.substrates.claude_code.claude_path.clone(),
            ..ClaudeCodeConfig::default()
        })
        .with_anthropic_api_config(AnthropicApiConfig {
            api_key: config.substrates.anthropic_api.api_key.clone(),
            base_url: config
                .substrates
                .anthropic_api
                .base_url
                .clone()
                .unwrap_or_else(|| AnthropicApiConfig::default().base_url),
            default_model: config.substrates.anthropic_api.model.clone(),
            ..AnthropicApiConfig::default()
        });

    let substrate_type =
        SubstrateType::from_str(&config.substrates.default_substrate).unwrap_or_default();
    Arc::from(registry.create_by_type(substrate_type))
}

/// Builds the embedding provider, honouring `dedup_mandatory` (spec §6 exit
/// codes: startup fails if dedup is mandatory and the provider can't be
/// reached).
fn build_embedding_provider(config: &Config) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    if config.embedding.provider != "openai" {
        if config.embedding.dedup_mandatory {
            anyhow::bail!(
                "embedding provider '{}' is not supported and dedup is mandatory",
                config.embedding.provider
            );
        }
        return Ok(Arc::new(NullEmbeddingProvider::new()));
    }

    let has_key = config.embedding.api_key.is_some() || std::env::var("OPENAI_API_KEY").is_ok();
    if !has_key {
        if config.embedding.dedup_mandatory {
            anyhow::bail!("embedding.dedup_mandatory is set but no OpenAI API key is configured");
        }
        info!("no embedding API key configured, deduplication disabled");
        return Ok(Arc::new(NullEmbeddingProvider::new()));
    }

    let provider = OpenAiEmbeddingProvider::new(OpenAiEmbeddingConfig {
        api_key: config.embedding.api_key.clone(),
        dimension: config.embedding.dimension,
        ..OpenAiEmbeddingConfig::default()
    });
    Ok(Arc::new(provider))
}

async fn run() -> anyhow::Result<()> {
    let config = ConfigLoader::load().context("failed to load configuration")?;

    let _logger = LoggerImpl::init(&bridge_log_config(&config.logging))
        .context("failed to initialise logging")?;

    info!(max_agents = config.max_agents, "starting orchestrator");

    config
        .llm
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("LLM routing table is invalid")?;

    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create database directory")?;
        }
    }
    let database_url = format!("sqlite:{}?mode=rwc", config.database.path);
    let pool = initialize_database(&database_url)
        .await
        .context("failed to connect to or migrate the store")?;

    let agent_repo = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let workflow_repo = Arc::new(SqliteWorkflowRepository::new(pool.clone()));
    let guardian_repo = Arc::new(SqliteGuardianRepository::new(pool.clone()));
    let conductor_repo = Arc::new(SqliteConductorRepository::new(pool.clone()));
    let diagnostic_repo = Arc::new(SqliteDiagnosticRepository::new(pool.clone()));
    let validation_repo = Arc::new(SqliteValidationRepository::new(pool.clone()));
    let ticket_repo = Arc::new(SqliteTicketRepository::new(pool.clone()));
    let memory_repo = Arc::new(SqliteMemoryRepository::new(pool.clone()));
    let worktree_repo = Arc::new(SqliteWorktreeRepository::new(pool));

    let embedding_provider = build_embedding_provider(&config)?;

    let llm_client: Arc<dyn LlmClient> = Arc::new(
        MultiProviderLlmClient::new(config.llm.clone())
            .context("failed to construct multi-provider LLM client")?,
    );

    let substrate = build_substrate(&config);

    let worktree_service = Arc::new(WorktreeService::new(
        worktree_repo,
        WorktreeServiceConfig::default(),
    ));

    let task_queue = Arc::new(TaskQueueService::new(
        task_repo.clone() as Arc<dyn TaskRepository>,
        agent_repo.clone() as Arc<dyn AgentRepository>,
        guardian_repo.clone(),
        Some(embedding_provider.clone()),
        Some(llm_client.clone()),
        TaskQueueServiceConfig {
            max_concurrent_agents: config.max_agents,
            dedup_similarity_threshold: config.embedding.dedup_similarity_threshold,
            bump_safety_multiplier: config.validation.bump_safety_multiplier,
            ..TaskQueueServiceConfig::default()
        },
    ));

    let event_broadcaster = EventBroadcaster::default();

    let agent_service = Arc::new(AgentService::new(
        agent_repo.clone() as Arc<dyn AgentRepository>,
        task_repo.clone() as Arc<dyn TaskRepository>,
        workflow_repo.clone(),
        substrate.clone(),
        worktree_service,
        Arc::new(event_broadcaster.clone()) as Arc<dyn EventPublisher>,
        AgentServiceConfig::default(),
    ));

    task_queue.set_spawner(agent_service.clone() as Arc<dyn AgentSpawner>);
    agent_service.set_queue_processor(task_queue.clone() as Arc<dyn QueueProcessor>);

    let guardian_service = Arc::new(GuardianService::new(
        guardian_repo.clone(),
        llm_client.clone(),
        substrate.clone(),
        GuardianServiceConfig {
            history_k: config.monitoring.guardian_history_k,
            scrollback_lines: config.monitoring.guardian_scrollback_lines,
        },
    ));

    let conductor_service = Arc::new(ConductorService::new(
        conductor_repo,
        agent_repo.clone() as Arc<dyn AgentRepository>,
        task_repo.clone() as Arc<dyn TaskRepository>,
        workflow_repo.clone(),
        guardian_repo,
        llm_client.clone(),
        ConductorServiceConfig {
            duplicate_similarity_threshold: config.monitoring.duplicate_similarity_threshold,
        },
    ));

    let diagnostic_service = Arc::new(DiagnosticService::new(
        diagnostic_repo,
        task_repo.clone() as Arc<dyn TaskRepository>,
        validation_repo.clone(),
        llm_client.clone(),
        DiagnosticServiceConfig {
            cooldown_seconds: config.monitoring.diagnostic.cooldown_seconds,
            min_stuck_time_seconds: config.monitoring.diagnostic.min_stuck_time_seconds,
            max_tasks_per_run: config.monitoring.diagnostic.max_tasks_per_run,
            history_n: config.monitoring.diagnostic.history_n,
        },
    ));

    let validation_service = Arc::new(ValidationService::new(
        validation_repo,
        task_repo.clone() as Arc<dyn TaskRepository>,
        ValidationServiceConfig {
            max_iterations: config.validation.max_iterations,
        },
    ));

    let ticket_service = Arc::new(TicketService::new(
        ticket_repo,
        Some(embedding_provider.clone()),
        TicketServiceConfig {
            hybrid_search_semantic_weight: config.validation.hybrid_search_semantic_weight,
            approval_timeout_seconds: config.validation.approval_timeout_seconds,
        },
    ));

    let embedding_service = Arc::new(EmbeddingService::new(
        embedding_provider,
        EmbeddingServiceConfig::default(),
    ));
    let memory_service = Arc::new(MemoryService::new(memory_repo, embedding_service));
    let memory_decay_daemon = MemoryDecayDaemon::with_defaults(memory_service.clone());
    let memory_decay_handle = memory_decay_daemon.handle();

    let mcp_tasks = task_repo.clone() as Arc<dyn TaskRepository>;
    let mcp_agent_repo = agent_repo.clone() as Arc<dyn AgentRepository>;
    let mcp_workflows = workflow_repo.clone() as Arc<dyn WorkflowRepository>;

    let monitoring = MonitoringLoop::new(
        agent_repo as Arc<dyn AgentRepository>,
        task_repo as Arc<dyn TaskRepository>,
        workflow_repo,
        substrate,
        agent_service.clone() as Arc<dyn AgentTerminator>,
        guardian_service,
        conductor_service,
        diagnostic_service.clone(),
        MonitoringLoopConfig {
            cycle_seconds: config.monitoring.cycle_seconds,
            guardian_min_agent_age_seconds: config.monitoring.guardian_min_agent_age_seconds,
            orphan_grace_seconds: config.monitoring.orphan_grace_seconds,
            max_concurrent: config.monitoring.max_concurrent,
        },
    );

    let mcp_state = AppState {
        tasks: mcp_tasks,
        agent_repo: mcp_agent_repo,
        workflows: mcp_workflows,
        task_queue: task_queue.clone(),
        agent_service: agent_service.clone(),
        validation: validation_service.clone(),
        ticket: ticket_service.clone(),
        memory: memory_service.clone(),
        events: event_broadcaster,
    };

    let orchestrator = Orchestrator {
        task_queue,
        agents: agent_service,
        validation: validation_service,
        ticket: ticket_service,
        memory: memory_service,
        memory_decay_handle,
    };
    let _orchestrator = orchestrator;

    let mut decay_events = memory_decay_daemon.run();
    tokio::spawn(async move {
        while let Some(event) = decay_events.recv().await {
            info!(?event, "memory decay daemon event");
        }
    });

    let mut monitor_events = monitoring.run();
    tokio::spawn(async move {
        while let Some(event) = monitor_events.recv().await {
            info!(?event, "monitoring loop event");
        }
    });

    let mcp_config = McpServerConfig::default();
    tokio::spawn(async move {
        if let Err(err) = abathur::adapters::mcp::server::serve(mcp_state, mcp_config).await {
            error!(error = %err, "mcp server exited");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received, exiting");

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async {
        if let Err(e) = run().await {
            error!(error = %e, "orchestrator failed to start");
            std::process::exit(1);
        }
        Ok(())
    })
}
