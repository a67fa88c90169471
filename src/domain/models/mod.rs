//! Domain models
//!
//! Pure domain entities with business logic and validation rules.
//! These models are framework-agnostic and contain no infrastructure concerns.

pub mod agent;
pub mod agent_metadata;
pub mod conductor;
pub mod config;
pub mod diagnostic;
pub mod guardian;
pub mod memory;
pub mod queue;
pub mod substrate;
pub mod task;
pub mod ticket;
pub mod validation;
pub mod workflow;
pub mod worktree;

pub use agent::{Agent, AgentStatus, AgentType};
pub use agent_metadata::{AgentMetadata, AgentMetadataRegistry};
pub use conductor::{AgentRanking, ConductorAnalysis, DuplicatePair, TerminationRecommendation};
pub use config::{
    AnthropicApiSubstrateConfig, ClaudeCodeSubstrateConfig, Config, DatabaseConfig,
    EmbeddingConfig, LlmConfig, LlmProviderConfig, LoggingConfig, McpServerConfig,
    MonitoringConfig, RateLimitConfig, RetryConfig, SubstratesConfig, ValidationConfig,
    REQUIRED_LLM_COMPONENTS,
};
pub use diagnostic::{
    DiagnosticRun, DiagnosticRunStatus, DiagnosticTriggerInputs, DiagnosticTriggerStats,
};
pub use guardian::{AgentContextSummary, GuardianAnalysis, SteeringIntervention, SteeringType};
pub use memory::{AccessorId, Memory, MemoryMetadata, MemoryQuery, MemoryTier, MemoryType};
pub use queue::{QueueItem, TaskQueue};
pub use substrate::{
    SessionStatus, SubstrateConfig, SubstrateOutput, SubstrateRequest, SubstrateSession,
    SubstrateType,
};
pub use task::{Task, TaskPriority, TaskStatus};
pub use ticket::{ApprovalStatus, Ticket, TicketBlock, TicketComment};
pub use validation::{
    ResultType, TaskResult, ValidationReview, ValidatorCriterion, VerificationStatus,
    WorkflowResult, WorkflowResultStatus,
};
pub use workflow::{BoardConfig, OnResultFound, Phase, PhaseValidation, Workflow};
pub use worktree::{Worktree, WorktreeStatus};
