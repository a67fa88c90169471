//! Domain ports (interfaces) for the orchestrator.

pub mod agent_repository;
pub mod agent_spawner;
pub mod agent_terminator;
pub mod conductor_repository;
pub mod diagnostic_repository;
pub mod embedding;
pub mod errors;
pub mod event_publisher;
pub mod guardian_repository;
pub mod llm_client;
pub mod logger;
pub mod memory_repository;
pub mod null_embedding;
pub mod null_memory;
pub mod queue_processor;
pub mod substrate;
pub mod task_repository;
pub mod ticket_repository;
pub mod validation_repository;
pub mod workflow_repository;
pub mod worktree_repository;

pub use agent_repository::{AgentFilter, AgentRepository};
pub use agent_spawner::AgentSpawner;
pub use agent_terminator::AgentTerminator;
pub use conductor_repository::ConductorRepository;
pub use diagnostic_repository::DiagnosticRepository;
pub use embedding::{EmbeddingInput, EmbeddingOutput, EmbeddingProvider};
pub use event_publisher::{DomainEvent, EventPublisher, NullEventPublisher};
pub use guardian_repository::GuardianRepository;
pub use llm_client::{CompletionOutput, CompletionRequest, LlmClient};
pub use logger::Logger;
pub use memory_repository::MemoryRepository;
pub use null_embedding::NullEmbeddingProvider;
pub use null_memory::NullMemoryRepository;
pub use queue_processor::QueueProcessor;
pub use substrate::{Substrate, SubstrateFactory};
pub use task_repository::{TaskFilter, TaskRepository};
pub use ticket_repository::{TicketFilter, TicketRepository};
pub use validation_repository::ValidationRepository;
pub use workflow_repository::WorkflowRepository;
pub use worktree_repository::WorktreeRepository;
