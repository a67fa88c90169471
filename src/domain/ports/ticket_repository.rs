//! Ticket repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ApprovalStatus, Ticket, TicketBlock, TicketComment};

/// Filter criteria for listing tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub workflow_id: Option<Uuid>,
    pub status: Option<String>,
    pub ticket_type: Option<String>,
    pub approval_status: Option<ApprovalStatus>,
}

/// Repository interface for ticket + blocking-DAG + comment persistence.
#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Create a new ticket.
    async fn create(&self, ticket: &Ticket) -> DomainResult<()>;

    /// Get a ticket by ID.
    async fn get(&self, id: Uuid) -> DomainResult<Option<Ticket>>;

    /// Update a ticket (status, approval, embedding, ...).
    async fn update(&self, ticket: &Ticket) -> DomainResult<()>;

    /// Delete a ticket outright, used when a pending-review ticket is
    /// rejected (spec: "on reject, the ticket row is deleted").
    async fn delete(&self, id: Uuid) -> DomainResult<()>;

    /// List tickets with optional filters.
    async fn list(&self, filter: TicketFilter) -> DomainResult<Vec<Ticket>>;

    /// Full ticket list for a workflow, used by the blocking DAG to compute
    /// cycle detection and resolution gates in-memory.
    async fn list_by_workflow(&self, workflow_id: Uuid) -> DomainResult<Vec<Ticket>>;

    /// Tickets awaiting human approval, for `/tickets/pending-review-count`.
    async fn count_pending_review(&self) -> DomainResult<u64>;

    /// Tickets that have been `PendingReview` longer than `older_than_seconds`,
    /// used to auto-reject on `approval_timeout_seconds`.
    async fn list_pending_review_older_than(&self, older_than_seconds: i64) -> DomainResult<Vec<Ticket>>;

    /// Keyword (BM25-lite) candidate search over title+description.
    async fn search_keyword(&self, workflow_id: Uuid, query: &str, limit: usize) -> DomainResult<Vec<Ticket>>;

    /// Semantic candidate search over stored embeddings.
    async fn search_semantic(&self, workflow_id: Uuid, query_embedding: &[f32], limit: usize) -> DomainResult<Vec<(Ticket, f32)>>;

    /// Add a blocking edge.
    async fn add_block(&self, block: TicketBlock) -> DomainResult<()>;

    /// Remove a blocking edge.
    async fn remove_block(&self, blocker_id: Uuid, blocked_id: Uuid) -> DomainResult<()>;

    /// All blocking edges for a workflow, for cycle detection and gating.
    async fn get_blocks(&self, workflow_id: Uuid) -> DomainResult<Vec<TicketBlock>>;

    /// Append a comment.
    async fn add_comment(&self, comment: &TicketComment) -> DomainResult<()>;

    /// List comments for a ticket, oldest first.
    async fn get_comments(&self, ticket_id: Uuid) -> DomainResult<Vec<TicketComment>>;
}
