//! Ticket engine (C7).
//!
//! Tickets are persistent kanban-style work items with a blocking DAG and an
//! optional human-approval gate, searchable with a hybrid keyword/semantic
//! query. Tasks reference tickets by id; the queue (C6) consults
//! `all_blockers_resolved` before letting a ticket-linked task proceed.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApprovalStatus, Ticket, TicketBlock, TicketComment};
use crate::domain::models::ticket::{all_blockers_resolved, would_create_cycle};
use crate::domain::ports::{EmbeddingProvider, TicketFilter, TicketRepository};

/// Weighting between the semantic and keyword terms of hybrid search.
#[derive(Debug, Clone, Copy)]
pub struct TicketServiceConfig {
    /// Weight given to the semantic term; the keyword term gets `1.0 - this`.
    pub hybrid_search_semantic_weight: f32,
    pub approval_timeout_seconds: u64,
}

impl Default for TicketServiceConfig {
    fn default() -> Self {
        Self { hybrid_search_semantic_weight: 0.7, approval_timeout_seconds: 1800 }
    }
}

/// A ticket returned from `hybrid_search`, carrying the combined score.
#[derive(Debug, Clone)]
pub struct RankedTicket {
    pub ticket: Ticket,
    pub score: f32,
}

pub struct TicketService {
    repository: Arc<dyn TicketRepository>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    config: TicketServiceConfig,
}

impl TicketService {
    pub fn new(repository: Arc<dyn TicketRepository>, embedding: Option<Arc<dyn EmbeddingProvider>>, config: TicketServiceConfig) -> Self {
        Self { repository, embedding, config }
    }

    #[instrument(skip(self, title, description), fields(%workflow_id))]
    pub async fn create_ticket(
        &self,
        workflow_id: Uuid,
        title: impl Into<String>,
        description: impl Into<String>,
        ticket_type: impl Into<String>,
        initial_status: impl Into<String>,
        requires_approval: bool,
    ) -> DomainResult<Ticket> {
        let title = title.into();
        let description = description.into();
        let mut ticket = Ticket::new(workflow_id, title.clone(), description.clone(), initial_status).with_ticket_type(ticket_type);
        if requires_approval {
            ticket = ticket.requiring_approval();
        }

        if let Some(embedding) = &self.embedding {
            match embedding.embed(&format!("{title}\n{description}")).await {
                Ok(vector) => ticket.embedding = Some(vector),
                Err(e) => warn!(error = %e, "ticket embedding failed, hybrid search will fall back to keyword-only for this ticket"),
            }
        }

        self.repository.create(&ticket).await?;
        info!(ticket_id = %ticket.id, %workflow_id, "ticket created");
        Ok(ticket)
    }

    pub async fn get(&self, id: Uuid) -> DomainResult<Ticket> {
        self.repository.get(id).await?.ok_or(DomainError::TicketNotFound(id))
    }

    pub async fn list(&self, filter: TicketFilter) -> DomainResult<Vec<Ticket>> {
        self.repository.list(filter).await
    }

    /// `GET /tickets/pending-review-count`.
    pub async fn pending_review_count(&self) -> DomainResult<u64> {
        self.repository.count_pending_review().await
    }

    /// `GET /graph`: every ticket and blocking edge in a workflow.
    pub async fn graph(&self, workflow_id: Uuid) -> DomainResult<(Vec<Ticket>, Vec<TicketBlock>)> {
        let tickets = self.repository.list_by_workflow(workflow_id).await?;
        let blocks = self.repository.get_blocks(workflow_id).await?;
        Ok((tickets, blocks))
    }

    pub async fn add_comment(&self, ticket_id: Uuid, text: impl Into<String>, author_agent_id: Option<Uuid>) -> DomainResult<TicketComment> {
        self.get(ticket_id).await?;
        let mut comment = TicketComment::new(ticket_id, text);
        if let Some(author) = author_agent_id {
            comment = comment.with_author(author);
        }
        self.repository.add_comment(&comment).await?;
        Ok(comment)
    }

    pub async fn get_comments(&self, ticket_id: Uuid) -> DomainResult<Vec<TicketComment>> {
        self.repository.get_comments(ticket_id).await
    }

    /// Move a ticket to `new_status`, validated against the workflow's
    /// configured board columns.
    #[instrument(skip(self, comment), fields(%ticket_id, %new_status))]
    pub async fn change_status(&self, ticket_id: Uuid, new_status: &str, valid_columns: &[String], comment: Option<String>) -> DomainResult<Ticket> {
        if !valid_columns.iter().any(|c| c == new_status) {
            return Err(DomainError::ValidationFailed(format!("'{new_status}' is not a configured board column")));
        }
        let mut ticket = self.get(ticket_id).await?;
        ticket.change_status(new_status, comment);
        self.repository.update(&ticket).await?;
        Ok(ticket)
    }

    pub async fn approve(&self, ticket_id: Uuid) -> DomainResult<Ticket> {
        let mut ticket = self.get(ticket_id).await?;
        ticket.approve();
        self.repository.update(&ticket).await?;
        info!(%ticket_id, "ticket approved");
        Ok(ticket)
    }

    pub async fn reject(&self, ticket_id: Uuid) -> DomainResult<Ticket> {
        let mut ticket = self.get(ticket_id).await?;
        ticket.reject();
        self.repository.update(&ticket).await?;
        info!(%ticket_id, "ticket rejected");
        Ok(ticket)
    }

    /// Delete a ticket outright. Used on the pending-review gate's reject
    /// and timeout paths, where the spec calls for the row itself to be
    /// removed rather than left in a terminal `rejected` state.
    pub async fn delete(&self, ticket_id: Uuid) -> DomainResult<()> {
        self.repository.delete(ticket_id).await?;
        info!(%ticket_id, "ticket deleted");
        Ok(())
    }

    /// Auto-reject (by deletion) any ticket that has sat `PendingReview`
    /// longer than `approval_timeout_seconds`, per the ticket board's
    /// human-review gate.
    pub async fn expire_stale_approvals(&self) -> DomainResult<Vec<Uuid>> {
        let stale = self.repository.list_pending_review_older_than(self.config.approval_timeout_seconds as i64).await?;
        let mut deleted = Vec::with_capacity(stale.len());
        for ticket in stale {
            self.repository.delete(ticket.id).await?;
            warn!(ticket_id = %ticket.id, "ticket approval timed out, deleted");
            deleted.push(ticket.id);
        }
        Ok(deleted)
    }

    /// Insert a blocking edge `blocker -> blocked`, refusing anything that
    /// would close a cycle in the ticket graph.
    #[instrument(skip(self))]
    pub async fn add_block(&self, workflow_id: Uuid, blocker_id: Uuid, blocked_id: Uuid) -> DomainResult<()> {
        self.get(blocker_id).await?;
        self.get(blocked_id).await?;
        let edges = self.repository.get_blocks(workflow_id).await?;
        if would_create_cycle(&edges, blocker_id, blocked_id) {
            return Err(DomainError::BlockingCycle(blocker_id, blocked_id));
        }
        self.repository.add_block(TicketBlock::new(blocker_id, blocked_id)).await
    }

    pub async fn remove_block(&self, blocker_id: Uuid, blocked_id: Uuid) -> DomainResult<()> {
        self.repository.remove_block(blocker_id, blocked_id).await
    }

    /// True once every ticket blocking `ticket_id` is in one of
    /// `resolved_columns`.
    pub async fn is_resolvable(&self, workflow_id: Uuid, ticket_id: Uuid, resolved_columns: &[String]) -> DomainResult<bool> {
        let edges = self.repository.get_blocks(workflow_id).await?;
        let tickets = self.repository.list_by_workflow(workflow_id).await?;
        Ok(all_blockers_resolved(&edges, ticket_id, |blocker_id| {
            tickets.iter().any(|t| t.id == blocker_id && resolved_columns.iter().any(|c| c == &t.status))
        }))
    }

    /// Resolve a ticket, refusing if any blocker is not yet resolved.
    ///
    /// Returns the resolved ticket plus the ids of every ticket `ticket_id`
    /// was blocking that is now itself fully unblocked, so the caller can
    /// emit a `ticket_unblocked` event per successor.
    #[instrument(skip(self, resolution_comment), fields(%ticket_id))]
    pub async fn resolve(&self, workflow_id: Uuid, ticket_id: Uuid, resolution_comment: impl Into<String>, resolved_status: &str, resolved_columns: &[String]) -> DomainResult<(Ticket, Vec<Uuid>)> {
        if !self.is_resolvable(workflow_id, ticket_id, resolved_columns).await? {
            return Err(DomainError::ValidationFailed(format!("ticket {ticket_id} still has unresolved blockers")));
        }
        let mut ticket = self.get(ticket_id).await?;
        ticket.resolve(resolution_comment, resolved_status);
        self.repository.update(&ticket).await?;
        info!(%ticket_id, "ticket resolved");

        let edges = self.repository.get_blocks(workflow_id).await?;
        let mut unblocked = Vec::new();
        for blocked_id in edges.iter().filter(|e| e.blocker_id == ticket_id).map(|e| e.blocked_id) {
            if self.is_resolvable(workflow_id, blocked_id, resolved_columns).await? {
                unblocked.push(blocked_id);
            }
        }

        Ok((ticket, unblocked))
    }

    /// Hybrid keyword + semantic search, blending scores by
    /// `hybrid_search_semantic_weight`. Falls back to keyword-only ranking
    /// when no embedding provider is configured.
    #[instrument(skip(self, query), fields(%workflow_id))]
    pub async fn hybrid_search(&self, workflow_id: Uuid, query: &str, limit: usize) -> DomainResult<Vec<RankedTicket>> {
        let keyword_limit = limit.max(1) * 3;
        let keyword_hits = self.repository.search_keyword(workflow_id, query, keyword_limit).await?;

        let semantic_hits = if let Some(embedding) = &self.embedding {
            match embedding.embed(query).await {
                Ok(query_vector) => self.repository.search_semantic(workflow_id, &query_vector, keyword_limit).await?,
                Err(e) => {
                    warn!(error = %e, "query embedding failed, falling back to keyword-only ticket search");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let semantic_weight = if semantic_hits.is_empty() { 0.0 } else { self.config.hybrid_search_semantic_weight };
        let keyword_weight = 1.0 - semantic_weight;

        let mut scored: std::collections::HashMap<Uuid, RankedTicket> = std::collections::HashMap::new();
        let keyword_count = keyword_hits.len().max(1) as f32;
        for (rank, ticket) in keyword_hits.into_iter().enumerate() {
            let keyword_score = 1.0 - (rank as f32 / keyword_count);
            scored
                .entry(ticket.id)
                .and_modify(|r| r.score += keyword_weight * keyword_score)
                .or_insert_with(|| RankedTicket { ticket, score: keyword_weight * keyword_score });
        }
        for (ticket, similarity) in semantic_hits {
            scored
                .entry(ticket.id)
                .and_modify(|r| r.score += semantic_weight * similarity)
                .or_insert_with(|| RankedTicket { ticket, score: semantic_weight * similarity });
        }

        let mut results: Vec<RankedTicket> = scored.into_values().collect();
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use crate::domain::ports::{EmbeddingInput, EmbeddingOutput};

    #[derive(Default)]
    struct InMemoryTicketRepo {
        tickets: Mutex<HashMap<Uuid, Ticket>>,
        blocks: Mutex<Vec<TicketBlock>>,
        comments: Mutex<Vec<TicketComment>>,
    }

    #[async_trait]
    impl TicketRepository for InMemoryTicketRepo {
        async fn create(&self, ticket: &Ticket) -> DomainResult<()> {
            self.tickets.lock().unwrap().insert(ticket.id, ticket.clone());
            Ok(())
        }
        async fn get(&self, id: Uuid) -> DomainResult<Option<Ticket>> {
            Ok(self.tickets.lock().unwrap().get(&id).cloned())
        }
        async fn update(&self, ticket: &Ticket) -> DomainResult<()> {
            self.tickets.lock().unwrap().insert(ticket.id, ticket.clone());
            Ok(())
        }
        async fn delete(&self, id: Uuid) -> DomainResult<()> {
            self.tickets.lock().unwrap().remove(&id).ok_or(DomainError::TicketNotFound(id))?;
            Ok(())
        }
        async fn list(&self, _filter: TicketFilter) -> DomainResult<Vec<Ticket>> {
            Ok(self.tickets.lock().unwrap().values().cloned().collect())
        }
        async fn list_by_workflow(&self, workflow_id: Uuid) -> DomainResult<Vec<Ticket>> {
            Ok(self.tickets.lock().unwrap().values().filter(|t| t.workflow_id == workflow_id).cloned().collect())
        }
        async fn count_pending_review(&self) -> DomainResult<u64> {
            Ok(self.tickets.lock().unwrap().values().filter(|t| t.approval_status == ApprovalStatus::PendingReview).count() as u64)
        }
        async fn list_pending_review_older_than(&self, _older_than_seconds: i64) -> DomainResult<Vec<Ticket>> {
            Ok(Vec::new())
        }
        async fn search_keyword(&self, workflow_id: Uuid, query: &str, limit: usize) -> DomainResult<Vec<Ticket>> {
            let mut hits: Vec<Ticket> = self
                .tickets
                .lock()
                .unwrap()
                .values()
                .filter(|t| t.workflow_id == workflow_id && (t.title.to_lowercase().contains(&query.to_lowercase()) || t.description.to_lowercase().contains(&query.to_lowercase())))
                .cloned()
                .collect();
            hits.truncate(limit);
            Ok(hits)
        }
        async fn search_semantic(&self, _workflow_id: Uuid, _query_embedding: &[f32], _limit: usize) -> DomainResult<Vec<(Ticket, f32)>> {
            Ok(Vec::new())
        }
        async fn add_block(&self, block: TicketBlock) -> DomainResult<()> {
            self.blocks.lock().unwrap().push(block);
            Ok(())
        }
        async fn remove_block(&self, blocker_id: Uuid, blocked_id: Uuid) -> DomainResult<()> {
            self.blocks.lock().unwrap().retain(|b| !(b.blocker_id == blocker_id && b.blocked_id == blocked_id));
            Ok(())
        }
        async fn get_blocks(&self, _workflow_id: Uuid) -> DomainResult<Vec<TicketBlock>> {
            Ok(self.blocks.lock().unwrap().clone())
        }
        async fn add_comment(&self, comment: &TicketComment) -> DomainResult<()> {
            self.comments.lock().unwrap().push(comment.clone());
            Ok(())
        }
        async fn get_comments(&self, ticket_id: Uuid) -> DomainResult<Vec<TicketComment>> {
            Ok(self.comments.lock().unwrap().iter().filter(|c| c.ticket_id == ticket_id).cloned().collect())
        }
    }

    struct StubEmbedding;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedding {
        fn name(&self) -> &'static str {
            "stub"
        }
        fn dimension(&self) -> usize {
            3
        }
        async fn embed(&self, _text: &str) -> DomainResult<Vec<f32>> {
            Ok(vec![0.1, 0.2, 0.3])
        }
        async fn embed_batch(&self, inputs: &[EmbeddingInput]) -> DomainResult<Vec<EmbeddingOutput>> {
            Ok(inputs.iter().map(|i| EmbeddingOutput { id: i.id.clone(), vector: vec![0.1, 0.2, 0.3] }).collect())
        }
        fn max_batch_size(&self) -> usize {
            1
        }
    }

    fn service() -> (TicketService, Arc<InMemoryTicketRepo>) {
        let repo = Arc::new(InMemoryTicketRepo::default());
        let service = TicketService::new(repo.clone(), Some(Arc::new(StubEmbedding)), TicketServiceConfig::default());
        (service, repo)
    }

    #[tokio::test]
    async fn create_ticket_embeds_when_provider_present() {
        let (service, _repo) = service();
        let ticket = service.create_ticket(Uuid::new_v4(), "Fix login", "users cannot log in", "bug", "backlog", false).await.unwrap();
        assert!(ticket.embedding.is_some());
    }

    #[tokio::test]
    async fn blocking_a_cycle_is_rejected() {
        let (service, _repo) = service();
        let workflow_id = Uuid::new_v4();
        let a = service.create_ticket(workflow_id, "A", "a", "task", "backlog", false).await.unwrap();
        let b = service.create_ticket(workflow_id, "B", "b", "task", "backlog", false).await.unwrap();
        service.add_block(workflow_id, a.id, b.id).await.unwrap();
        let err = service.add_block(workflow_id, b.id, a.id).await.unwrap_err();
        assert_eq!(err.kind(), crate::domain::errors::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn resolve_fails_with_unresolved_blocker() {
        let (service, _repo) = service();
        let workflow_id = Uuid::new_v4();
        let columns = vec!["backlog".to_string(), "resolved".to_string()];
        let blocker = service.create_ticket(workflow_id, "Infra", "set up infra", "task", "backlog", false).await.unwrap();
        let blocked = service.create_ticket(workflow_id, "App", "build app", "task", "backlog", false).await.unwrap();
        service.add_block(workflow_id, blocker.id, blocked.id).await.unwrap();

        let err = service.resolve(workflow_id, blocked.id, "done", "resolved", &columns).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));

        let (_, unblocked) = service.resolve(workflow_id, blocker.id, "infra up", "resolved", &columns).await.unwrap();
        assert_eq!(unblocked, vec![blocked.id]);
        service.resolve(workflow_id, blocked.id, "done", "resolved", &columns).await.unwrap();
    }

    #[tokio::test]
    async fn change_status_rejects_unknown_column() {
        let (service, _repo) = service();
        let ticket = service.create_ticket(Uuid::new_v4(), "A", "a", "task", "backlog", false).await.unwrap();
        let columns = vec!["backlog".to_string()];
        let err = service.change_status(ticket.id, "archived", &columns, None).await.unwrap_err();
        assert!(matches!(err, DomainError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn hybrid_search_finds_keyword_match() {
        let (service, _repo) = service();
        let workflow_id = Uuid::new_v4();
        service.create_ticket(workflow_id, "Fix login bug", "users cannot log in", "bug", "backlog", false).await.unwrap();
        let results = service.hybrid_search(workflow_id, "login", 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
