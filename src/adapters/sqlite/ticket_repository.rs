//! SQLite implementation of the TicketRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApprovalStatus, Ticket, TicketBlock, TicketComment};
use crate::domain::ports::{TicketFilter, TicketRepository};

use super::{parse_datetime, parse_optional_datetime, parse_optional_uuid, parse_uuid};

#[derive(Clone)]
pub struct SqliteTicketRepository {
    pool: SqlitePool,
}

impl SqliteTicketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn approval_status_str(s: ApprovalStatus) -> &'static str {
    match s {
        ApprovalStatus::NotRequired => "not_required",
        ApprovalStatus::PendingReview => "pending_review",
        ApprovalStatus::Approved => "approved",
        ApprovalStatus::Rejected => "rejected",
    }
}

fn parse_approval_status(s: &str) -> ApprovalStatus {
    match s {
        "pending_review" => ApprovalStatus::PendingReview,
        "approved" => ApprovalStatus::Approved,
        "rejected" => ApprovalStatus::Rejected,
        _ => ApprovalStatus::NotRequired,
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: String,
    workflow_id: String,
    title: String,
    description: String,
    ticket_type: String,
    status: String,
    priority: i32,
    created_by_agent_id: Option<String>,
    created_at: String,
    updated_at: String,
    resolution_comment: Option<String>,
    approval_status: String,
    embedding: Option<String>,
}

impl TicketRow {
    fn into_domain(self) -> DomainResult<Ticket> {
        Ok(Ticket {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            title: self.title,
            description: self.description,
            ticket_type: self.ticket_type,
            status: self.status,
            priority: self.priority,
            created_by_agent_id: parse_optional_uuid(self.created_by_agent_id)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            resolution_comment: self.resolution_comment,
            approval_status: parse_approval_status(&self.approval_status),
            embedding: self
                .embedding
                .map(|e| serde_json::from_str(&e))
                .transpose()?,
        })
    }
}

#[async_trait]
impl TicketRepository for SqliteTicketRepository {
    async fn create(&self, ticket: &Ticket) -> DomainResult<()> {
        let embedding_json = ticket
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"INSERT INTO tickets (id, workflow_id, ticket_type, title, description, status,
               priority, approval_status, created_by_agent_id, embedding, created_at,
               updated_at, resolution_comment)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(ticket.id.to_string())
        .bind(ticket.workflow_id.to_string())
        .bind(&ticket.ticket_type)
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(&ticket.status)
        .bind(ticket.priority)
        .bind(approval_status_str(ticket.approval_status))
        .bind(ticket.created_by_agent_id.map(|id| id.to_string()))
        .bind(&embedding_json)
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.updated_at.to_rfc3339())
        .bind(&ticket.resolution_comment)
        .execute(&self.pool)
        .await?;

        sqlx::query("INSERT INTO tickets_fts (ticket_id, title, description) VALUES (?, ?, ?)")
            .bind(ticket.id.to_string())
            .bind(&ticket.title)
            .bind(&ticket.description)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as("SELECT * FROM tickets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TicketRow::into_domain).transpose()
    }

    async fn update(&self, ticket: &Ticket) -> DomainResult<()> {
        let embedding_json = ticket
            .embedding
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"UPDATE tickets SET title = ?, description = ?, status = ?, priority = ?,
               approval_status = ?, embedding = ?, updated_at = ?, resolution_comment = ?
               WHERE id = ?"#,
        )
        .bind(&ticket.title)
        .bind(&ticket.description)
        .bind(&ticket.status)
        .bind(ticket.priority)
        .bind(approval_status_str(ticket.approval_status))
        .bind(&embedding_json)
        .bind(ticket.updated_at.to_rfc3339())
        .bind(&ticket.resolution_comment)
        .bind(ticket.id.to_string())
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE tickets_fts SET title = ?, description = ? WHERE ticket_id = ?")
            .bind(&ticket.title)
            .bind(&ticket.description)
            .bind(ticket.id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM tickets_fts WHERE ticket_id = ?").bind(id.to_string()).execute(&self.pool).await?;

        let result = sqlx::query("DELETE FROM tickets WHERE id = ?").bind(id.to_string()).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::TicketNotFound(id));
        }

        Ok(())
    }

    async fn list(&self, filter: TicketFilter) -> DomainResult<Vec<Ticket>> {
        let mut sql = String::from("SELECT * FROM tickets WHERE 1=1");
        if filter.workflow_id.is_some() {
            sql.push_str(" AND workflow_id = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.ticket_type.is_some() {
            sql.push_str(" AND ticket_type = ?");
        }
        if filter.approval_status.is_some() {
            sql.push_str(" AND approval_status = ?");
        }
        sql.push_str(" ORDER BY created_at");

        let mut query = sqlx::query_as::<_, TicketRow>(&sql);
        if let Some(workflow_id) = filter.workflow_id {
            query = query.bind(workflow_id.to_string());
        }
        if let Some(status) = &filter.status {
            query = query.bind(status.clone());
        }
        if let Some(ticket_type) = &filter.ticket_type {
            query = query.bind(ticket_type.clone());
        }
        if let Some(approval_status) = filter.approval_status {
            query = query.bind(approval_status_str(approval_status));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TicketRow::into_domain).collect()
    }

    async fn list_by_workflow(&self, workflow_id: Uuid) -> DomainResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> =
            sqlx::query_as("SELECT * FROM tickets WHERE workflow_id = ? ORDER BY created_at")
                .bind(workflow_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TicketRow::into_domain).collect()
    }

    async fn count_pending_review(&self) -> DomainResult<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE approval_status = 'pending_review'")
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0 as u64)
    }

    async fn list_pending_review_older_than(&self, older_than_seconds: i64) -> DomainResult<Vec<Ticket>> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::seconds(older_than_seconds)).to_rfc3339();
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT * FROM tickets WHERE approval_status = 'pending_review' AND updated_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TicketRow::into_domain).collect()
    }

    async fn search_keyword(&self, workflow_id: Uuid, query: &str, limit: usize) -> DomainResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            r#"SELECT t.* FROM tickets t
               JOIN tickets_fts f ON f.ticket_id = t.id
               WHERE t.workflow_id = ? AND tickets_fts MATCH ?
               ORDER BY rank LIMIT ?"#,
        )
        .bind(workflow_id.to_string())
        .bind(query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TicketRow::into_domain).collect()
    }

    async fn search_semantic(
        &self,
        workflow_id: Uuid,
        query_embedding: &[f32],
        limit: usize,
    ) -> DomainResult<Vec<(Ticket, f32)>> {
        let rows: Vec<TicketRow> =
            sqlx::query_as("SELECT * FROM tickets WHERE workflow_id = ? AND embedding IS NOT NULL")
                .bind(workflow_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        let mut scored: Vec<(Ticket, f32)> = Vec::with_capacity(rows.len());
        for row in rows {
            let ticket = row.into_domain()?;
            if let Some(embedding) = &ticket.embedding {
                let similarity = cosine_similarity(embedding, query_embedding);
                scored.push((ticket, similarity));
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn add_block(&self, block: TicketBlock) -> DomainResult<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO ticket_blocks (blocker_id, blocked_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(block.blocker_id.to_string())
        .bind(block.blocked_id.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_block(&self, blocker_id: Uuid, blocked_id: Uuid) -> DomainResult<()> {
        sqlx::query("DELETE FROM ticket_blocks WHERE blocker_id = ? AND blocked_id = ?")
            .bind(blocker_id.to_string())
            .bind(blocked_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_blocks(&self, workflow_id: Uuid) -> DomainResult<Vec<TicketBlock>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"SELECT b.blocker_id, b.blocked_id FROM ticket_blocks b
               JOIN tickets t ON t.id = b.blocker_id
               WHERE t.workflow_id = ?"#,
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(blocker_id, blocked_id)| {
                Ok(TicketBlock {
                    blocker_id: parse_uuid(&blocker_id)?,
                    blocked_id: parse_uuid(&blocked_id)?,
                })
            })
            .collect()
    }

    async fn add_comment(&self, comment: &TicketComment) -> DomainResult<()> {
        sqlx::query(
            "INSERT INTO ticket_comments (id, ticket_id, author_agent_id, text, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(comment.id.to_string())
        .bind(comment.ticket_id.to_string())
        .bind(comment.author_agent_id.map(|id| id.to_string()))
        .bind(&comment.text)
        .bind(comment.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_comments(&self, ticket_id: Uuid) -> DomainResult<Vec<TicketComment>> {
        let rows: Vec<(String, String, Option<String>, String, String)> = sqlx::query_as(
            "SELECT id, ticket_id, author_agent_id, text, created_at FROM ticket_comments WHERE ticket_id = ? ORDER BY created_at",
        )
        .bind(ticket_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, ticket_id, author_agent_id, text, created_at)| {
                Ok(TicketComment {
                    id: parse_uuid(&id)?,
                    ticket_id: parse_uuid(&ticket_id)?,
                    author_agent_id: parse_optional_uuid(author_agent_id)?,
                    text,
                    created_at: parse_datetime(&created_at)?,
                })
            })
            .collect()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::Workflow;
    use crate::domain::ports::WorkflowRepository;

    async fn seed_workflow(pool: &SqlitePool) -> Uuid {
        let repo = crate::adapters::sqlite::SqliteWorkflowRepository::new(pool.clone());
        let workflow = Workflow::new("w", "goal");
        let id = workflow.id;
        repo.create(&workflow).await.unwrap();
        id
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let pool = create_migrated_test_pool().await.unwrap();
        let workflow_id = seed_workflow(&pool).await;
        let repo = SqliteTicketRepository::new(pool);

        let ticket = Ticket::new(workflow_id, "title", "description", "feature");
        repo.create(&ticket).await.unwrap();

        let fetched = repo.get(ticket.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "title");
        assert_eq!(fetched.workflow_id, workflow_id);
    }

    #[tokio::test]
    async fn block_graph_round_trips() {
        let pool = create_migrated_test_pool().await.unwrap();
        let workflow_id = seed_workflow(&pool).await;
        let repo = SqliteTicketRepository::new(pool);

        let a = Ticket::new(workflow_id, "a", "desc", "feature");
        let b = Ticket::new(workflow_id, "b", "desc", "feature");
        repo.create(&a).await.unwrap();
        repo.create(&b).await.unwrap();

        repo.add_block(TicketBlock { blocker_id: a.id, blocked_id: b.id }).await.unwrap();
        let blocks = repo.get_blocks(workflow_id).await.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].blocker_id, a.id);

        repo.remove_block(a.id, b.id).await.unwrap();
        let blocks = repo.get_blocks(workflow_id).await.unwrap();
        assert!(blocks.is_empty());
    }
}
