//! Ticket domain model.
//!
//! A ticket is a persistent kanban-style work item coordinating multiple
//! tasks across phases, with a blocking DAG and an optional human-approval
//! gate on creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Approval state for workflows configured with `ticket_human_review=true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    NotRequired,
    PendingReview,
    Approved,
    Rejected,
}

/// A persistent work item. `status` is a free-form string validated against
/// the owning workflow's `BoardConfig::columns` at the service layer, since
/// the column set is workflow-defined rather than fixed here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub title: String,
    pub description: String,
    pub ticket_type: String,
    pub status: String,
    pub priority: i32,
    pub created_by_agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolution_comment: Option<String>,
    pub approval_status: ApprovalStatus,
    /// Unit-norm embedding of `title + description`, used by hybrid search.
    pub embedding: Option<Vec<f32>>,
}

impl Ticket {
    pub fn new(workflow_id: Uuid, title: impl Into<String>, description: impl Into<String>, initial_status: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            title: title.into(),
            description: description.into(),
            ticket_type: "generic".to_string(),
            status: initial_status.into(),
            priority: 0,
            created_by_agent_id: None,
            created_at: now,
            updated_at: now,
            resolution_comment: None,
            approval_status: ApprovalStatus::NotRequired,
            embedding: None,
        }
    }

    pub fn with_ticket_type(mut self, ticket_type: impl Into<String>) -> Self {
        self.ticket_type = ticket_type.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn requiring_approval(mut self) -> Self {
        self.approval_status = ApprovalStatus::PendingReview;
        self
    }

    pub fn approve(&mut self) {
        self.approval_status = ApprovalStatus::Approved;
        self.updated_at = Utc::now();
    }

    pub fn reject(&mut self) {
        self.approval_status = ApprovalStatus::Rejected;
        self.updated_at = Utc::now();
    }

    pub fn change_status(&mut self, new_status: impl Into<String>, comment: Option<String>) {
        self.status = new_status.into();
        if let Some(comment) = comment {
            self.resolution_comment = Some(comment);
        }
        self.updated_at = Utc::now();
    }

    pub fn resolve(&mut self, resolution_comment: impl Into<String>, resolved_status: impl Into<String>) {
        self.status = resolved_status.into();
        self.resolution_comment = Some(resolution_comment.into());
        self.updated_at = Utc::now();
    }
}

/// A directed blocking edge: `blocker_id` must resolve before `blocked_id` can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketBlock {
    pub blocker_id: Uuid,
    pub blocked_id: Uuid,
}

impl TicketBlock {
    pub fn new(blocker_id: Uuid, blocked_id: Uuid) -> Self {
        Self { blocker_id, blocked_id }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketComment {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_agent_id: Option<Uuid>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl TicketComment {
    pub fn new(ticket_id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            author_agent_id: None,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_author(mut self, author_agent_id: Uuid) -> Self {
        self.author_agent_id = Some(author_agent_id);
        self
    }
}

/// Detects whether adding `blocker -> blocked` would create a cycle in the
/// existing edge set. Used by the ticket engine before inserting an edge.
pub fn would_create_cycle(edges: &[TicketBlock], blocker: Uuid, blocked: Uuid) -> bool {
    if blocker == blocked {
        return true;
    }
    // A new edge blocker->blocked creates a cycle iff `blocked` can already
    // reach `blocker` via existing edges (adding it would close the loop).
    let mut stack = vec![blocked];
    let mut seen = std::collections::HashSet::new();
    while let Some(node) = stack.pop() {
        if node == blocker {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        for edge in edges {
            if edge.blocker_id == node {
                stack.push(edge.blocked_id);
            }
        }
    }
    false
}

/// True iff every edge `other -> ticket_id` has its blocker already resolved.
/// `is_resolved` reports whether a given ticket id is currently resolved.
pub fn all_blockers_resolved(edges: &[TicketBlock], ticket_id: Uuid, is_resolved: impl Fn(Uuid) -> bool) -> bool {
    edges
        .iter()
        .filter(|e| e.blocked_id == ticket_id)
        .all(|e| is_resolved(e.blocker_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_cycle_detected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let edges = vec![TicketBlock::new(a, b)];
        assert!(would_create_cycle(&edges, b, a));
    }

    #[test]
    fn transitive_cycle_detected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let edges = vec![TicketBlock::new(a, b), TicketBlock::new(b, c)];
        assert!(would_create_cycle(&edges, c, a));
    }

    #[test]
    fn non_cyclic_edge_is_allowed() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let edges = vec![TicketBlock::new(a, b)];
        assert!(!would_create_cycle(&edges, a, c));
    }

    #[test]
    fn resolution_gate_requires_all_blockers_resolved() {
        let infra = Uuid::new_v4();
        let auth = Uuid::new_v4();
        let edges = vec![TicketBlock::new(infra, auth)];
        assert!(!all_blockers_resolved(&edges, auth, |id| id != infra));
        assert!(all_blockers_resolved(&edges, auth, |_| true));
    }

    #[test]
    fn ticket_without_blockers_is_resolvable() {
        let edges: Vec<TicketBlock> = vec![];
        assert!(all_blockers_resolved(&edges, Uuid::new_v4(), |_| false));
    }
}
