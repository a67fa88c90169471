//! Task domain model.
//!
//! A task is a unit of work always in exactly one state of the queue/task
//! engine's state machine, optionally tied to a ticket and/or a phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use super::agent::AgentType;

/// Task priority as declared by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Med,
    High,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Med
    }
}

impl TaskPriority {
    /// Higher is more urgent, for the `priority desc` queue ordering term.
    pub const fn rank(&self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Med => 1,
            Self::High => 2,
        }
    }
}

/// Task lifecycle status. See `can_transition_to` for the legal edge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Queued,
    Assigned,
    InProgress,
    UnderReview,
    ValidationInProgress,
    NeedsWork,
    Done,
    Failed,
    Duplicated,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Queued => "queued",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::UnderReview => "under_review",
            Self::ValidationInProgress => "validation_in_progress",
            Self::NeedsWork => "needs_work",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Duplicated => "duplicated",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "queued" => Some(Self::Queued),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "under_review" => Some(Self::UnderReview),
            "validation_in_progress" => Some(Self::ValidationInProgress),
            "needs_work" => Some(Self::NeedsWork),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "duplicated" => Some(Self::Duplicated),
            _ => None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// The legal edge set of the task state machine.
    pub fn can_transition_to(&self, to: Self) -> bool {
        use TaskStatus::*;
        matches!(
            (self, to),
            (Pending, Assigned)
                | (Pending, Queued)
                | (Pending, Duplicated)
                | (Queued, Assigned)
                | (Queued, Failed)
                | (Assigned, InProgress)
                | (InProgress, UnderReview)
                | (InProgress, Done)
                | (InProgress, Failed)
                | (UnderReview, ValidationInProgress)
                | (ValidationInProgress, Done)
                | (ValidationInProgress, NeedsWork)
                | (NeedsWork, InProgress)
                | (Done, Pending)
                | (Failed, Pending)
        )
    }
}

/// A unit of work in the queue + task engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub phase_id: Option<Uuid>,
    pub ticket_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub created_by_agent_id: Option<Uuid>,
    pub agent_type: AgentType,

    pub description: String,
    pub done_definition: String,
    pub priority: TaskPriority,
    /// Unit-norm embedding of `description`, present only when dedup is enabled.
    pub description_embedding: Option<Vec<f32>>,

    pub status: TaskStatus,
    pub failure_reason: Option<String>,
    pub completion_notes: Option<String>,
    pub duplicate_of_task_id: Option<Uuid>,
    pub similarity_score: Option<f32>,

    pub queued_at: Option<DateTime<Utc>>,
    pub queue_position: Option<i64>,
    pub priority_boosted: bool,

    pub validation_enabled: bool,
    pub validation_iteration: u32,
    pub last_validation_feedback: Option<String>,
    pub review_done: bool,

    pub assigned_agent_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new(workflow_id: Uuid, description: impl Into<String>, done_definition: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            phase_id: None,
            ticket_id: None,
            parent_task_id: None,
            created_by_agent_id: None,
            agent_type: AgentType::Phase,
            description: description.into(),
            done_definition: done_definition.into(),
            priority: TaskPriority::Med,
            description_embedding: None,
            status: TaskStatus::Pending,
            failure_reason: None,
            completion_notes: None,
            duplicate_of_task_id: None,
            similarity_score: None,
            queued_at: None,
            queue_position: None,
            priority_boosted: false,
            validation_enabled: false,
            validation_iteration: 0,
            last_validation_feedback: None,
            review_done: false,
            assigned_agent_id: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_phase(mut self, phase_id: Uuid) -> Self {
        self.phase_id = Some(phase_id);
        self
    }

    pub fn with_ticket(mut self, ticket_id: Uuid) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = agent_type;
        self
    }

    pub fn with_validation_enabled(mut self, enabled: bool) -> Self {
        self.validation_enabled = enabled;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.description_embedding = Some(embedding);
        self
    }

    /// Attempt a guarded transition; validates against `can_transition_to`
    /// and enforces that only the assigned agent may drive the task (other
    /// than system-driven transitions, for which `acting_agent_id` is `None`).
    pub fn transition_to(&mut self, to: TaskStatus, acting_agent_id: Option<Uuid>) -> Result<(), String> {
        if let Some(agent_id) = acting_agent_id {
            if self.assigned_agent_id != Some(agent_id) {
                return Err(format!(
                    "agent {agent_id} is not authorised to transition task {}",
                    self.id
                ));
            }
        }
        if !self.status.can_transition_to(to) {
            return Err(format!(
                "illegal transition from {} to {}",
                self.status.as_str(),
                to.as_str()
            ));
        }
        self.apply_transition_side_effects(to);
        self.status = to;
        Ok(())
    }

    fn apply_transition_side_effects(&mut self, to: TaskStatus) {
        use TaskStatus::*;
        match to {
            Assigned => {
                self.queued_at = None;
                self.queue_position = None;
            }
            Queued => {
                self.queued_at = Some(Utc::now());
            }
            InProgress => {
                if self.started_at.is_none() {
                    self.started_at = Some(Utc::now());
                }
            }
            Done | Failed => {
                self.completed_at = Some(Utc::now());
            }
            Pending if self.status.is_terminal() => {
                self.failure_reason = None;
                self.completion_notes = None;
                self.completed_at = None;
                self.started_at = None;
                self.assigned_agent_id = None;
                self.validation_iteration = 0;
                self.review_done = false;
            }
            ValidationInProgress => {
                self.review_done = true;
            }
            NeedsWork => {
                self.validation_iteration += 1;
            }
            _ => {}
        }
    }

    pub fn mark_duplicate_of(&mut self, original: Uuid, similarity: f32) {
        self.status = TaskStatus::Duplicated;
        self.duplicate_of_task_id = Some(original);
        self.similarity_score = Some(similarity);
    }

    pub fn is_queued(&self) -> bool {
        self.status == TaskStatus::Queued
    }

    /// Extracts the UUID from a literal `TICKET: <ticket_id>` substring in
    /// `description`, per the ticket-linkage requirement.
    pub fn extract_ticket_reference(&self) -> Option<Uuid> {
        let marker = "TICKET: ";
        let idx = self.description.find(marker)?;
        let rest = &self.description[idx + marker.len()..];
        let token: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
        Uuid::parse_str(&token).ok()
    }
}
