//! Workflow and phase domain models.
//!
//! A workflow is the top-level unit of orchestration: one active goal, its
//! ordered phases, and the board configuration its tickets use. Phases are
//! immutable once the workflow starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happens once a validated `WorkflowResult` exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnResultFound {
    /// Terminate every live agent and fail every non-terminal task.
    StopAll,
    /// Log the validation and keep running; more results may be submitted.
    DoNothing,
}

impl Default for OnResultFound {
    fn default() -> Self {
        Self::DoNothing
    }
}

/// Ticket board configuration: the status column set and whether new
/// tickets require human sign-off before they're usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Ordered list of valid ticket statuses for this workflow.
    pub columns: Vec<String>,
    pub ticket_human_review: bool,
    pub approval_timeout_seconds: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            columns: vec![
                "backlog".to_string(),
                "in_progress".to_string(),
                "resolved".to_string(),
            ],
            ticket_human_review: false,
            approval_timeout_seconds: 1800,
        }
    }
}

impl BoardConfig {
    pub fn has_column(&self, status: &str) -> bool {
        self.columns.iter().any(|c| c == status)
    }
}

/// The single active goal an orchestrator instance is pursuing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub goal_text: String,
    pub result_required: bool,
    pub result_criteria: String,
    pub on_result_found: OnResultFound,
    pub board_config: BoardConfig,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, goal_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            goal_text: goal_text.into(),
            result_required: false,
            result_criteria: String::new(),
            on_result_found: OnResultFound::DoNothing,
            board_config: BoardConfig::default(),
            created_at: Utc::now(),
        }
    }

    pub fn with_result_required(mut self, criteria: impl Into<String>) -> Self {
        self.result_required = true;
        self.result_criteria = criteria.into();
        self
    }

    pub fn with_on_result_found(mut self, policy: OnResultFound) -> Self {
        self.on_result_found = policy;
        self
    }

    pub fn with_board_config(mut self, board_config: BoardConfig) -> Self {
        self.board_config = board_config;
        self
    }

    pub fn stops_all_on_result(&self) -> bool {
        matches!(self.on_result_found, OnResultFound::StopAll)
    }
}

/// Optional per-phase validation configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseValidation {
    pub enabled: bool,
    pub criteria: Vec<String>,
    pub validator_instructions: String,
}

/// A named stage providing system-prompt guidance and done-definitions to
/// agents. Phases are small monotonic integers per workflow and immutable
/// once the workflow has started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Monotonic per-workflow sequence number (1, 2, 3, ...).
    pub sequence: u32,
    pub name: String,
    pub description: String,
    pub done_definitions: Vec<String>,
    pub additional_notes: String,
    pub validation: PhaseValidation,
}

impl Phase {
    pub fn new(workflow_id: Uuid, sequence: u32, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            sequence,
            name: name.into(),
            description: description.into(),
            done_definitions: Vec::new(),
            additional_notes: String::new(),
            validation: PhaseValidation::default(),
        }
    }

    pub fn with_done_definitions(mut self, defs: Vec<String>) -> Self {
        self.done_definitions = defs;
        self
    }

    pub fn with_additional_notes(mut self, notes: impl Into<String>) -> Self {
        self.additional_notes = notes.into();
        self
    }

    pub fn with_validation(mut self, validation: PhaseValidation) -> Self {
        self.validation = validation;
        self
    }

    /// Renders the part of the agent's initial prompt this phase owns.
    pub fn prompt_snippet(&self) -> String {
        let mut out = format!("Phase {}: {}\n{}\n", self.sequence, self.name, self.description);
        if !self.done_definitions.is_empty() {
            out.push_str("Done when:\n");
            for def in &self.done_definitions {
                out.push_str(&format!("- {def}\n"));
            }
        }
        if !self.additional_notes.is_empty() {
            out.push_str(&format!("Notes: {}\n", self.additional_notes));
        }
        out
    }
}
