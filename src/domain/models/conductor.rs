//! Conductor domain model.
//!
//! The Conductor is the system-wide coherence and duplicate-detection judge:
//! it runs once per monitoring tick over the batch of agents that just
//! received a fresh Guardian analysis.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::AgentType;

/// A pair of agents the Conductor judged to be doing duplicate work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub agent_a: Uuid,
    pub agent_b: Uuid,
    pub similarity: f32,
    pub work_description: String,
}

/// A recommendation to terminate a specific agent, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationRecommendation {
    pub agent_id: Uuid,
    pub reason: String,
}

/// One system-wide coherence judgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConductorAnalysis {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub coherence_score: f32,
    pub num_agents: usize,
    pub system_status: String,
    pub recommendations: Option<String>,
    pub detected_duplicates: Vec<DuplicatePair>,
    pub termination_recommendations: Vec<TerminationRecommendation>,
}

impl ConductorAnalysis {
    pub fn new(coherence_score: f32, num_agents: usize, system_status: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            coherence_score: coherence_score.clamp(0.0, 1.0),
            num_agents,
            system_status: system_status.into(),
            recommendations: None,
            detected_duplicates: Vec::new(),
            termination_recommendations: Vec::new(),
        }
    }
}

/// Metadata about a single agent needed to decide which half of a duplicate
/// pair to keep: earlier `created_at`, later phase, higher alignment score,
/// in that preference order.
#[derive(Debug, Clone, Copy)]
pub struct AgentRanking {
    pub agent_id: Uuid,
    pub agent_type: AgentType,
    pub created_at: DateTime<Utc>,
    pub phase_sequence: u32,
    pub last_alignment_score: f32,
}

/// Drops any duplicate pair where either side is a validator-type agent
/// (testable property 7), and for the rest returns the id that should be
/// terminated (the "less-advanced" agent).
pub fn resolve_duplicate_terminations(pairs: &[DuplicatePair], rankings: &[AgentRanking], min_similarity: f32) -> Vec<Uuid> {
    let lookup = |id: Uuid| rankings.iter().find(|r| r.agent_id == id);
    let mut to_terminate = Vec::new();
    for pair in pairs {
        if pair.similarity < min_similarity {
            continue;
        }
        let (Some(a), Some(b)) = (lookup(pair.agent_a), lookup(pair.agent_b)) else {
            continue;
        };
        if a.agent_type.is_validator() || b.agent_type.is_validator() {
            continue;
        }
        to_terminate.push(less_advanced(a, b));
    }
    to_terminate
}

fn less_advanced(a: &AgentRanking, b: &AgentRanking) -> Uuid {
    if a.created_at != b.created_at {
        return if a.created_at > b.created_at { a.agent_id } else { b.agent_id };
    }
    if a.phase_sequence != b.phase_sequence {
        return if a.phase_sequence < b.phase_sequence { a.agent_id } else { b.agent_id };
    }
    if a.last_alignment_score <= b.last_alignment_score {
        a.agent_id
    } else {
        b.agent_id
    }
}
