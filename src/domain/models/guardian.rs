//! Guardian domain model.
//!
//! The Guardian is the per-agent trajectory judge: every monitoring tick it
//! reads an eligible working agent's recent history and either clears it or
//! injects a steering message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a steering intervention was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SteeringType {
    Stuck,
    Drifting,
    ViolatingConstraints,
    Idle,
    MissedSteps,
    WrongDirection,
    None,
}

impl SteeringType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stuck => "stuck",
            Self::Drifting => "drifting",
            Self::ViolatingConstraints => "violating_constraints",
            Self::Idle => "idle",
            Self::MissedSteps => "missed_steps",
            Self::WrongDirection => "wrong_direction",
            Self::None => "none",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "stuck" => Some(Self::Stuck),
            "drifting" => Some(Self::Drifting),
            "violating_constraints" => Some(Self::ViolatingConstraints),
            "idle" => Some(Self::Idle),
            "missed_steps" => Some(Self::MissedSteps),
            "wrong_direction" => Some(Self::WrongDirection),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

/// One Guardian judgement of a single agent's trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardianAnalysis {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub current_phase: String,
    pub alignment_score: f32,
    pub trajectory_aligned: bool,
    pub trajectory_summary: String,
    pub needs_steering: bool,
    pub steering_type: Option<SteeringType>,
    pub steering_message: Option<String>,
    pub details: serde_json::Value,
}

impl GuardianAnalysis {
    pub fn new(agent_id: Uuid, current_phase: impl Into<String>, alignment_score: f32, trajectory_summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            timestamp: Utc::now(),
            current_phase: current_phase.into(),
            alignment_score: alignment_score.clamp(0.0, 1.0),
            trajectory_aligned: alignment_score >= 0.5,
            trajectory_summary: trajectory_summary.into(),
            needs_steering: false,
            steering_type: None,
            steering_message: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_steering(mut self, steering_type: SteeringType, message: impl Into<String>) -> Self {
        self.needs_steering = true;
        self.steering_type = Some(steering_type);
        self.steering_message = Some(message.into());
        self
    }
}

/// A steering message injected into an agent's session, and whether it
/// measurably improved the next cycle's alignment score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteeringIntervention {
    pub id: Uuid,
    pub agent_id: Uuid,
    pub guardian_analysis_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub steering_type: SteeringType,
    pub message: String,
    pub was_successful: Option<bool>,
}

impl SteeringIntervention {
    pub fn new(agent_id: Uuid, guardian_analysis_id: Uuid, steering_type: SteeringType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            guardian_analysis_id,
            timestamp: Utc::now(),
            steering_type,
            message: message.into(),
            was_successful: None,
        }
    }

    /// Judge success by comparing the score at the time of this intervention
    /// against the following cycle's score.
    pub fn record_outcome(&mut self, prior_score: f32, next_score: f32) {
        self.was_successful = Some(next_score > prior_score);
    }
}

/// Textual extraction over an agent's accumulated log history, used to build
/// the Guardian's context before the LLM call.
#[derive(Debug, Clone, Default)]
pub struct AgentContextSummary {
    pub persistent_constraints: Vec<String>,
    pub lifted_constraints: Vec<String>,
    pub standing_instructions: Vec<String>,
    pub current_focus: Option<String>,
    pub recurring_blockers: Vec<String>,
}

impl AgentContextSummary {
    /// Scan scrollback/log lines for the textual markers the spec calls out:
    /// "must"/"cannot"/"never" for persistent constraints, "you may now"/"no
    /// longer need to" for lifted ones, "always"/"remember" for standing
    /// instructions.
    pub fn extract(lines: &[String]) -> Self {
        let mut summary = Self::default();
        for line in lines {
            let lower = line.to_lowercase();
            if lower.contains("must") || lower.contains("cannot") || lower.contains("never") {
                summary.persistent_constraints.push(line.clone());
            }
            if lower.contains("you may now") || lower.contains("no longer need to") {
                summary.lifted_constraints.push(line.clone());
            }
            if lower.contains("always") || lower.contains("remember") {
                summary.standing_instructions.push(line.clone());
            }
        }
        if let Some(last) = lines.last() {
            summary.current_focus = Some(last.clone());
        }
        summary
    }

    /// True if the same line recurs at least `threshold` times, the
    /// "repeated identical error" steering trigger.
    pub fn has_repeated_line(lines: &[String], threshold: usize) -> bool {
        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for line in lines {
            *counts.entry(line.as_str()).or_insert(0) += 1;
        }
        counts.values().any(|&count| count >= threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_score_is_clamped() {
        let analysis = GuardianAnalysis::new(Uuid::new_v4(), "build", 1.5, "looks fine");
        assert_eq!(analysis.alignment_score, 1.0);
    }

    #[test]
    fn with_steering_sets_needs_steering() {
        let analysis = GuardianAnalysis::new(Uuid::new_v4(), "build", 0.2, "stuck")
            .with_steering(SteeringType::Stuck, "try a different approach");
        assert!(analysis.needs_steering);
        assert_eq!(analysis.steering_type, Some(SteeringType::Stuck));
    }

    #[test]
    fn extracts_persistent_constraints() {
        let lines = vec!["You must never delete the migrations directory".to_string()];
        let summary = AgentContextSummary::extract(&lines);
        assert_eq!(summary.persistent_constraints.len(), 1);
    }

    #[test]
    fn detects_repeated_error_line() {
        let lines = vec!["error: x".to_string(); 5];
        assert!(AgentContextSummary::has_repeated_line(&lines, 5));
        assert!(!AgentContextSummary::has_repeated_line(&lines, 6));
    }

    #[test]
    fn steering_success_compares_scores() {
        let mut intervention = SteeringIntervention::new(Uuid::new_v4(), Uuid::new_v4(), SteeringType::Stuck, "nudge");
        intervention.record_outcome(0.3, 0.6);
        assert_eq!(intervention.was_successful, Some(true));
    }
}
