//! Prompt template registry.
//!
//! Templates are plain strings with `{{name}}` placeholders, substituted
//! from the top-level keys of `CompletionRequest::variables`. Nested values
//! (arrays, objects) are substituted as their compact JSON rendering.

use serde_json::Value;

use crate::domain::errors::{DomainError, DomainResult};

/// Guardian per-agent trajectory review (C9).
pub const GUARDIAN_TRAJECTORY_REVIEW: &str = "guardian_trajectory_review";
/// Conductor system-wide coherence review (C10).
pub const CONDUCTOR_COHERENCE_REVIEW: &str = "conductor_coherence_review";
/// Diagnostic "workflow doctor" review on full stall (C11).
pub const DIAGNOSTIC_WORKFLOW_REVIEW: &str = "diagnostic_workflow_review";
/// Task-level result validation (C12).
pub const TASK_RESULT_VALIDATION: &str = "task_result_validation";
/// Workflow-level result validation (C12).
pub const WORKFLOW_RESULT_VALIDATION: &str = "workflow_result_validation";
/// Free-form task description enrichment before queueing.
pub const TASK_ENRICHMENT: &str = "task_enrichment";

fn body(template_name: &str) -> Option<&'static str> {
    match template_name {
        GUARDIAN_TRAJECTORY_REVIEW => Some(
            "You are reviewing the trajectory of a single coding agent to decide whether it \
             needs steering.\n\nAgent task: {{task_description}}\nDone definition: {{done_definition}}\n\n\
             Recent session scrollback:\n{{scrollback}}\n\nPrior trajectory summaries (oldest first):\n{{history}}\n\n\
             Decide: is this agent on track, drifting, or stuck? If steering is required, say what to tell it. \
             Respond with JSON matching the given schema only.",
        ),
        CONDUCTOR_COHERENCE_REVIEW => Some(
            "You are reviewing the full set of active agents in a workflow for system-wide coherence: \
             duplicated effort, conflicting changes, or agents that should be stopped in favor of a \
             more-advanced peer.\n\nWorkflow goal: {{workflow_goal}}\n\nActive agents:\n{{agents}}\n\n\
             Recent task history:\n{{task_history}}\n\n\
             Respond with JSON matching the given schema only.",
        ),
        DIAGNOSTIC_WORKFLOW_REVIEW => Some(
            "The workflow below has fully stalled: no agent is active and no task is queued. \
             Diagnose why and propose concrete follow-up tasks to unstick it.\n\n\
             Workflow goal: {{workflow_goal}}\n\nRecent agent history:\n{{agent_history}}\n\n\
             Recent task history:\n{{task_history}}\n\n\
             Respond with JSON matching the given schema only.",
        ),
        TASK_RESULT_VALIDATION => Some(
            "Validate whether the task below satisfies its done definition and declared criteria.\n\n\
             Task description: {{task_description}}\nDone definition: {{done_definition}}\n\
             Validator criteria: {{criteria}}\n\nAgent's worktree diff / completion notes:\n{{evidence}}\n\n\
             Respond with JSON matching the given schema only.",
        ),
        WORKFLOW_RESULT_VALIDATION => Some(
            "Validate whether the submitted result satisfies the workflow's declared result criteria.\n\n\
             Workflow goal: {{workflow_goal}}\nResult criteria: {{result_criteria}}\n\n\
             Submitted result:\n{{result_content}}\n\n\
             Respond with JSON matching the given schema only.",
        ),
        TASK_ENRICHMENT => Some(
            "Rewrite the task description below into a precise, actionable instruction with an \
             unambiguous done definition, without changing its intent.\n\n\
             Raw description: {{raw_description}}\nPhase context: {{phase_context}}\n\n\
             Respond with JSON matching the given schema only.",
        ),
        _ => None,
    }
}

/// Render a named template against `variables`, substituting `{{key}}` with
/// the top-level value under `key` (strings substituted verbatim, everything
/// else as compact JSON).
pub fn render(template_name: &str, variables: &Value) -> DomainResult<String> {
    let template = body(template_name)
        .ok_or_else(|| DomainError::ValidationFailed(format!("unknown prompt template '{template_name}'")))?;

    let Some(vars) = variables.as_object() else {
        return Ok(template.to_string());
    };

    let mut rendered = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("{{{{{key}}}}}");
        let substitution = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&placeholder, &substitution);
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_string_variables() {
        let vars = json!({"task_description": "fix the bug", "done_definition": "tests pass", "scrollback": "", "history": ""});
        let rendered = render(GUARDIAN_TRAJECTORY_REVIEW, &vars).unwrap();
        assert!(rendered.contains("fix the bug"));
        assert!(!rendered.contains("{{task_description}}"));
    }

    #[test]
    fn unknown_template_errors() {
        assert!(render("no_such_template", &json!({})).is_err());
    }

    #[test]
    fn non_string_variables_render_as_json() {
        let vars = json!({"raw_description": "x", "phase_context": {"sequence": 1}});
        let rendered = render(TASK_ENRICHMENT, &vars).unwrap();
        assert!(rendered.contains("\"sequence\":1"));
    }
}
