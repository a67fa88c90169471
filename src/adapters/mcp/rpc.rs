//! Agent-facing RPC surface (spec §6, "RPC surface (agent-facing)").
//!
//! Every route here is authorised via the `X-Agent-ID` header through
//! [`AgentService::authorize_agent`]; there is no other authentication.
//! Routes are mounted under `/rpc/<call-name>` to keep this namespace
//! separate from the UI-facing routes in `http.rs`.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{
    AccessorId, Agent, ApprovalStatus, Memory, MemoryType, ResultType, Task, TaskPriority, TaskStatus, Ticket, TicketComment,
    ValidationReview,
};
use crate::domain::ports::{AgentTerminator, TaskFilter, TaskRepository};

use super::events::BroadcastEvent;
use super::response::{ApiError, ApiResult};
use super::server::AppState;

const RESULT_SIZE_LIMIT_BYTES: u64 = 100 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rpc/create_task", post(create_task))
        .route("/rpc/update_task_status", post(update_task_status))
        .route("/rpc/save_memory", post(save_memory))
        .route("/rpc/qdrant_find", post(qdrant_find))
        .route("/rpc/create_ticket", post(create_ticket))
        .route("/rpc/change_ticket_status", post(change_ticket_status))
        .route("/rpc/add_ticket_comment", post(add_ticket_comment))
        .route("/rpc/resolve_ticket", post(resolve_ticket))
        .route("/rpc/search_tickets", post(search_tickets))
        .route("/rpc/give_validation_review", post(give_validation_review))
        .route("/rpc/submit_result", post(submit_result))
        .route("/rpc/submit_result_validation", post(submit_result_validation))
        .route("/rpc/validate_agent_id", post(validate_agent_id))
}

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<Agent, ApiError> {
    let header = headers.get("x-agent-id").and_then(|v| v.to_str().ok()).unwrap_or_default();
    Ok(state.agent_service.authorize_agent(header).await?)
}

/// Reads a submitted result file, enforcing the §6 file-format constraints:
/// no `..` traversal component and a 100 KiB ceiling.
fn read_result_markdown(path: &str) -> Result<String, ApiError> {
    if path.split('/').any(|segment| segment == "..") {
        return Err(DomainError::ValidationFailed(format!("markdown_path '{path}' must not contain '..'")).into());
    }
    let metadata = std::fs::metadata(path).map_err(|e| DomainError::ValidationFailed(format!("cannot stat {path}: {e}")))?;
    if metadata.len() > RESULT_SIZE_LIMIT_BYTES {
        return Err(DomainError::ValidationFailed(format!("{path} exceeds the 100 KiB result size limit")).into());
    }
    std::fs::read_to_string(path).map_err(|e| DomainError::ValidationFailed(format!("failed to read {path}: {e}")).into())
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    description: String,
    done_definition: String,
    phase_id: Option<Uuid>,
    #[serde(default)]
    priority: TaskPriority,
    ticket_id: Option<Uuid>,
}

async fn create_task(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<CreateTaskRequest>) -> ApiResult<Task> {
    let agent = authorize(&state, &headers).await?;

    let description = match req.ticket_id {
        Some(ticket_id) => format!("{}\n\nTICKET: {ticket_id}", req.description),
        None => req.description,
    };

    let validation_enabled = match req.phase_id {
        Some(phase_id) => state.workflows.get_phase(phase_id).await?.map(|p| p.validation.enabled).unwrap_or(false),
        None => false,
    };

    let task = state
        .task_queue
        .create_task(agent.workflow_id, description, req.done_definition, req.phase_id, req.priority, validation_enabled)
        .await?;

    state.events.publish(BroadcastEvent::TaskCreated { task_id: task.id });
    if task.status == TaskStatus::Queued {
        state.events.publish(BroadcastEvent::TaskQueued { task_id: task.id });
    }
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct UpdateTaskStatusRequest {
    task_id: Uuid,
    status: String,
    summary: String,
    learnings: Option<String>,
}

/// `update_task_status(task_id, status, summary, learnings?)`. `status` is
/// one of `done` / `failed` / `in_progress`; see §4.5 for the state machine
/// this drives through.
async fn update_task_status(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<UpdateTaskStatusRequest>) -> ApiResult<Task> {
    let agent = authorize(&state, &headers).await?;
    let mut task = state.tasks.get(req.task_id).await?.ok_or(DomainError::TaskNotFound(req.task_id))?;

    match req.status.as_str() {
        "done" if task.validation_enabled => {
            task.completion_notes = Some(req.summary.clone());
            task.transition_to(TaskStatus::UnderReview, Some(agent.id)).map_err(DomainError::ValidationFailed)?;
            state.tasks.update(&task).await?;
            state.agent_service.spawn_validator_for_task(task.id).await?;
        }
        "done" => {
            task.completion_notes = Some(req.summary.clone());
            task.transition_to(TaskStatus::Done, Some(agent.id)).map_err(DomainError::ValidationFailed)?;
            state.tasks.update(&task).await?;
            state.agent_service.terminate_agent(agent.id, "task completed").await?;
            state.events.publish(BroadcastEvent::TaskCompleted { task_id: task.id });
        }
        "failed" => {
            state.agent_service.terminate_agent(agent.id, &req.summary).await?;
            task = state.tasks.get(req.task_id).await?.ok_or(DomainError::TaskNotFound(req.task_id))?;
        }
        "in_progress" => {
            task.completion_notes = Some(req.summary.clone());
            state.tasks.update(&task).await?;
        }
        other => return Err(DomainError::ValidationFailed(format!("unknown task status '{other}'")).into()),
    }

    if let Some(learnings) = req.learnings {
        if let Err(err) = state.memory.save_memory(learnings, MemoryType::Pattern, vec!["learnings".to_string()], AccessorId::task(req.task_id)).await {
            tracing::warn!(task_id = %req.task_id, error = %err, "failed to save learnings memory, continuing");
        }
    }

    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct SaveMemoryRequest {
    content: String,
    #[serde(rename = "type")]
    memory_type: MemoryType,
    #[serde(default)]
    tags: Vec<String>,
}

async fn save_memory(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<SaveMemoryRequest>) -> ApiResult<Memory> {
    let agent = authorize(&state, &headers).await?;
    let memory = state.memory.save_memory(req.content, req.memory_type, req.tags, AccessorId::agent(agent.id.to_string())).await?;
    Ok(Json(memory))
}

#[derive(Debug, Deserialize)]
struct QdrantFindRequest {
    query: String,
    #[serde(default = "default_find_limit")]
    limit: usize,
    namespace: Option<String>,
}

fn default_find_limit() -> usize {
    10
}

#[derive(Debug, serde::Serialize)]
struct QdrantFindHit {
    memory: Memory,
    score: f32,
}

async fn qdrant_find(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<QdrantFindRequest>) -> ApiResult<Vec<QdrantFindHit>> {
    let agent = authorize(&state, &headers).await?;
    let hits = state.memory.qdrant_find(&req.query, req.namespace.as_deref(), req.limit, AccessorId::agent(agent.id.to_string())).await?;
    Ok(Json(hits.into_iter().map(|h| QdrantFindHit { memory: h.memory, score: h.score }).collect()))
}

#[derive(Debug, Deserialize)]
struct CreateTicketRequest {
    title: String,
    description: String,
    ticket_type: String,
    initial_status: String,
    #[serde(default)]
    requires_approval: bool,
}

/// When the workflow requires human review, this blocks until a UI-driven
/// approve/reject arrives or `approval_timeout_seconds` elapses (§4.6).
async fn create_ticket(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<CreateTicketRequest>) -> ApiResult<Ticket> {
    let agent = authorize(&state, &headers).await?;
    let mut ticket = state
        .ticket
        .create_ticket(agent.workflow_id, req.title, req.description, req.ticket_type, req.initial_status, req.requires_approval)
        .await?;

    if ticket.approval_status == ApprovalStatus::PendingReview {
        let workflow = state.workflows.get(agent.workflow_id).await?.ok_or(DomainError::WorkflowNotFound(agent.workflow_id))?;
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(workflow.board_config.approval_timeout_seconds);
        loop {
            if tokio::time::Instant::now() >= deadline {
                state.ticket.delete(ticket.id).await?;
                state.events.publish(BroadcastEvent::TicketDeleted { ticket_id: ticket.id });
                return Err(DomainError::TimedOut(format!("ticket {} approval", ticket.id)).into());
            }
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
            ticket = state.ticket.get(ticket.id).await?;
            match ticket.approval_status {
                ApprovalStatus::Approved => break,
                ApprovalStatus::Rejected => {
                    let reason = ticket.resolution_comment.clone().unwrap_or_else(|| "no reason given".to_string());
                    state.ticket.delete(ticket.id).await?;
                    state.events.publish(BroadcastEvent::TicketDeleted { ticket_id: ticket.id });
                    return Err(DomainError::ValidationFailed(format!("ticket {} rejected: {reason}", ticket.id)).into());
                }
                _ => continue,
            }
        }
    }
    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
struct ChangeTicketStatusRequest {
    ticket_id: Uuid,
    new_status: String,
    comment: Option<String>,
}

async fn change_ticket_status(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ChangeTicketStatusRequest>) -> ApiResult<Ticket> {
    let agent = authorize(&state, &headers).await?;
    let workflow = state.workflows.get(agent.workflow_id).await?.ok_or(DomainError::WorkflowNotFound(agent.workflow_id))?;
    let ticket = state.ticket.change_status(req.ticket_id, &req.new_status, &workflow.board_config.columns, req.comment).await?;
    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
struct AddTicketCommentRequest {
    ticket_id: Uuid,
    text: String,
}

async fn add_ticket_comment(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<AddTicketCommentRequest>) -> ApiResult<TicketComment> {
    let agent = authorize(&state, &headers).await?;
    let comment = state.ticket.add_comment(req.ticket_id, req.text, Some(agent.id)).await?;
    Ok(Json(comment))
}

#[derive(Debug, Deserialize)]
struct ResolveTicketRequest {
    ticket_id: Uuid,
    resolution_comment: String,
}

/// The board has no separate "resolved columns" concept; the workflow's
/// last configured column is treated as the resolved state.
async fn resolve_ticket(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ResolveTicketRequest>) -> ApiResult<Ticket> {
    let agent = authorize(&state, &headers).await?;
    let workflow = state.workflows.get(agent.workflow_id).await?.ok_or(DomainError::WorkflowNotFound(agent.workflow_id))?;
    let resolved_status = workflow.board_config.columns.last().cloned().unwrap_or_else(|| "resolved".to_string());
    let (ticket, unblocked) = state
        .ticket
        .resolve(agent.workflow_id, req.ticket_id, req.resolution_comment, &resolved_status, std::slice::from_ref(&resolved_status))
        .await?;
    for ticket_id in unblocked {
        state.events.publish(BroadcastEvent::TicketUnblocked { ticket_id });
    }
    Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
struct SearchTicketsRequest {
    query: String,
    /// Accepted for API compatibility; the ticket service always scores
    /// with its hybrid weighting since semantic/keyword are not exposed
    /// separately at that layer.
    #[serde(default)]
    mode: String,
    #[serde(default = "default_find_limit")]
    limit: usize,
}

async fn search_tickets(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<SearchTicketsRequest>) -> ApiResult<Vec<Ticket>> {
    let agent = authorize(&state, &headers).await?;
    let _ = req.mode;
    let ranked = state.ticket.hybrid_search(agent.workflow_id, &req.query, req.limit).await?;
    Ok(Json(ranked.into_iter().map(|r| r.ticket).collect()))
}

#[derive(Debug, Deserialize)]
struct GiveValidationReviewRequest {
    task_id: Uuid,
    pass: bool,
    feedback: String,
    #[serde(default)]
    evidence: serde_json::Value,
}

async fn give_validation_review(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<GiveValidationReviewRequest>) -> ApiResult<ValidationReview> {
    let validator = authorize(&state, &headers).await?;
    let review = state.validation.submit_task_review(req.task_id, validator.id, req.pass, req.feedback, req.evidence).await?;

    // TODO: also reclaim the original worker's kept-alive agent once
    // `AgentRepository::get_by_task` can disambiguate multiple agents per
    // task id; for now only the validator's own session is torn down here.
    state.agent_service.terminate_agent(validator.id, "validation review submitted").await?;

    if review.validation_passed {
        state.events.publish(BroadcastEvent::TaskCompleted { task_id: req.task_id });
    }
    Ok(Json(review))
}

#[derive(Debug, Deserialize)]
struct SubmitResultRequest {
    /// Present only for the task-level shape.
    task_id: Option<Uuid>,
    markdown_path: String,
    result_type: Option<ResultType>,
    summary: Option<String>,
    /// Present only for the workflow-level shape.
    explanation: Option<String>,
}

/// `submit_result` is overloaded (§6): a `task_id` selects the task-level
/// shape (`TaskResult`); its absence selects the workflow-level shape
/// (`WorkflowResult`), which folds `explanation` ahead of the file content.
async fn submit_result(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<SubmitResultRequest>) -> ApiResult<serde_json::Value> {
    let agent = authorize(&state, &headers).await?;
    let markdown_content = read_result_markdown(&req.markdown_path)?;

    if let Some(task_id) = req.task_id {
        let result_type = req.result_type.unwrap_or(ResultType::Implementation);
        let summary = req.summary.unwrap_or_default();
        let result = state.validation.submit_task_result(agent.id, task_id, req.markdown_path, markdown_content, result_type, summary).await?;
        state.events.publish(BroadcastEvent::ResultsReported { result_id: result.id });
        return Ok(Json(serde_json::to_value(result).map_err(DomainError::from)?));
    }

    let explanation = req.explanation.unwrap_or_default();
    let content = format!("{explanation}\n\n---\n\n{markdown_content}");
    let result = state.validation.submit_workflow_result(agent.workflow_id, agent.id, req.markdown_path.clone(), content).await?;
    state.events.publish(BroadcastEvent::ResultsReported { result_id: result.id });

    let workflow = state.workflows.get(agent.workflow_id).await?.ok_or(DomainError::WorkflowNotFound(agent.workflow_id))?;
    if workflow.result_required && !workflow.result_criteria.is_empty() {
        state.agent_service.spawn_result_validator(agent.workflow_id, &req.markdown_path).await?;
    }
    Ok(Json(serde_json::to_value(result).map_err(DomainError::from)?))
}

#[derive(Debug, Deserialize)]
struct SubmitResultValidationRequest {
    result_id: Uuid,
    pass: bool,
    feedback: Option<String>,
    #[serde(default)]
    evidence: serde_json::Value,
}

/// Mirrors `submit_result`'s overload, discriminated by which result
/// repository actually has a row for `result_id` (task-level `TaskResult`s
/// and workflow-level `WorkflowResult`s are disjoint id spaces).
async fn submit_result_validation(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<SubmitResultValidationRequest>) -> ApiResult<serde_json::Value> {
    let agent = authorize(&state, &headers).await?;

    if state.validation.get_task_result(req.result_id).await?.is_some() {
        let result = if req.pass {
            state.validation.mark_task_result_verified(req.result_id, agent.id).await?
        } else {
            state.validation.mark_task_result_disputed(req.result_id).await?
        };
        return Ok(Json(serde_json::to_value(result).map_err(DomainError::from)?));
    }

    let workflow_result = state.validation.get_workflow_result(req.result_id).await?.ok_or(DomainError::ResultNotFound(req.result_id))?;
    let workflow = state.workflows.get(workflow_result.workflow_id).await?.ok_or(DomainError::WorkflowNotFound(workflow_result.workflow_id))?;
    let stop_all = workflow.stops_all_on_result();

    let outcome = state
        .validation
        .submit_workflow_result_validation(req.result_id, agent.id, req.pass, req.feedback, req.evidence, stop_all)
        .await?;

    state.events.publish(BroadcastEvent::ResultValidationCompleted { result_id: req.result_id, passed: req.pass });

    if outcome.should_stop_all {
        for active in state.agent_repo.list_active().await? {
            let _ = state.agent_service.terminate_agent(active.id, "workflow result validated, stop_all policy in effect").await;
        }
        for mut task in state.tasks.list(TaskFilter::default()).await? {
            if !task.status.is_terminal() {
                task.failure_reason = Some("workflow result validated, stop_all policy in effect".to_string());
                // Best-effort: not every non-terminal status has a legal
                // edge to Failed; those are left for the monitoring loop.
                if task.transition_to(TaskStatus::Failed, None).is_ok() {
                    let _ = state.tasks.update(&task).await;
                }
            }
        }
    }

    Ok(Json(serde_json::json!({
        "status": format!("{:?}", outcome.status),
        "should_stop_all": outcome.should_stop_all,
    })))
}

#[derive(Debug, Deserialize)]
struct ValidateAgentIdRequest {
    id: String,
}

#[derive(Debug, serde::Serialize)]
struct ValidateAgentIdResponse {
    valid: bool,
    reason: Option<String>,
}

async fn validate_agent_id(Json(req): Json<ValidateAgentIdRequest>) -> Json<ValidateAgentIdResponse> {
    match crate::services::AgentService::validate_agent_id_format(&req.id) {
        Ok(()) => Json(ValidateAgentIdResponse { valid: true, reason: None }),
        Err(reason) => Json(ValidateAgentIdResponse { valid: false, reason: Some(reason.to_string()) }),
    }
}
