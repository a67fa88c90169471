//! UI-facing HTTP + WebSocket surface (spec §6, "HTTP surface (UI-facing)").
//!
//! No agent-ID authorisation here: these routes are the dashboard's window
//! into queue/agent/ticket/result state and the handful of operator
//! actions (bump, cancel, restart, terminate, approve, reject).

use std::collections::HashMap;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{Task, TaskStatus, Ticket};
use crate::domain::ports::{AgentTerminator, TaskFilter, TaskRepository};

use super::events::handle_ws;
use super::response::{ApiError, ApiResult};
use super::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue_status", get(queue_status))
        .route("/tasks", get(list_tasks))
        .route("/bump_task_priority", post(bump_task_priority))
        .route("/cancel_queued_task", post(cancel_queued_task))
        .route("/restart_task", post(restart_task))
        .route("/terminate_agent", post(terminate_agent))
        .route("/results", get(list_results))
        .route("/results/:id/content", get(result_content))
        .route("/results/:id/validation", get(result_validation))
        .route("/tickets/approve", post(approve_ticket))
        .route("/tickets/reject", post(reject_ticket))
        .route("/tickets/pending-review-count", get(pending_review_count))
        .route("/graph", get(graph))
        .route("/ws", get(websocket))
}

#[derive(Debug, Serialize)]
struct QueueStatusResponse {
    tasks_by_status: HashMap<String, u64>,
    active_agents: usize,
}

async fn queue_status(State(state): State<AppState>) -> ApiResult<QueueStatusResponse> {
    let counts = state.tasks.count_by_status().await?;
    let tasks_by_status = counts.into_iter().map(|(status, n)| (status.as_str().to_string(), n)).collect();
    let active_agents = state.agent_repo.list_active().await?.len();
    Ok(Json(QueueStatusResponse { tasks_by_status, active_agents }))
}

#[derive(Debug, Deserialize)]
struct TaskQueryParams {
    workflow_id: Option<Uuid>,
    status: Option<String>,
}

async fn list_tasks(State(state): State<AppState>, Query(params): Query<TaskQueryParams>) -> ApiResult<Vec<Task>> {
    let status = match params.status {
        Some(ref s) => Some(TaskStatus::parse_str(s).ok_or_else(|| DomainError::ValidationFailed(format!("unknown task status '{s}'")))?),
        None => None,
    };
    let filter = TaskFilter { status, workflow_id: params.workflow_id, ..TaskFilter::default() };
    Ok(Json(state.tasks.list(filter).await?))
}

#[derive(Debug, Deserialize)]
struct TaskIdBody {
    task_id: Uuid,
}

async fn bump_task_priority(State(state): State<AppState>, Json(body): Json<TaskIdBody>) -> ApiResult<Task> {
    state.task_queue.bump_task_priority(body.task_id).await?;
    let task = state.tasks.get(body.task_id).await?.ok_or(DomainError::TaskNotFound(body.task_id))?;
    state.events.publish(super::events::BroadcastEvent::TaskPriorityBumped { task_id: body.task_id });
    Ok(Json(task))
}

async fn cancel_queued_task(State(state): State<AppState>, Json(body): Json<TaskIdBody>) -> ApiResult<Task> {
    state.task_queue.cancel_queued(body.task_id).await?;
    let task = state.tasks.get(body.task_id).await?.ok_or(DomainError::TaskNotFound(body.task_id))?;
    Ok(Json(task))
}

async fn restart_task(State(state): State<AppState>, Json(body): Json<TaskIdBody>) -> ApiResult<Task> {
    state.task_queue.restart_task(body.task_id).await?;
    let task = state.tasks.get(body.task_id).await?.ok_or(DomainError::TaskNotFound(body.task_id))?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct TerminateAgentBody {
    agent_id: Uuid,
    reason: String,
}

async fn terminate_agent(State(state): State<AppState>, Json(body): Json<TerminateAgentBody>) -> ApiResult<serde_json::Value> {
    state.agent_service.terminate_agent(body.agent_id, &body.reason).await?;
    Ok(Json(serde_json::json!({ "terminated": body.agent_id })))
}

#[derive(Debug, Deserialize)]
struct ResultsQueryParams {
    task_id: Option<Uuid>,
}

async fn list_results(State(state): State<AppState>, Query(params): Query<ResultsQueryParams>) -> ApiResult<serde_json::Value> {
    let task_results = state.validation.list_task_results(params.task_id).await?;
    Ok(Json(serde_json::json!({ "task_results": task_results })))
}

async fn result_content(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse, ApiError> {
    if let Some(result) = state.validation.get_task_result(id).await? {
        return Ok(result.markdown_content);
    }
    let result = state.validation.get_workflow_result(id).await?.ok_or(DomainError::ResultNotFound(id))?;
    Ok(result.markdown_content)
}

async fn result_validation(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<serde_json::Value> {
    if let Some(task_result) = state.validation.get_task_result(id).await? {
        let reviews = state.validation.get_reviews_for_task(task_result.task_id).await?;
        return Ok(Json(serde_json::json!({ "task_result": task_result, "reviews": reviews })));
    }
    let workflow_result = state.validation.get_workflow_result(id).await?.ok_or(DomainError::ResultNotFound(id))?;
    Ok(Json(serde_json::to_value(workflow_result).map_err(DomainError::from)?))
}

#[derive(Debug, Deserialize)]
struct TicketIdBody {
    ticket_id: Uuid,
}

async fn approve_ticket(State(state): State<AppState>, Json(body): Json<TicketIdBody>) -> ApiResult<Ticket> {
    let ticket = state.ticket.approve(body.ticket_id).await?;
    state.events.publish(super::events::BroadcastEvent::TicketApproved { ticket_id: body.ticket_id });
    Ok(Json(ticket))
}

async fn reject_ticket(State(state): State<AppState>, Json(body): Json<TicketIdBody>) -> ApiResult<Ticket> {
    let ticket = state.ticket.reject(body.ticket_id).await?;
    state.events.publish(super::events::BroadcastEvent::TicketRejected { ticket_id: body.ticket_id });
    Ok(Json(ticket))
}

async fn pending_review_count(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let count = state.ticket.pending_review_count().await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

#[derive(Debug, Deserialize)]
struct GraphQueryParams {
    workflow_id: Uuid,
}

async fn graph(State(state): State<AppState>, Query(params): Query<GraphQueryParams>) -> ApiResult<serde_json::Value> {
    let (tickets, blocks) = state.ticket.graph(params.workflow_id).await?;
    Ok(Json(serde_json::json!({ "tickets": tickets, "blocks": blocks })))
}

async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let receiver = state.events.subscribe();
    ws.on_upgrade(move |socket| handle_ws(socket, receiver))
}
