//! Composition of the agent-facing RPC surface and the UI-facing HTTP
//! surface into one axum server (spec §6: "a single long-lived process
//! exposing an RPC surface to both agents ... and UIs").

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::domain::ports::{AgentRepository, TaskRepository, WorkflowRepository};
use crate::services::{AgentService, MemoryService, TaskQueueService, TicketService, ValidationService};

use super::events::EventBroadcaster;
use super::{http as ui_http, rpc};

/// Every handle a handler on either surface might need. Cheap to clone:
/// every field is an `Arc` or wraps one.
#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskRepository>,
    pub agent_repo: Arc<dyn AgentRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub task_queue: Arc<TaskQueueService>,
    pub agent_service: Arc<AgentService>,
    pub validation: Arc<ValidationService>,
    pub ticket: Arc<TicketService>,
    pub memory: Arc<MemoryService>,
    pub events: EventBroadcaster,
}

#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8980, enable_cors: true }
    }
}

pub fn build_router(state: AppState, config: &McpServerConfig) -> Router {
    let mut router = Router::new().merge(rpc::router()).merge(ui_http::router()).with_state(state);

    if config.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router.layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, config: McpServerConfig) -> anyhow::Result<()> {
    let router = build_router(state, &config);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "mcp server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

pub async fn serve_with_shutdown(state: AppState, config: McpServerConfig, shutdown: impl std::future::Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
    let router = build_router(state, &config);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "mcp server listening");
    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
    Ok(())
}
