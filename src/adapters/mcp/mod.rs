//! HTTP adapters exposing the orchestrator to agents and UIs (spec §6).
//!
//! `rpc` is the agent-facing surface (authorised via `X-Agent-ID`), `http`
//! is the UI-facing surface (queue/result/ticket inspection and operator
//! actions), and `events` is the broadcast channel the UI's WebSocket
//! subscribes to. `server` composes both into one axum `Router`.

pub mod events;
pub mod http;
pub mod response;
pub mod rpc;
pub mod server;

pub use events::{BroadcastEvent, EventBroadcaster};
pub use server::{AppState, McpServerConfig};
