//! Broadcast channel feeding the UI-facing WebSocket (spec §6 event list).
//!
//! Every mutation the RPC/HTTP handlers make that a dashboard cares about is
//! published here; `handle_ws` (see `http.rs`) fans each one out to every
//! connected socket. Grounded on the teacher's event-bus-over-`broadcast`
//! pattern, trimmed down from a generic `UnifiedEvent` envelope to the fixed
//! event set this surface actually emits.

use axum::extract::ws::{Message, WebSocket};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::domain::ports::{DomainEvent, EventPublisher};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BroadcastEvent {
    TaskQueued { task_id: Uuid },
    TaskCreated { task_id: Uuid },
    TaskCompleted { task_id: Uuid },
    TaskPriorityBumped { task_id: Uuid },
    AgentCreated { agent_id: Uuid },
    AgentStatusChanged { agent_id: Uuid, status: String },
    TicketApproved { ticket_id: Uuid },
    TicketRejected { ticket_id: Uuid },
    TicketDeleted { ticket_id: Uuid },
    TicketUnblocked { ticket_id: Uuid },
    ResultsReported { result_id: Uuid },
    ResultValidationCompleted { result_id: Uuid, passed: bool },
}

/// Shared broadcaster. Cloning is cheap (wraps a `broadcast::Sender`); hand
/// out clones to every handler that needs to publish.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<BroadcastEvent>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl EventBroadcaster {
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.sender.subscribe()
    }

    /// Publishing never fails the caller: with zero subscribers `send`
    /// returns an error that carries no information worth propagating.
    pub fn publish(&self, event: BroadcastEvent) {
        let _ = self.sender.send(event);
    }
}

/// Lets services on the other side of the port boundary (e.g. the agent
/// manager) raise events without depending on this adapter's types.
impl EventPublisher for EventBroadcaster {
    fn publish(&self, event: DomainEvent) {
        let event = match event {
            DomainEvent::AgentCreated { agent_id } => BroadcastEvent::AgentCreated { agent_id },
            DomainEvent::AgentStatusChanged { agent_id, status } => BroadcastEvent::AgentStatusChanged { agent_id, status },
            DomainEvent::TicketDeleted { ticket_id } => BroadcastEvent::TicketDeleted { ticket_id },
        };
        EventBroadcaster::publish(self, event);
    }
}

/// Drives one WebSocket connection: fans out broadcast events as JSON text
/// frames, and drains (but ignores) whatever the client sends, since this
/// channel is one-directional.
pub async fn handle_ws(mut socket: WebSocket, mut receiver: broadcast::Receiver<BroadcastEvent>) {
    loop {
        tokio::select! {
            result = receiver.recv() => {
                match result {
                    Ok(event) => {
                        let Ok(text) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket subscriber lagged, dropping missed events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
