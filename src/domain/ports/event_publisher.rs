//! Event publisher port.
//!
//! The agent manager (C8) and ticket engine (C7) raise events the UI-facing
//! WebSocket feed (`adapters::mcp::events`) relays to dashboards. Services
//! depend on this trait rather than on the broadcast channel directly, so
//! the event fan-out stays an adapter concern.

use uuid::Uuid;

/// An event worth telling a connected dashboard about. Mirrors the fixed
/// set `adapters::mcp::events::BroadcastEvent` serialises onto the
/// WebSocket feed; kept as a separate, serde-free type here so the domain
/// layer has no adapter dependency.
#[derive(Debug, Clone)]
pub enum DomainEvent {
    AgentCreated { agent_id: Uuid },
    AgentStatusChanged { agent_id: Uuid, status: String },
    TicketDeleted { ticket_id: Uuid },
}

/// Publishes `DomainEvent`s to whatever is listening. Publishing never
/// fails the caller: a dashboard feed with no subscribers is not an error
/// condition for the service raising the event.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Discards every event. Used where a service is constructed without a
/// dashboard feed wired in (most test doubles).
#[derive(Debug, Clone, Default)]
pub struct NullEventPublisher;

impl EventPublisher for NullEventPublisher {
    fn publish(&self, _event: DomainEvent) {}
}
