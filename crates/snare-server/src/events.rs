//! Domain event bus.
//!
//! Events fire after the corresponding store call succeeds; subscribers
//! (a live dashboard, metrics collectors) attach via [`EventBus::subscribe`].
//! Lagging or absent subscribers never block publishers.

use crate::model::Direction;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Named domain events emitted by administrative operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "id")]
pub enum DomainEvent {
    ExchangeDeleted(Uuid),
    ExchangeArchived(Uuid),
    ExchangeUnarchived(Uuid),
    ConnectionDeleted(Uuid),
    ConnectionArchived(Uuid),
    ConnectionUnarchived(Uuid),
}

impl DomainEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ExchangeDeleted(_) => "exchange:deleted",
            DomainEvent::ExchangeArchived(_) => "exchange:archived",
            DomainEvent::ExchangeUnarchived(_) => "exchange:unarchived",
            DomainEvent::ConnectionDeleted(_) => "connection:deleted",
            DomainEvent::ConnectionArchived(_) => "connection:archived",
            DomainEvent::ConnectionUnarchived(_) => "connection:unarchived",
        }
    }

    pub fn deleted(direction: Direction, id: Uuid) -> Self {
        match direction {
            Direction::Http => DomainEvent::ExchangeDeleted(id),
            Direction::Tcp => DomainEvent::ConnectionDeleted(id),
        }
    }

    pub fn archived(direction: Direction, id: Uuid) -> Self {
        match direction {
            Direction::Http => DomainEvent::ExchangeArchived(id),
            Direction::Tcp => DomainEvent::ConnectionArchived(id),
        }
    }

    pub fn unarchived(direction: Direction, id: Uuid) -> Self {
        match direction {
            Direction::Http => DomainEvent::ExchangeUnarchived(id),
            Direction::Tcp => DomainEvent::ConnectionUnarchived(id),
        }
    }
}

/// Broadcast channel wrapper for domain events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send error only means no subscriber is attached.
    pub fn publish(&self, event: DomainEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(event = name, receivers, "published domain event"),
            Err(_) => tracing::trace!(event = name, "no subscribers for domain event"),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
