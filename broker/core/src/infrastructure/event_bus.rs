// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Domain Events
//
// In-memory event streaming on a tokio broadcast channel. Feeds the SSE
// endpoint, the daemon's notifier and any test observing the broker.
// Events are not persisted; a lagging subscriber loses the oldest ones.

use crate::domain::action::Origin;
use crate::domain::events::{AuthorizationEvent, SettingsEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Authorization(AuthorizationEvent),
    Settings(SettingsEvent),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is how many events are buffered before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(256)
    }

    pub fn publish_authorization_event(&self, event: AuthorizationEvent) {
        self.publish(DomainEvent::Authorization(event));
    }

    pub fn publish_settings_event(&self, event: SettingsEvent) {
        self.publish(DomainEvent::Settings(event));
    }

    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to authorization events of a single origin
    pub fn subscribe_origin(&self, origin: Origin) -> OriginEventReceiver {
        OriginEventReceiver {
            receiver: self.sender.subscribe(),
            origin,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn into_inner(self) -> broadcast::Receiver<DomainEvent> {
        self.receiver
    }
}

/// Receiver filtered to one origin's authorization events
pub struct OriginEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    origin: Origin,
}

impl OriginEventReceiver {
    pub async fn recv(&mut self) -> Result<AuthorizationEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Authorization(auth_event) = event {
                if event_origin(&auth_event) == &self.origin {
                    return Ok(auth_event);
                }
            }
        }
    }
}

fn event_origin(event: &AuthorizationEvent) -> &Origin {
    match event {
        AuthorizationEvent::PromptOpened { origin, .. } => origin,
        AuthorizationEvent::PromptAbandoned { origin, .. } => origin,
        AuthorizationEvent::DecisionMade { origin, .. } => origin,
        AuthorizationEvent::PolicyUpdated { origin, .. } => origin,
        AuthorizationEvent::OperationCompleted { origin, .. } => origin,
        AuthorizationEvent::OperationFailed { origin, .. } => origin,
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::ActionType;
    use crate::domain::events::DecisionSource;
    use chrono::Utc;

    fn completed(origin: &str) -> AuthorizationEvent {
        AuthorizationEvent::OperationCompleted {
            origin: Origin::new(origin),
            action: ActionType::GetPublicKey,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish_settings_event(SettingsEvent::NotificationsToggled {
            enabled: true,
            changed_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            DomainEvent::Settings(SettingsEvent::NotificationsToggled { enabled, .. }) => assert!(enabled),
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_origin_filtering() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe_origin(Origin::new("example.com"));

        event_bus.publish_authorization_event(completed("other.org"));
        event_bus.publish_authorization_event(AuthorizationEvent::DecisionMade {
            origin: Origin::new("example.com"),
            action: ActionType::SignEvent,
            allowed: true,
            source: DecisionSource::StoredPolicy,
            params: serde_json::Value::Null,
            decided_at: Utc::now(),
        });

        match receiver.recv().await.unwrap() {
            AuthorizationEvent::DecisionMade { origin, allowed, .. } => {
                assert_eq!(origin.as_str(), "example.com");
                assert!(allowed);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lagging_receiver_reports_dropped_events() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();
        for _ in 0..5 {
            event_bus.publish_authorization_event(completed("example.com"));
        }
        assert!(matches!(receiver.recv().await, Err(EventBusError::Lagged(3))));
        assert!(receiver.recv().await.is_ok());
    }

    #[test]
    fn test_try_recv_empty() {
        let event_bus = EventBus::new(4);
        let mut receiver = event_bus.subscribe();
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
        assert_eq!(event_bus.subscriber_count(), 1);
    }

    #[test]
    fn test_domain_event_is_tagged() {
        let json = serde_json::to_value(DomainEvent::Authorization(completed("example.com"))).unwrap();
        assert_eq!(json["type"], "authorization");
    }
}
