// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Decision Notifier
//!
//! Background task that turns every completed decision into a user-facing
//! notification while the `notifications` setting is on. Abandoned prompts
//! produce no decision and therefore no notification.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::events::AuthorizationEvent;
use crate::domain::repository::SettingsRepository;
use crate::infrastructure::event_bus::{DomainEvent, EventBus, EventBusError};

/// Where notifications end up.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Emits notifications as `info` log lines.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, message: &str) {
        info!(target: "keyward::notifications", "{}", message);
    }
}

pub struct DecisionNotifier {
    settings: Arc<dyn SettingsRepository>,
    event_bus: EventBus,
    sink: Arc<dyn NotificationSink>,
}

impl DecisionNotifier {
    pub fn new(settings: Arc<dyn SettingsRepository>, event_bus: EventBus, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            settings,
            event_bus,
            sink,
        }
    }

    /// Subscribes before spawning, so nothing published after this call
    /// returns is missed.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let mut receiver = self.event_bus.subscribe();
        tokio::spawn(async move {
            let mut delivered = 0u64;
            loop {
                match receiver.recv().await {
                    Ok(DomainEvent::Authorization(AuthorizationEvent::DecisionMade {
                        origin, action, allowed, ..
                    })) => {
                        // A store hiccup should not silence the notifier for good
                        let enabled = self.settings.notifications().await.unwrap_or_else(|e| {
                            warn!(error = %e, "Could not read notification setting");
                            false
                        });
                        if enabled {
                            let verdict = if allowed { "allowed" } else { "denied" };
                            self.sink.notify(&format!("{} {} for {}", action, verdict, origin));
                            delivered += 1;
                        }
                    }
                    Ok(_) => continue,
                    Err(EventBusError::Lagged(n)) => {
                        warn!("Notifier lagged by {} events, some notifications were skipped", n);
                    }
                    Err(EventBusError::Closed) => break,
                    Err(e) => debug!(error = %e, "Notifier receive error"),
                }
            }
            info!("Decision notifier stopped after {} notifications", delivered);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::action::{ActionType, Origin};
    use crate::domain::events::DecisionSource;
    use crate::infrastructure::state_store::InMemoryStateStore;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl NotificationSink for Recorder {
        fn notify(&self, message: &str) {
            self.0.lock().push(message.to_string());
        }
    }

    fn decision(host: &str, allowed: bool) -> AuthorizationEvent {
        AuthorizationEvent::DecisionMade {
            origin: Origin::new(host),
            action: ActionType::SignEvent,
            allowed,
            source: DecisionSource::Prompt,
            params: serde_json::Value::Null,
            decided_at: Utc::now(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn notifies_only_when_enabled() {
        let store = Arc::new(InMemoryStateStore::new());
        let bus = EventBus::new(16);
        let sink = Arc::new(Recorder::default());
        let handle = Arc::new(DecisionNotifier::new(store.clone(), bus.clone(), sink.clone())).start();

        bus.publish_authorization_event(decision("quiet.example", true));
        settle().await;
        assert!(sink.0.lock().is_empty());

        store.set_notifications(true).await.unwrap();
        bus.publish_authorization_event(decision("example.com", true));
        bus.publish_authorization_event(decision("example.com", false));
        settle().await;
        assert_eq!(
            *sink.0.lock(),
            vec!["signEvent allowed for example.com", "signEvent denied for example.com"]
        );

        handle.abort();
    }
}
