// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::action::{ActionType, Origin};
use crate::domain::policy::{Conditions, Decision};
use crate::domain::prompt::CorrelationId;

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    StoredPolicy,
    Prompt,
}

/// Broker activity, published once per step of an authorization cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthorizationEvent {
    PromptOpened {
        correlation_id: CorrelationId,
        origin: Origin,
        action: ActionType,
        opened_at: DateTime<Utc>,
    },
    /// Prompt surface closed or timed out without an answer. The request is
    /// refused, but no decision was made, so no `DecisionMade` follows.
    PromptAbandoned {
        correlation_id: CorrelationId,
        origin: Origin,
        action: ActionType,
        abandoned_at: DateTime<Utc>,
    },
    /// Emitted exactly once per completed allow/deny decision.
    DecisionMade {
        origin: Origin,
        action: ActionType,
        allowed: bool,
        source: DecisionSource,
        params: serde_json::Value,
        decided_at: DateTime<Utc>,
    },
    PolicyUpdated {
        origin: Origin,
        action: ActionType,
        decision: Decision,
        conditions: Conditions,
        updated_at: DateTime<Utc>,
    },
    OperationCompleted {
        origin: Origin,
        action: ActionType,
        completed_at: DateTime<Utc>,
    },
    OperationFailed {
        origin: Origin,
        action: ActionType,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

/// Changes made through the settings surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettingsEvent {
    KeyChanged {
        /// x-only public key of the new key, `None` when cleared.
        public_key: Option<String>,
        changed_at: DateTime<Utc>,
    },
    RelaysChanged {
        relay_count: usize,
        changed_at: DateTime<Utc>,
    },
    PoliciesRevoked {
        origin: Origin,
        decision: Decision,
        action: Option<ActionType>,
        removed: usize,
        revoked_at: DateTime<Utc>,
    },
    NotificationsToggled {
        enabled: bool,
        changed_at: DateTime<Utc>,
    },
    ProtocolHandlerChanged {
        template: Option<String>,
        changed_at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_event_serialization() {
        let event = AuthorizationEvent::DecisionMade {
            origin: Origin::new("example.com"),
            action: ActionType::SignEvent,
            allowed: false,
            source: DecisionSource::StoredPolicy,
            params: serde_json::Value::Null,
            decided_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("DecisionMade"));
        assert!(json.contains("\"signEvent\""));
        assert!(json.contains("stored_policy"));

        let back: AuthorizationEvent = serde_json::from_str(&json).unwrap();
        if let AuthorizationEvent::DecisionMade { origin, allowed, .. } = back {
            assert_eq!(origin.as_str(), "example.com");
            assert!(!allowed);
        } else {
            panic!("unexpected variant");
        }
    }
}
