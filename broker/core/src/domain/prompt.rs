// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Prompt Channel Contract
//!
//! The consent surface is external to the broker. The broker hands it a
//! [`PromptRequest`] and awaits exactly one [`PromptOutcome`]. A surface that
//! disappears without an answer must yield [`PromptOutcome::Abandoned`]; it
//! may never leave the broker waiting.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::action::{ActionType, Origin};
use crate::domain::policy::Conditions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What the human is asked to decide on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub id: CorrelationId,
    pub host: Origin,
    #[serde(rename = "type")]
    pub action: ActionType,
    pub params: serde_json::Value,
}

impl PromptRequest {
    /// One-line summary in the wording of the consent dialog.
    pub fn summary(&self) -> String {
        format!(
            "{} is requesting your permission to {}",
            self.host,
            self.action.permission_label()
        )
    }
}

/// An explicit answer. `conditions` present means "remember this".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResolution {
    pub accept: bool,
    #[serde(default)]
    pub conditions: Option<Conditions>,
}

impl PromptResolution {
    pub fn once(accept: bool) -> Self {
        Self { accept, conditions: None }
    }

    pub fn remember(accept: bool, conditions: Conditions) -> Self {
        Self {
            accept,
            conditions: Some(conditions),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Answered(PromptResolution),
    /// Surface closed, or timed out, with no answer.
    Abandoned,
}

/// Resolution message as sent by a prompt surface:
/// `{prompt: true, id?, host, type, accept, conditions}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResolutionMessage {
    pub prompt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
    pub host: Origin,
    #[serde(rename = "type")]
    pub action: ActionType,
    pub accept: bool,
    #[serde(default)]
    pub conditions: Option<Conditions>,
}

impl PromptResolutionMessage {
    pub fn resolution(&self) -> PromptResolution {
        PromptResolution {
            accept: self.accept,
            conditions: self.conditions.clone(),
        }
    }

    /// Whether this message answers `pending`. The id is optional on the
    /// wire; host and type must always agree.
    pub fn answers(&self, pending: &PromptRequest) -> bool {
        self.prompt
            && self.host == pending.host
            && self.action == pending.action
            && self.id.is_none_or(|id| id == pending.id)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("a prompt is already pending ({0})")]
    AlreadyPending(CorrelationId),

    #[error("no pending prompt matches this resolution")]
    NoMatchingPrompt,

    #[error("prompt surface unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PromptChannel: Send + Sync {
    /// Shows the request and resolves exactly once.
    async fn open(&self, request: PromptRequest) -> Result<PromptOutcome, PromptError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> PromptRequest {
        PromptRequest {
            id: CorrelationId::new(),
            host: Origin::new("example.com"),
            action: ActionType::GetPublicKey,
            params: serde_json::Value::Null,
        }
    }

    #[test]
    fn resolution_message_parses_wire_shape() {
        let msg: PromptResolutionMessage = serde_json::from_value(json!({
            "prompt": true,
            "host": "example.com",
            "type": "getPublicKey",
            "accept": true,
            "conditions": {}
        }))
        .unwrap();
        assert_eq!(msg.resolution(), PromptResolution::remember(true, Conditions::unconditional()));

        let msg: PromptResolutionMessage = serde_json::from_value(json!({
            "prompt": true,
            "host": "example.com",
            "type": "signEvent",
            "accept": false,
            "conditions": null
        }))
        .unwrap();
        assert_eq!(msg.resolution(), PromptResolution::once(false));
    }

    #[test]
    fn message_must_match_pending_host_and_type() {
        let pending = pending();
        let mut msg = PromptResolutionMessage {
            prompt: true,
            id: None,
            host: pending.host.clone(),
            action: pending.action,
            accept: true,
            conditions: None,
        };
        assert!(msg.answers(&pending));

        msg.id = Some(CorrelationId::new());
        assert!(!msg.answers(&pending));

        msg.id = Some(pending.id);
        msg.host = Origin::new("evil.example");
        assert!(!msg.answers(&pending));
    }

    #[test]
    fn summary_uses_permission_wording() {
        assert_eq!(pending().summary(), "example.com is requesting your permission to read your public key");
    }
}
