// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Request and response bodies of the internal HTTP routes. Shared with the
//! SDK client so both ends agree on the shapes.

use serde::{Deserialize, Serialize};

use crate::domain::action::{ActionType, Origin};
use crate::domain::policy::{Decision, PolicyFilter};
use crate::domain::prompt::CorrelationId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyImport {
    /// 64 hex characters or an `nsec`.
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayUpdate {
    pub url: String,
    #[serde(default = "enabled")]
    pub read: bool,
    #[serde(default = "enabled")]
    pub write: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRemoval {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Removed {
    pub removed: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<Origin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionType>,
}

impl From<PolicyQuery> for PolicyFilter {
    fn from(query: PolicyQuery) -> Self {
        PolicyFilter {
            host: query.host,
            decision: query.decision,
            action: query.action,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRevocation {
    pub host: Origin,
    pub decision: Decision,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ActionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsView {
    pub notifications: bool,
    pub protocol_handler: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsUpdate {
    pub enabled: bool,
}

/// `template: null` clears the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolHandlerUpdate {
    pub template: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClosePrompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptHandled {
    pub id: CorrelationId,
}
