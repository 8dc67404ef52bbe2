// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Repository Interfaces
//!
//! Persistence contracts for policies and settings. Both are implemented by
//! the state stores in `crate::infrastructure::state_store`, which keep the
//! whole key-value document (`private_key`, `relays`, `policies`,
//! `notifications`, `protocol_handler`) together.
//!
//! Neither trait does any locking of its own beyond keeping a single call
//! consistent; the broker serializes the read-prompt-write cycle.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::action::{ActionType, Origin};
use crate::domain::policy::{Conditions, Decision, PolicyFilter, PolicyRecord};
use crate::domain::relay::RelayList;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state I/O error: {0}")]
    Io(String),

    #[error("state serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// Applicable decision for the request, `None` when unknown.
    async fn get(&self, origin: &Origin, action: ActionType, kind: Option<u32>) -> Result<Option<Decision>, StoreError>;

    async fn put(
        &self,
        origin: &Origin,
        action: ActionType,
        decision: Decision,
        conditions: Conditions,
    ) -> Result<(), StoreError>;

    /// Bulk revoke; `action = None` removes every action under `decision`.
    async fn remove_all(&self, origin: &Origin, decision: Decision, action: Option<ActionType>) -> Result<usize, StoreError>;

    async fn list(&self, filter: &PolicyFilter) -> Result<Vec<PolicyRecord>, StoreError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    /// Raw key material as 64 hex characters.
    async fn private_key(&self) -> Result<Option<String>, StoreError>;
    async fn set_private_key(&self, hex: Option<String>) -> Result<(), StoreError>;

    async fn relays(&self) -> Result<RelayList, StoreError>;
    async fn set_relays(&self, relays: RelayList) -> Result<(), StoreError>;

    async fn notifications(&self) -> Result<bool, StoreError>;
    async fn set_notifications(&self, enabled: bool) -> Result<(), StoreError>;

    async fn protocol_handler(&self) -> Result<Option<String>, StoreError>;
    async fn set_protocol_handler(&self, template: Option<String>) -> Result<(), StoreError>;
}
