// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod crypto;
pub mod event_bus;
pub mod prompt_service;
pub mod state_store;

pub use crypto::{CryptoError, CryptoOperator, KeyHandle};
pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver};
pub use prompt_service::{HumanPromptService, PendingPromptInfo, TimedPromptChannel};
pub use state_store::{InMemoryStateStore, JsonFileStateStore, PersistedState};
