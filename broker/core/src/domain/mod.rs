// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: the vocabulary shared by the broker, the stores and the
//! transports. Nothing in here performs I/O.

pub mod action;
pub mod error;
pub mod event;
pub mod events;
pub mod nip19;
pub mod node_config;
pub mod policy;
pub mod prompt;
pub mod relay;
pub mod repository;
pub mod url_template;

pub use action::{ActionType, GatedRequest, OpenRequest, Origin, Request};
pub use error::AuthError;
pub use event::SignableEvent;
pub use policy::{Conditions, Decision, PolicyRecord};
pub use relay::{RelayList, RelayPolicy};
