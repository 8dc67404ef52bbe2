// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod broker;
pub mod notifier;
pub mod settings;
pub mod transport;

pub use broker::{AuthorizationBroker, AuthorizationService, Payload};
pub use notifier::{DecisionNotifier, LogSink, NotificationSink};
pub use settings::{Identity, SettingsService};
pub use transport::{Caller, InboundMessage, InboundResponse, InboundTransport, WireError};
