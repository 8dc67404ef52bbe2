// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wire types spoken by the signer daemon, re-exported from the core crate
//! so clients and server cannot drift apart.

pub use keyward_core::application::settings::Identity;
pub use keyward_core::application::transport::{Caller, InboundMessage, InboundResponse, WireError};
pub use keyward_core::domain::policy::{Conditions, Decision, PolicyRecord};
pub use keyward_core::domain::prompt::{CorrelationId, PromptResolutionMessage};
pub use keyward_core::domain::relay::{RelayList, RelayPolicy};
pub use keyward_core::domain::{ActionType, Origin, SignableEvent};
pub use keyward_core::infrastructure::prompt_service::PendingPromptInfo;
pub use keyward_core::presentation::dto::{
    ClosePrompt, KeyImport, NotificationsUpdate, PolicyQuery, PolicyRevocation, PromptHandled,
    ProtocolHandlerUpdate, RelayRemoval, RelayUpdate, Removed, SettingsView,
};

/// Text a refusal carries, whichever shape it came in.
pub fn wire_error_text(error: &WireError) -> &str {
    match error {
        WireError::Text(text) => text,
        WireError::Detail { message } => message,
    }
}
