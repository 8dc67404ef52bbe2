// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Embedded mode (when the daemon is not running)
//!
//! Opens the state file and runs the signer in-process, asking for consent
//! on the terminal.

use anyhow::{Context, Result};
use std::sync::Arc;

use keyward_core::application::broker::AuthorizationBroker;
use keyward_core::application::settings::SettingsService;
use keyward_core::application::transport::{Caller, InboundMessage, InboundResponse, InboundTransport};
use keyward_core::domain::node_config::SignerConfigManifest;
use keyward_core::domain::prompt::PromptChannel;
use keyward_core::infrastructure::event_bus::EventBus;
use keyward_core::infrastructure::state_store::JsonFileStateStore;

pub struct EmbeddedSigner {
    settings: SettingsService,
    transport: InboundTransport,
}

impl EmbeddedSigner {
    pub async fn open(config: &SignerConfigManifest, prompts: Arc<dyn PromptChannel>) -> Result<Self> {
        let store = Arc::new(
            JsonFileStateStore::open(&config.spec.state_path)
                .await
                .with_context(|| format!("Failed to open state file {:?}", config.spec.state_path))?,
        );
        let event_bus = EventBus::new(config.spec.event_bus_capacity);

        let broker = Arc::new(AuthorizationBroker::new(
            store.clone(),
            store.clone(),
            prompts,
            event_bus.clone(),
        ));

        Ok(Self {
            settings: SettingsService::new(store.clone(), store, event_bus),
            transport: InboundTransport::new(broker, config.spec.expose_failure_detail),
        })
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    /// The CLI is the signer's own UI, so requests run as trusted.
    pub async fn request(&self, message: InboundMessage) -> InboundResponse {
        self.transport.handle(Caller::Trusted, None, message).await
    }
}
