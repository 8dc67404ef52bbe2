// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Delegation to the running daemon, or an embedded signer when there is
//! none. The daemon holds the state file open, so while it runs every change
//! has to go through it.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use keyward_core::application::settings::Identity;
use keyward_core::application::transport::{InboundMessage, InboundResponse};
use keyward_core::domain::node_config::SignerConfigManifest;
use keyward_core::domain::policy::PolicyRecord;
use keyward_core::domain::relay::{RelayList, RelayPolicy};
use keyward_core::infrastructure::TimedPromptChannel;
use keyward_core::presentation::dto::{PolicyQuery, PolicyRevocation, SettingsView};
use keyward_sdk::KeywardClient;

use crate::daemon::{check_daemon_running, DaemonStatus};
use crate::embedded::EmbeddedSigner;
use crate::terminal_prompt::TerminalPromptChannel;

pub enum Signer {
    Daemon(KeywardClient),
    Embedded(Box<EmbeddedSigner>),
}

impl Signer {
    pub async fn connect(config: &SignerConfigManifest) -> Result<Self> {
        let listen = &config.spec.listen;
        if let Ok(DaemonStatus::Running { .. }) = check_daemon_running(&listen.host, listen.port).await {
            debug!("Delegating to daemon at {}", listen.address());
            let client = KeywardClient::new(format!("http://{}", listen.address())).trusted();
            return Ok(Signer::Daemon(client));
        }

        debug!("Daemon not running, opening state file directly");
        let prompts = TimedPromptChannel::new(
            Arc::new(TerminalPromptChannel::new()),
            Duration::from_secs(config.spec.prompt.timeout_seconds),
        );
        let embedded = EmbeddedSigner::open(config, Arc::new(prompts)).await?;
        Ok(Signer::Embedded(Box::new(embedded)))
    }

    pub fn is_daemon(&self) -> bool {
        matches!(self, Signer::Daemon(_))
    }

    pub async fn request(&self, message: InboundMessage) -> Result<InboundResponse> {
        match self {
            Signer::Daemon(client) => client.request(&message).await.context("Request to daemon failed"),
            Signer::Embedded(signer) => Ok(signer.request(message).await),
        }
    }

    pub async fn identity(&self) -> Result<Option<Identity>> {
        match self {
            Signer::Daemon(client) => Ok(client.identity().await?),
            Signer::Embedded(signer) => signer.settings().identity().await,
        }
    }

    pub async fn generate_key(&self) -> Result<Identity> {
        match self {
            Signer::Daemon(client) => Ok(client.generate_key().await?),
            Signer::Embedded(signer) => signer.settings().generate_key().await,
        }
    }

    pub async fn import_key(&self, key: &str) -> Result<Identity> {
        match self {
            Signer::Daemon(client) => Ok(client.import_key(key).await?),
            Signer::Embedded(signer) => signer.settings().import_key(key).await,
        }
    }

    /// The secret key never crosses the daemon's HTTP surface, so export
    /// only works against the state file directly.
    pub async fn export_key(&self) -> Result<Option<String>> {
        match self {
            Signer::Daemon(_) => anyhow::bail!("Key export is only available while the daemon is stopped"),
            Signer::Embedded(signer) => signer.settings().export_nsec().await,
        }
    }

    pub async fn clear_key(&self) -> Result<()> {
        match self {
            Signer::Daemon(client) => Ok(client.clear_key().await?),
            Signer::Embedded(signer) => signer.settings().clear_key().await,
        }
    }

    pub async fn relays(&self) -> Result<RelayList> {
        match self {
            Signer::Daemon(client) => Ok(client.relays().await?),
            Signer::Embedded(signer) => signer.settings().relays().await,
        }
    }

    pub async fn set_relay(&self, url: &str, policy: RelayPolicy) -> Result<RelayList> {
        match self {
            Signer::Daemon(client) => Ok(client.set_relay(url, policy).await?),
            Signer::Embedded(signer) => signer.settings().set_relay(url, policy).await,
        }
    }

    pub async fn remove_relay(&self, url: &str) -> Result<bool> {
        match self {
            Signer::Daemon(client) => Ok(client.remove_relay(url).await?),
            Signer::Embedded(signer) => signer.settings().remove_relay(url).await,
        }
    }

    pub async fn policies(&self, query: PolicyQuery) -> Result<Vec<PolicyRecord>> {
        match self {
            Signer::Daemon(client) => Ok(client.policies(&query).await?),
            Signer::Embedded(signer) => signer.settings().list_policies(&query.into()).await,
        }
    }

    pub async fn revoke_policies(&self, revocation: PolicyRevocation) -> Result<usize> {
        match self {
            Signer::Daemon(client) => Ok(client.revoke_policies(&revocation).await?),
            Signer::Embedded(signer) => {
                signer
                    .settings()
                    .revoke_policies(&revocation.host, revocation.decision, revocation.action)
                    .await
            }
        }
    }

    pub async fn settings(&self) -> Result<SettingsView> {
        match self {
            Signer::Daemon(client) => Ok(client.settings().await?),
            Signer::Embedded(signer) => Ok(SettingsView {
                notifications: signer.settings().notifications().await?,
                protocol_handler: signer.settings().protocol_handler().await?,
            }),
        }
    }

    pub async fn set_notifications(&self, enabled: bool) -> Result<()> {
        match self {
            Signer::Daemon(client) => Ok(client.set_notifications(enabled).await?),
            Signer::Embedded(signer) => signer.settings().set_notifications(enabled).await,
        }
    }

    pub async fn set_protocol_handler(&self, template: Option<String>) -> Result<()> {
        match self {
            Signer::Daemon(client) => Ok(client.set_protocol_handler(template).await?),
            Signer::Embedded(signer) => signer.settings().set_protocol_handler(template).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn export_is_refused_through_the_daemon() {
        // Nothing listens here; the refusal must not depend on reaching it
        let signer = Signer::Daemon(KeywardClient::new("http://127.0.0.1:9").trusted());
        let err = signer.export_key().await.unwrap_err();
        assert!(err.to_string().contains("daemon is stopped"));
    }
}
