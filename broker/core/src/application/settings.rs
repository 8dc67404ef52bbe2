// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Settings management: the key, preferred relays, notifications, the
//! protocol handler and the remembered policies.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::domain::action::{ActionType, Origin};
use crate::domain::events::SettingsEvent;
use crate::domain::nip19::Nip19;
use crate::domain::policy::{Decision, PolicyFilter, PolicyRecord};
use crate::domain::relay::{RelayList, RelayPolicy};
use crate::domain::repository::{PolicyRepository, SettingsRepository};
use crate::infrastructure::crypto::{derive_public_key, generate_secret_key, parse_secret_key};
use crate::infrastructure::event_bus::EventBus;

/// Relays embedded in a shared profile identifier.
const PROFILE_RELAY_LIMIT: usize = 3;

/// Public identity derived from the stored key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub hex: String,
    pub npub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nprofile: Option<String>,
}

pub struct SettingsService {
    settings: Arc<dyn SettingsRepository>,
    policies: Arc<dyn PolicyRepository>,
    event_bus: EventBus,
}

impl SettingsService {
    pub fn new(settings: Arc<dyn SettingsRepository>, policies: Arc<dyn PolicyRepository>, event_bus: EventBus) -> Self {
        Self {
            settings,
            policies,
            event_bus,
        }
    }

    pub async fn generate_key(&self) -> Result<Identity> {
        self.store_key(generate_secret_key()).await
    }

    /// Accepts 64 hex characters or an `nsec`.
    pub async fn import_key(&self, input: &str) -> Result<Identity> {
        let secret = parse_secret_key(input).context("Invalid private key")?;
        self.store_key(secret).await
    }

    async fn store_key(&self, secret: String) -> Result<Identity> {
        let public_key = derive_public_key(&secret)?;
        self.settings
            .set_private_key(Some(secret))
            .await
            .context("Failed to store private key")?;
        info!(public_key = %public_key, "Private key stored");
        self.event_bus.publish_settings_event(SettingsEvent::KeyChanged {
            public_key: Some(public_key),
            changed_at: Utc::now(),
        });
        self.identity()
            .await?
            .context("Key vanished right after being stored")
    }

    pub async fn clear_key(&self) -> Result<()> {
        self.settings.set_private_key(None).await?;
        info!("Private key cleared");
        self.event_bus.publish_settings_event(SettingsEvent::KeyChanged {
            public_key: None,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    /// The stored key as `nsec`, for backup.
    pub async fn export_nsec(&self) -> Result<Option<String>> {
        match self.settings.private_key().await? {
            Some(secret) => Ok(Some(Nip19::SecretKey(secret).encode()?)),
            None => Ok(None),
        }
    }

    pub async fn identity(&self) -> Result<Option<Identity>> {
        let Some(secret) = self.settings.private_key().await? else {
            return Ok(None);
        };
        let hex = derive_public_key(&secret)?;
        let npub = Nip19::Pubkey(hex.clone()).encode()?;

        let relays = self.settings.relays().await?.write_relays(PROFILE_RELAY_LIMIT);
        let nprofile = if relays.is_empty() {
            None
        } else {
            Some(
                Nip19::Profile {
                    pubkey: hex.clone(),
                    relays,
                }
                .encode()?,
            )
        };

        Ok(Some(Identity { hex, npub, nprofile }))
    }

    pub async fn relays(&self) -> Result<RelayList> {
        Ok(self.settings.relays().await?)
    }

    /// Adds or replaces a relay. Blank URLs are rejected.
    pub async fn set_relay(&self, url: &str, policy: RelayPolicy) -> Result<RelayList> {
        if url.trim().is_empty() {
            anyhow::bail!("Relay URL cannot be empty");
        }
        let mut relays = self.settings.relays().await?;
        if relays.upsert(url, policy) {
            self.save_relays(relays.clone()).await?;
        }
        Ok(relays)
    }

    pub async fn remove_relay(&self, url: &str) -> Result<bool> {
        let mut relays = self.settings.relays().await?;
        let removed = relays.remove(url);
        if removed {
            self.save_relays(relays).await?;
        }
        Ok(removed)
    }

    async fn save_relays(&self, relays: RelayList) -> Result<()> {
        let relay_count = relays.len();
        self.settings.set_relays(relays).await?;
        self.event_bus.publish_settings_event(SettingsEvent::RelaysChanged {
            relay_count,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn notifications(&self) -> Result<bool> {
        Ok(self.settings.notifications().await?)
    }

    pub async fn set_notifications(&self, enabled: bool) -> Result<()> {
        self.settings.set_notifications(enabled).await?;
        self.event_bus.publish_settings_event(SettingsEvent::NotificationsToggled {
            enabled,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn protocol_handler(&self) -> Result<Option<String>> {
        Ok(self.settings.protocol_handler().await?)
    }

    /// `None` or a blank template clears the handler.
    pub async fn set_protocol_handler(&self, template: Option<String>) -> Result<()> {
        let template = template.filter(|t| !t.trim().is_empty());
        self.settings.set_protocol_handler(template.clone()).await?;
        self.event_bus.publish_settings_event(SettingsEvent::ProtocolHandlerChanged {
            template,
            changed_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn list_policies(&self, filter: &PolicyFilter) -> Result<Vec<PolicyRecord>> {
        Ok(self.policies.list(filter).await?)
    }

    pub async fn revoke_policies(&self, origin: &Origin, decision: Decision, action: Option<ActionType>) -> Result<usize> {
        let removed = self.policies.remove_all(origin, decision, action).await?;
        info!(origin = %origin, decision = %decision, action = ?action, removed, "Policies revoked");
        self.event_bus.publish_settings_event(SettingsEvent::PoliciesRevoked {
            origin: origin.clone(),
            decision,
            action,
            removed,
            revoked_at: Utc::now(),
        });
        Ok(removed)
    }
}
