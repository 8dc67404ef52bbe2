// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Crypto Operator
//!
//! The only component that reads the private key. Everything outside this
//! module works with a [`KeyHandle`], which exposes operations over the key
//! and never the key itself.
//!
//! ## Operations
//!
//! | operation            | function                               |
//! |----------------------|----------------------------------------|
//! | derive public key    | [`KeyHandle::public_key_hex`]          |
//! | compute digest       | [`event_signing::compute_digest`]      |
//! | sign                 | [`event_signing::sign_event`]          |
//! | validate structure   | [`event_signing::validate_structure`]  |
//! | encrypt / decrypt    | [`nip44::encrypt`] / [`nip44::decrypt`]|

pub mod event_signing;
pub mod keys;
pub mod nip44;

use std::sync::Arc;
use thiserror::Error;

pub use keys::{derive_public_key, generate_secret_key, parse_secret_key, KeyHandle};

use crate::domain::error::AuthError;
use crate::domain::repository::{SettingsRepository, StoreError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("invalid peer public key: {0}")]
    InvalidPeerKey(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("event id {declared} does not match computed digest {computed}")]
    IdMismatch { declared: String, computed: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),
}

impl From<CryptoError> for AuthError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidEvent(_) | CryptoError::IdMismatch { .. } => AuthError::InvalidEvent(e.to_string()),
            other => AuthError::OperationFailed(other.to_string()),
        }
    }
}

/// Loads the stored key into a [`KeyHandle`].
#[derive(Clone)]
pub struct CryptoOperator {
    settings: Arc<dyn SettingsRepository>,
}

impl CryptoOperator {
    pub fn new(settings: Arc<dyn SettingsRepository>) -> Self {
        Self { settings }
    }

    /// `Ok(None)` when no key is configured.
    pub async fn load_key(&self) -> Result<Option<KeyHandle>, KeyLoadError> {
        match self.settings.private_key().await? {
            Some(secret) if !secret.trim().is_empty() => Ok(Some(KeyHandle::from_hex(&secret)?)),
            _ => Ok(None),
        }
    }

    pub async fn has_key(&self) -> Result<bool, StoreError> {
        Ok(self
            .settings
            .private_key()
            .await?
            .is_some_and(|secret| !secret.trim().is_empty()))
    }
}

#[derive(Debug, Error)]
pub enum KeyLoadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<KeyLoadError> for AuthError {
    fn from(e: KeyLoadError) -> Self {
        AuthError::OperationFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::state_store::InMemoryStateStore;

    #[tokio::test]
    async fn load_key_reflects_settings() {
        let store = Arc::new(InMemoryStateStore::new());
        let operator = CryptoOperator::new(store.clone());
        assert!(operator.load_key().await.unwrap().is_none());
        assert!(!operator.has_key().await.unwrap());

        let secret = generate_secret_key();
        store.set_private_key(Some(secret.clone())).await.unwrap();
        let handle = operator.load_key().await.unwrap().unwrap();
        assert_eq!(handle.public_key_hex(), derive_public_key(&secret).unwrap());
        assert!(operator.has_key().await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_key_is_an_operation_failure() {
        let store = Arc::new(InMemoryStateStore::new());
        store.set_private_key(Some("not-hex".to_string())).await.unwrap();
        let err = CryptoOperator::new(store).load_key().await.unwrap_err();
        assert!(matches!(AuthError::from(err), AuthError::OperationFailed(_)));
    }

    #[test]
    fn id_mismatch_maps_to_invalid_event() {
        let err = CryptoError::IdMismatch {
            declared: "a".into(),
            computed: "b".into(),
        };
        assert!(matches!(AuthError::from(err), AuthError::InvalidEvent(_)));
        assert!(matches!(
            AuthError::from(CryptoError::Decryption("invalid MAC".into())),
            AuthError::OperationFailed(_)
        ));
    }
}
