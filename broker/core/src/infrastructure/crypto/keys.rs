// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! secp256k1 key material.
//!
//! [`KeyHandle`] is what the rest of the crate gets to hold: it can derive the
//! public key, sign, encrypt and decrypt, but it never hands the secret back.

use k256::schnorr::SigningKey;
use rand_core::OsRng;
use std::fmt;

use super::CryptoError;
use crate::domain::nip19::Nip19;

pub struct KeyHandle {
    signing_key: SigningKey,
}

impl KeyHandle {
    pub(crate) fn from_hex(secret_hex: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(secret_hex.trim()).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let signing_key = SigningKey::from_bytes(&bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// BIP-340 x-only public key, lowercase hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub(super) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Fresh random secret key as 64 hex characters.
pub fn generate_secret_key() -> String {
    hex::encode(SigningKey::random(&mut OsRng).to_bytes())
}

/// Accepts a secret key as 64 hex characters or as `nsec1...` and returns the
/// normalized hex form.
pub fn parse_secret_key(input: &str) -> Result<String, CryptoError> {
    let input = input.trim();
    let hex_key = if input.starts_with("nsec1") {
        match Nip19::decode(input).map_err(|e| CryptoError::InvalidKey(e.to_string()))? {
            Nip19::SecretKey(hex_key) => hex_key,
            _ => return Err(CryptoError::InvalidKey("not an nsec".to_string())),
        }
    } else {
        input.to_lowercase()
    };

    // Rejects zero and out-of-range scalars as well as bad hex
    KeyHandle::from_hex(&hex_key)?;
    Ok(hex_key)
}

/// Public key for a stored secret, without keeping a handle around.
pub fn derive_public_key(secret_hex: &str) -> Result<String, CryptoError> {
    Ok(KeyHandle::from_hex(secret_hex)?.public_key_hex())
}

/// Parses a peer's x-only public key.
pub(super) fn peer_point(peer_hex: &str) -> Result<k256::PublicKey, CryptoError> {
    let x = hex::decode(peer_hex.trim()).map_err(|e| CryptoError::InvalidPeerKey(e.to_string()))?;
    if x.len() != 32 {
        return Err(CryptoError::InvalidPeerKey(format!("expected 32 bytes, got {}", x.len())));
    }
    let mut sec1 = Vec::with_capacity(33);
    sec1.push(0x02);
    sec1.extend_from_slice(&x);
    k256::PublicKey::from_sec1_bytes(&sec1).map_err(|e| CryptoError::InvalidPeerKey(e.to_string()))
}
