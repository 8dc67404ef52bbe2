// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event ids and BIP-340 signatures.

use k256::schnorr::{Signature, VerifyingKey};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use super::keys::KeyHandle;
use super::CryptoError;
use crate::domain::event::SignableEvent;

/// SHA-256 of the canonical serialization, as lowercase hex.
pub fn compute_digest(event: &SignableEvent) -> Result<String, CryptoError> {
    let canonical = event
        .canonical_json()
        .ok_or_else(|| CryptoError::InvalidEvent(event.structural_problems().join(", ")))?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

/// Required fields present and well-formed, and a declared `id` equal to the
/// recomputed digest.
pub fn validate_structure(event: &SignableEvent) -> Result<(), CryptoError> {
    let problems = event.structural_problems();
    if !problems.is_empty() {
        return Err(CryptoError::InvalidEvent(problems.join(", ")));
    }
    let digest = compute_digest(event)?;
    match &event.id {
        Some(id) if *id != digest => Err(CryptoError::IdMismatch {
            declared: id.clone(),
            computed: digest,
        }),
        Some(_) => Ok(()),
        None => Err(CryptoError::InvalidEvent("missing id".to_string())),
    }
}

/// Fills `pubkey` and `id` where absent, validates, and signs.
pub fn sign_event(key: &KeyHandle, mut event: SignableEvent) -> Result<SignableEvent, CryptoError> {
    let own = key.public_key_hex();
    match &event.pubkey {
        None => event.pubkey = Some(own),
        Some(pubkey) if *pubkey != own => {
            return Err(CryptoError::InvalidEvent(
                "pubkey does not belong to the signing key".to_string(),
            ));
        }
        Some(_) => {}
    }

    if event.id.is_none() {
        event.id = Some(compute_digest(&event)?);
    }
    validate_structure(&event)?;

    let digest = match &event.id {
        Some(id) => hex::decode(id).map_err(|e| CryptoError::InvalidEvent(e.to_string()))?,
        None => return Err(CryptoError::InvalidEvent("missing id".to_string())),
    };
    event.sig = Some(hex::encode(sign_digest(key, &digest)?));
    Ok(event)
}

/// BIP-340 signature over a 32-byte digest with fresh auxiliary randomness.
pub fn sign_digest(key: &KeyHandle, digest: &[u8]) -> Result<[u8; 64], CryptoError> {
    let mut aux_rand = [0u8; 32];
    OsRng.fill_bytes(&mut aux_rand);
    let signature = key
        .signing_key()
        .sign_raw(digest, &aux_rand)
        .map_err(|e| CryptoError::Signing(e.to_string()))?;
    Ok(signature.to_bytes())
}

/// Checks structure, id and signature against the event's own pubkey.
pub fn verify_event(event: &SignableEvent) -> Result<(), CryptoError> {
    validate_structure(event)?;

    let (Some(pubkey), Some(id), Some(sig)) = (&event.pubkey, &event.id, &event.sig) else {
        return Err(CryptoError::InvalidSignature);
    };
    let pubkey = hex::decode(pubkey).map_err(|_| CryptoError::InvalidSignature)?;
    let digest = hex::decode(id).map_err(|_| CryptoError::InvalidSignature)?;
    let sig = hex::decode(sig).map_err(|_| CryptoError::InvalidSignature)?;

    let verifying_key = VerifyingKey::from_bytes(&pubkey).map_err(|_| CryptoError::InvalidSignature)?;
    let signature = Signature::try_from(sig.as_slice()).map_err(|_| CryptoError::InvalidSignature)?;
    verifying_key
        .verify_raw(&digest, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::crypto::keys::generate_secret_key;

    fn key() -> KeyHandle {
        KeyHandle::from_hex(&generate_secret_key()).unwrap()
    }

    fn hello() -> SignableEvent {
        SignableEvent::new(1, "hello", 1_700_000_000, vec![])
    }

    #[test]
    fn digest_is_sha256_of_canonical_array() {
        let mut event = hello();
        event.pubkey = Some("a".repeat(64));
        let expected = hex::encode(Sha256::digest(
            format!(r#"[0,"{}",1700000000,1,[],"hello"]"#, "a".repeat(64)).as_bytes(),
        ));
        assert_eq!(compute_digest(&event).unwrap(), expected);
    }

    #[test]
    fn digest_escapes_content() {
        let mut event = SignableEvent::new(1, "line\n\"quoted\"", 1, vec![vec!["t".into(), "x".into()]]);
        event.pubkey = Some("b".repeat(64));
        let expected = hex::encode(Sha256::digest(
            format!(r#"[0,"{}",1,1,[["t","x"]],"line\n\"quoted\""]"#, "b".repeat(64)).as_bytes(),
        ));
        assert_eq!(compute_digest(&event).unwrap(), expected);
    }

    #[test]
    fn signed_event_validates_and_verifies() {
        let key = key();
        let signed = sign_event(&key, hello()).unwrap();
        assert_eq!(signed.pubkey.as_deref(), Some(key.public_key_hex().as_str()));
        assert_eq!(signed.sig.as_ref().map(String::len), Some(128));
        validate_structure(&signed).unwrap();
        verify_event(&signed).unwrap();
    }

    #[test]
    fn tampered_content_fails_verification() {
        let key = key();
        let mut signed = sign_event(&key, hello()).unwrap();
        signed.content = Some("goodbye".to_string());
        assert!(matches!(verify_event(&signed), Err(CryptoError::IdMismatch { .. })));
    }

    #[test]
    fn foreign_signature_fails_verification() {
        let signed = sign_event(&key(), hello()).unwrap();
        let other = sign_event(&key(), hello()).unwrap();
        let mut forged = signed.clone();
        forged.sig = other.sig;
        assert!(matches!(verify_event(&forged), Err(CryptoError::InvalidSignature)));
    }

    #[test]
    fn caller_supplied_wrong_id_is_rejected() {
        let mut event = hello();
        event.id = Some("0".repeat(64));
        assert!(matches!(sign_event(&key(), event), Err(CryptoError::IdMismatch { .. })));
    }

    #[test]
    fn foreign_pubkey_is_rejected() {
        let mut event = hello();
        event.pubkey = Some(key().public_key_hex());
        assert!(matches!(sign_event(&key(), event), Err(CryptoError::InvalidEvent(_))));
    }

    #[test]
    fn missing_fields_are_reported() {
        let mut event = hello();
        event.kind = None;
        let err = sign_event(&key(), event).unwrap_err();
        match err {
            CryptoError::InvalidEvent(detail) => assert!(detail.contains("missing kind")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
