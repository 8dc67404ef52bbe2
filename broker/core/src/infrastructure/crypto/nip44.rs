// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! NIP-44 v2 authenticated encryption.
//!
//! conversation key = HKDF-extract(salt = "nip44-v2", ECDH x-coordinate)
//! message keys     = HKDF-expand(conversation key, nonce, 76)
//!                  = chacha key (32) || chacha nonce (12) || hmac key (32)
//! payload          = base64(0x02 || nonce || ciphertext || mac)
//!
//! The MAC covers `nonce || ciphertext` and is checked before anything is
//! decrypted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;

use super::keys::{peer_point, KeyHandle};
use super::CryptoError;

const VERSION: u8 = 2;
const SALT: &[u8] = b"nip44-v2";
const MIN_PLAINTEXT: usize = 1;
const MAX_PLAINTEXT: usize = 65535;
const MIN_PAYLOAD_B64: usize = 132;
const MAX_PAYLOAD_B64: usize = 87472;
const MIN_PAYLOAD: usize = 99;
const MAX_PAYLOAD: usize = 65603;

type HmacSha256 = Hmac<Sha256>;

struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

pub(super) fn conversation_key(key: &KeyHandle, peer_hex: &str) -> Result<[u8; 32], CryptoError> {
    let peer = peer_point(peer_hex)?;
    let secret = k256::SecretKey::from_bytes(&key.signing_key().to_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
    let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), shared.raw_secret_bytes());
    let mut out = [0u8; 32];
    out.copy_from_slice(&prk);
    Ok(out)
}

fn message_keys(conversation_key: &[u8; 32], nonce: &[u8; 32]) -> Result<MessageKeys, CryptoError> {
    let hkdf = Hkdf::<Sha256>::from_prk(conversation_key).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    let mut okm = [0u8; 76];
    hkdf.expand(nonce, &mut okm)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut keys = MessageKeys {
        chacha_key: [0u8; 32],
        chacha_nonce: [0u8; 12],
        hmac_key: [0u8; 32],
    };
    keys.chacha_key.copy_from_slice(&okm[0..32]);
    keys.chacha_nonce.copy_from_slice(&okm[32..44]);
    keys.hmac_key.copy_from_slice(&okm[44..76]);
    Ok(keys)
}

pub(super) fn calc_padded_len(unpadded_len: usize) -> usize {
    if unpadded_len <= 32 {
        return 32;
    }
    let next_power = 1usize << (usize::BITS - (unpadded_len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((unpadded_len - 1) / chunk + 1)
}

fn pad(plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let len = plaintext.len();
    if !(MIN_PLAINTEXT..=MAX_PLAINTEXT).contains(&len) {
        return Err(CryptoError::Encryption(format!(
            "plaintext must be {}..={} bytes, got {}",
            MIN_PLAINTEXT, MAX_PLAINTEXT, len
        )));
    }
    let mut padded = Vec::with_capacity(2 + calc_padded_len(len));
    padded.extend_from_slice(&(len as u16).to_be_bytes());
    padded.extend_from_slice(plaintext);
    padded.resize(2 + calc_padded_len(len), 0);
    Ok(padded)
}

fn unpad(padded: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let [hi, lo, rest @ ..] = padded else {
        return Err(CryptoError::Decryption("invalid padding".to_string()));
    };
    let len = u16::from_be_bytes([*hi, *lo]) as usize;
    if len < MIN_PLAINTEXT || len > rest.len() || padded.len() != 2 + calc_padded_len(len) {
        return Err(CryptoError::Decryption("invalid padding".to_string()));
    }
    Ok(rest[..len].to_vec())
}

fn mac(hmac_key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<HmacSha256, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(hmac_key).map_err(|e| CryptoError::Encryption(e.to_string()))?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac)
}

pub(super) fn encrypt_with_nonce(
    conversation_key: &[u8; 32],
    plaintext: &str,
    nonce: [u8; 32],
) -> Result<String, CryptoError> {
    let keys = message_keys(conversation_key, &nonce)?;
    let mut buffer = pad(plaintext.as_bytes())?;
    ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into()).apply_keystream(&mut buffer);
    let tag = mac(&keys.hmac_key, &nonce, &buffer)?.finalize().into_bytes();

    let mut payload = Vec::with_capacity(1 + 32 + buffer.len() + 32);
    payload.push(VERSION);
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&buffer);
    payload.extend_from_slice(&tag);
    Ok(BASE64.encode(payload))
}

pub(super) fn encrypt_with_conversation_key(conversation_key: &[u8; 32], plaintext: &str) -> Result<String, CryptoError> {
    let mut nonce = [0u8; 32];
    OsRng.fill_bytes(&mut nonce);
    encrypt_with_nonce(conversation_key, plaintext, nonce)
}

pub(super) fn decrypt_with_conversation_key(conversation_key: &[u8; 32], payload: &str) -> Result<String, CryptoError> {
    if payload.starts_with('#') {
        return Err(CryptoError::Decryption("unsupported encryption version".to_string()));
    }
    if !(MIN_PAYLOAD_B64..=MAX_PAYLOAD_B64).contains(&payload.len()) {
        return Err(CryptoError::Decryption("invalid payload size".to_string()));
    }
    let data = BASE64
        .decode(payload)
        .map_err(|e| CryptoError::Decryption(format!("invalid base64: {}", e)))?;
    if !(MIN_PAYLOAD..=MAX_PAYLOAD).contains(&data.len()) {
        return Err(CryptoError::Decryption("invalid payload size".to_string()));
    }
    if data[0] != VERSION {
        return Err(CryptoError::Decryption(format!("unknown encryption version {}", data[0])));
    }

    let mut nonce = [0u8; 32];
    nonce.copy_from_slice(&data[1..33]);
    let ciphertext = &data[33..data.len() - 32];
    let tag = &data[data.len() - 32..];

    let keys = message_keys(conversation_key, &nonce)?;
    mac(&keys.hmac_key, &nonce, ciphertext)?
        .verify_slice(tag)
        .map_err(|_| CryptoError::Decryption("invalid MAC".to_string()))?;

    let mut buffer = ciphertext.to_vec();
    ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into()).apply_keystream(&mut buffer);
    let plaintext = unpad(&buffer)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption("plaintext is not UTF-8".to_string()))
}

pub fn encrypt(key: &KeyHandle, peer_hex: &str, plaintext: &str) -> Result<String, CryptoError> {
    encrypt_with_conversation_key(&conversation_key(key, peer_hex)?, plaintext)
}

pub fn decrypt(key: &KeyHandle, peer_hex: &str, payload: &str) -> Result<String, CryptoError> {
    decrypt_with_conversation_key(&conversation_key(key, peer_hex)?, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::crypto::keys::generate_secret_key;

    fn key() -> KeyHandle {
        KeyHandle::from_hex(&generate_secret_key()).unwrap()
    }

    #[test]
    fn padded_lengths_follow_power_of_two_chunks() {
        let cases = [
            (1, 32),
            (16, 32),
            (32, 32),
            (33, 64),
            (37, 64),
            (64, 64),
            (65, 96),
            (100, 128),
            (256, 256),
            (257, 320),
            (383, 384),
            (384, 384),
            (385, 448),
            (1000, 1024),
            (65535, 65536),
        ];
        for (len, padded) in cases {
            assert_eq!(calc_padded_len(len), padded, "len {}", len);
        }
    }

    #[test]
    fn conversation_key_is_symmetric() {
        let alice = key();
        let bob = key();
        assert_eq!(
            conversation_key(&alice, &bob.public_key_hex()).unwrap(),
            conversation_key(&bob, &alice.public_key_hex()).unwrap()
        );
    }

    #[test]
    fn decrypt_inverts_encrypt_between_peers() {
        let alice = key();
        let bob = key();
        for message in ["a", "hello nostr", &"x".repeat(1000), "ünïcødé 🔑"] {
            let payload = encrypt(&alice, &bob.public_key_hex(), message).unwrap();
            assert_eq!(decrypt(&bob, &alice.public_key_hex(), &payload).unwrap(), message);
        }
    }

    #[test]
    fn payload_layout_and_size() {
        let ck = [7u8; 32];
        let payload = encrypt_with_nonce(&ck, "hi", [1u8; 32]).unwrap();
        let raw = BASE64.decode(&payload).unwrap();
        assert_eq!(raw[0], 2);
        assert_eq!(&raw[1..33], &[1u8; 32]);
        assert_eq!(raw.len(), 1 + 32 + 2 + 32 + 32);
        assert_eq!(decrypt_with_conversation_key(&ck, &payload).unwrap(), "hi");
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let ck = [9u8; 32];
        let payload = encrypt_with_conversation_key(&ck, "attack at dawn").unwrap();
        let mut raw = BASE64.decode(&payload).unwrap();
        raw[40] ^= 0x01;
        let tampered = BASE64.encode(raw);
        assert!(matches!(
            decrypt_with_conversation_key(&ck, &tampered),
            Err(CryptoError::Decryption(msg)) if msg == "invalid MAC"
        ));
    }

    #[test]
    fn wrong_peer_fails_closed() {
        let alice = key();
        let bob = key();
        let mallory = key();
        let payload = encrypt(&alice, &bob.public_key_hex(), "for bob only").unwrap();
        assert!(decrypt(&bob, &mallory.public_key_hex(), &payload).is_err());
        assert!(decrypt(&mallory, &alice.public_key_hex(), &payload).is_err());
    }

    #[test]
    fn rejects_bad_inputs() {
        let ck = [3u8; 32];
        assert!(encrypt_with_conversation_key(&ck, "").is_err());
        assert!(encrypt_with_conversation_key(&ck, &"x".repeat(65536)).is_err());
        assert!(decrypt_with_conversation_key(&ck, "#unsupported").is_err());
        assert!(decrypt_with_conversation_key(&ck, "short").is_err());
        let mut raw = BASE64.decode(encrypt_with_conversation_key(&ck, "hello").unwrap()).unwrap();
        raw[0] = 1;
        assert!(decrypt_with_conversation_key(&ck, &BASE64.encode(raw)).is_err());
    }
}
