// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! NIP-19 bech32 identifiers: `npub`, `nsec`, `note`, and the TLV-encoded
//! `nprofile` / `nevent`.

use bech32::{Bech32, Hrp};
use thiserror::Error;

const TLV_SPECIAL: u8 = 0;
const TLV_RELAY: u8 = 1;
const TLV_AUTHOR: u8 = 2;
const TLV_KIND: u8 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Nip19Error {
    #[error("bech32 error: {0}")]
    Bech32(String),

    #[error("unsupported prefix: {0}")]
    UnsupportedPrefix(String),

    #[error("expected 32 bytes, got {0}")]
    BadLength(usize),

    #[error("malformed TLV: {0}")]
    MalformedTlv(&'static str),

    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// A decoded identifier. Byte payloads are lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nip19 {
    Pubkey(String),
    SecretKey(String),
    Note(String),
    Profile {
        pubkey: String,
        relays: Vec<String>,
    },
    Event {
        id: String,
        relays: Vec<String>,
        author: Option<String>,
        kind: Option<u32>,
    },
}

impl Nip19 {
    pub fn hrp(&self) -> &'static str {
        match self {
            Nip19::Pubkey(_) => "npub",
            Nip19::SecretKey(_) => "nsec",
            Nip19::Note(_) => "note",
            Nip19::Profile { .. } => "nprofile",
            Nip19::Event { .. } => "nevent",
        }
    }

    pub fn decode(encoded: &str) -> Result<Self, Nip19Error> {
        let (hrp, data) = bech32::decode(encoded.trim()).map_err(|e| Nip19Error::Bech32(e.to_string()))?;
        match hrp.to_lowercase().as_str() {
            "npub" => Ok(Nip19::Pubkey(hex32(&data)?)),
            "nsec" => Ok(Nip19::SecretKey(hex32(&data)?)),
            "note" => Ok(Nip19::Note(hex32(&data)?)),
            "nprofile" => {
                let mut pubkey = None;
                let mut relays = Vec::new();
                for (t, v) in tlv_entries(&data)? {
                    match t {
                        TLV_SPECIAL => pubkey = Some(hex32(v)?),
                        TLV_RELAY => relays.push(String::from_utf8_lossy(v).into_owned()),
                        _ => {}
                    }
                }
                let pubkey = pubkey.ok_or(Nip19Error::MalformedTlv("nprofile without pubkey"))?;
                Ok(Nip19::Profile { pubkey, relays })
            }
            "nevent" => {
                let mut id = None;
                let mut relays = Vec::new();
                let mut author = None;
                let mut kind = None;
                for (t, v) in tlv_entries(&data)? {
                    match t {
                        TLV_SPECIAL => id = Some(hex32(v)?),
                        TLV_RELAY => relays.push(String::from_utf8_lossy(v).into_owned()),
                        TLV_AUTHOR => author = Some(hex32(v)?),
                        TLV_KIND => {
                            let bytes: [u8; 4] = v.try_into().map_err(|_| Nip19Error::MalformedTlv("kind must be 4 bytes"))?;
                            kind = Some(u32::from_be_bytes(bytes));
                        }
                        _ => {}
                    }
                }
                let id = id.ok_or(Nip19Error::MalformedTlv("nevent without id"))?;
                Ok(Nip19::Event { id, relays, author, kind })
            }
            other => Err(Nip19Error::UnsupportedPrefix(other.to_string())),
        }
    }

    pub fn encode(&self) -> Result<String, Nip19Error> {
        let data = match self {
            Nip19::Pubkey(hex) | Nip19::SecretKey(hex) | Nip19::Note(hex) => bytes32(hex)?.to_vec(),
            Nip19::Profile { pubkey, relays } => {
                let mut out = Vec::new();
                push_tlv(&mut out, TLV_SPECIAL, &bytes32(pubkey)?)?;
                for relay in relays {
                    push_tlv(&mut out, TLV_RELAY, relay.as_bytes())?;
                }
                out
            }
            Nip19::Event { id, relays, author, kind } => {
                let mut out = Vec::new();
                push_tlv(&mut out, TLV_SPECIAL, &bytes32(id)?)?;
                for relay in relays {
                    push_tlv(&mut out, TLV_RELAY, relay.as_bytes())?;
                }
                if let Some(author) = author {
                    push_tlv(&mut out, TLV_AUTHOR, &bytes32(author)?)?;
                }
                if let Some(kind) = kind {
                    push_tlv(&mut out, TLV_KIND, &kind.to_be_bytes())?;
                }
                out
            }
        };

        let hrp = Hrp::parse(self.hrp()).map_err(|e| Nip19Error::Bech32(e.to_string()))?;
        bech32::encode::<Bech32>(hrp, &data).map_err(|e| Nip19Error::Bech32(e.to_string()))
    }
}

fn hex32(bytes: &[u8]) -> Result<String, Nip19Error> {
    if bytes.len() != 32 {
        return Err(Nip19Error::BadLength(bytes.len()));
    }
    Ok(hex::encode(bytes))
}

fn bytes32(hex_str: &str) -> Result<[u8; 32], Nip19Error> {
    let bytes = hex::decode(hex_str).map_err(|e| Nip19Error::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| Nip19Error::BadLength(len))
}

fn tlv_entries(data: &[u8]) -> Result<Vec<(u8, &[u8])>, Nip19Error> {
    let mut entries = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let [t, l, tail @ ..] = rest else {
            return Err(Nip19Error::MalformedTlv("truncated header"));
        };
        let len = *l as usize;
        if tail.len() < len {
            return Err(Nip19Error::MalformedTlv("value shorter than declared length"));
        }
        entries.push((*t, &tail[..len]));
        rest = &tail[len..];
    }
    Ok(entries)
}

fn push_tlv(out: &mut Vec<u8>, t: u8, value: &[u8]) -> Result<(), Nip19Error> {
    let len = u8::try_from(value.len()).map_err(|_| Nip19Error::MalformedTlv("value longer than 255 bytes"))?;
    out.push(t);
    out.push(len);
    out.extend_from_slice(value);
    Ok(())
}
