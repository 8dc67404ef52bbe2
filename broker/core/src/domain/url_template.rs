// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Protocol-handler templates for `nostr:` links.
//!
//! A template such as `https://njump.me/{raw}` is filled from the decoded
//! identifier. Placeholders may carry spaces inside the braces (`{ hex }`),
//! values the identifier does not have become empty strings, and anything
//! not in the known set is left as written.

use regex::{Captures, Regex};
use std::sync::LazyLock;
use thiserror::Error;

use crate::domain::nip19::{Nip19, Nip19Error};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{ *(raw|hrp|hex|p_or_e|u_or_n|relay0|relay1|relay2) *\}")
        .expect("placeholder pattern compiles")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("not a nostr link: {0}")]
    NotANostrLink(String),

    #[error("identifier cannot be linked: {0}")]
    UnsupportedIdentifier(&'static str),

    #[error(transparent)]
    Decode(#[from] Nip19Error),
}

/// Fields a link can refer to, extracted from one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFields {
    pub raw: String,
    pub hrp: &'static str,
    pub hex: String,
    pub p_or_e: &'static str,
    pub u_or_n: &'static str,
    pub relays: Vec<String>,
}

impl LinkFields {
    /// Parses `nostr:<bech32>` (or `web+nostr:<bech32>`).
    pub fn from_link(url: &str) -> Result<Self, TemplateError> {
        let raw = url
            .split_once("nostr:")
            .map(|(_, rest)| rest.trim())
            .filter(|rest| !rest.is_empty())
            .ok_or_else(|| TemplateError::NotANostrLink(url.to_string()))?;

        let decoded = Nip19::decode(raw)?;
        let hrp = decoded.hrp();
        let (hex, p_or_e, u_or_n, relays) = match decoded {
            Nip19::Pubkey(hex) => (hex, "p", "u", Vec::new()),
            Nip19::Note(hex) => (hex, "e", "n", Vec::new()),
            Nip19::Profile { pubkey, relays } => (pubkey, "p", "u", relays),
            Nip19::Event { id, relays, .. } => (id, "e", "n", relays),
            Nip19::SecretKey(_) => return Err(TemplateError::UnsupportedIdentifier("nsec")),
        };

        Ok(Self {
            raw: raw.to_string(),
            hrp,
            hex,
            p_or_e,
            u_or_n,
            relays,
        })
    }

    fn value(&self, placeholder: &str) -> &str {
        let relay = |i: usize| self.relays.get(i).map(String::as_str).unwrap_or("");
        match placeholder {
            "raw" => &self.raw,
            "hrp" => self.hrp,
            "hex" => &self.hex,
            "p_or_e" => self.p_or_e,
            "u_or_n" => self.u_or_n,
            "relay0" => relay(0),
            "relay1" => relay(1),
            "relay2" => relay(2),
            _ => "",
        }
    }
}

pub fn render(template: &str, fields: &LinkFields) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| fields.value(&caps[1]).to_string())
        .into_owned()
}

/// Resolves `url` against `template` in one step.
pub fn replace_url(template: &str, url: &str) -> Result<String, TemplateError> {
    Ok(render(template, &LinkFields::from_link(url)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NJUMP: &str = "https://njump.me/{raw}";

    const NPUB: &str = "npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg";
    const NPUB_HEX: &str = "7e7e9c42a91bfef19fa929e5fda1b72e0ebc1a4c1141673e2794234d86addf4e";
    const NPROFILE: &str = "nprofile1qqsrhuxx8l9ex335q7he0f09aej04zpazpl0ne2cgukyawd24mayt8gpp4mhxue69uhhytnc9e3k7mgpz4mhxue69uhkg6nzv9ejuumpv34kytnrdaksjlyr9p";

    #[test]
    fn default_handler_uses_raw() {
        let url = format!("nostr:{}", NPUB);
        assert_eq!(
            replace_url(NJUMP, &url).unwrap(),
            format!("https://njump.me/{}", NPUB)
        );
    }

    #[test]
    fn placeholders_tolerate_spaces_and_unknowns_survive() {
        let url = format!("web+nostr:{}", NPUB);
        let out = replace_url("https://x/{ hrp }/{hex}?{p_or_e}={u_or_n}&{other}", &url).unwrap();
        assert_eq!(out, format!("https://x/npub/{}?p=u&{{other}}", NPUB_HEX));
    }

    #[test]
    fn profile_relays_fill_and_missing_are_empty() {
        let url = format!("nostr:{}", NPROFILE);
        let out = replace_url("{relay0}|{relay1}|{relay2}", &url).unwrap();
        assert_eq!(out, "wss://r.x.com|wss://djbas.sadkb.com|");
    }

    #[test]
    fn rejects_non_links_and_secret_keys() {
        assert!(matches!(
            replace_url(NJUMP, "https://example.com"),
            Err(TemplateError::NotANostrLink(_))
        ));
        let nsec = "nostr:nsec1vl029mgpspedva04g90vltkh6fvh240zqtv9k0t9af8935ke9laqsnlfe5";
        assert_eq!(
            replace_url(NJUMP, nsec),
            Err(TemplateError::UnsupportedIdentifier("nsec"))
        );
    }
}
