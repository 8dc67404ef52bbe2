// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Nostr event as submitted for signing.
//!
//! Callers routinely omit `pubkey` and `id` (the signer fills them in), so
//! every field is optional at the wire level. Structural checks happen in
//! [`SignableEvent::structural_problems`] and in the crypto operator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignableEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
}

impl SignableEvent {
    pub fn new(kind: u32, content: impl Into<String>, created_at: u64, tags: Vec<Vec<String>>) -> Self {
        Self {
            id: None,
            pubkey: None,
            created_at: Some(created_at),
            kind: Some(kind),
            tags: Some(tags),
            content: Some(content.into()),
            sig: None,
        }
    }

    /// Canonical serialization that the event id commits to:
    /// `[0, pubkey, created_at, kind, tags, content]` as compact JSON.
    ///
    /// Returns `None` when any committed field is missing.
    pub fn canonical_json(&self) -> Option<String> {
        let pubkey = self.pubkey.as_ref()?;
        let created_at = self.created_at?;
        let kind = self.kind?;
        let tags = self.tags.as_ref()?;
        let content = self.content.as_ref()?;
        Some(serde_json::json!([0, pubkey, created_at, kind, tags, content]).to_string())
    }

    /// Lists what keeps the event from being signable, ignoring `id`/`sig`.
    pub fn structural_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match &self.pubkey {
            None => problems.push("missing pubkey".to_string()),
            Some(pk) if !is_lower_hex(pk, 64) => problems.push("pubkey must be 64 lowercase hex characters".to_string()),
            Some(_) => {}
        }
        if self.created_at.is_none() {
            problems.push("missing created_at".to_string());
        }
        if self.kind.is_none() {
            problems.push("missing kind".to_string());
        }
        if self.tags.is_none() {
            problems.push("missing tags".to_string());
        }
        if self.content.is_none() {
            problems.push("missing content".to_string());
        }
        problems
    }
}

pub(crate) fn is_lower_hex(value: &str, len: usize) -> bool {
    value.len() == len && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn canonical_json_matches_nip01_layout() {
        let mut event = SignableEvent::new(1, "hello \"world\"\n", 1700000000, vec![vec!["t".into(), "nostr".into()]]);
        assert!(event.canonical_json().is_none());

        event.pubkey = Some(PK.to_string());
        assert_eq!(
            event.canonical_json().unwrap(),
            format!(r#"[0,"{}",1700000000,1,[["t","nostr"]],"hello \"world\"\n"]"#, PK)
        );
    }

    #[test]
    fn missing_fields_are_reported() {
        let event: SignableEvent = serde_json::from_str(r#"{"kind": 1, "content": "x"}"#).unwrap();
        let problems = event.structural_problems();
        assert!(problems.contains(&"missing pubkey".to_string()));
        assert!(problems.contains(&"missing created_at".to_string()));
        assert!(problems.contains(&"missing tags".to_string()));
        assert!(!problems.contains(&"missing kind".to_string()));
    }

    #[test]
    fn uppercase_pubkey_is_rejected() {
        let mut event = SignableEvent::new(1, "x", 1, vec![]);
        event.pubkey = Some(PK.to_uppercase());
        assert_eq!(event.structural_problems().len(), 1);
    }

    #[test]
    fn absent_optional_fields_are_not_serialized() {
        let event = SignableEvent::new(1, "x", 1, vec![]);
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("sig").is_none());
        assert_eq!(json["kind"], 1);
    }
}
