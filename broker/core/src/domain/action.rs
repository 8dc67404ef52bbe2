// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Action Types and Requests
//!
//! Every capability a caller can ask for is a variant of [`ActionType`]. The
//! split between actions that need no authorization ([`OpenRequest`]) and the
//! ones the broker gates ([`GatedRequest`]) is expressed in the type system:
//! [`Request::parse`] matches exhaustively on [`ActionType`], so a new action
//! cannot be added without deciding which side it belongs to.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::event::SignableEvent;

/// Identifier of a calling party. Case-sensitive, compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    /// Derives the origin from a caller URL the way browsers report senders:
    /// the host, plus the port when one is explicit.
    pub fn from_url(raw: &str) -> Result<Self, RequestError> {
        let parsed = url::Url::parse(raw)
            .map_err(|e| RequestError::InvalidOrigin(format!("{}: {}", raw, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| RequestError::InvalidOrigin(format!("{} has no host", raw)))?;
        Ok(match parsed.port() {
            Some(port) => Self(format!("{}:{}", host, port)),
            None => Self(host.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Origin {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "getPublicKey")]
    GetPublicKey,
    #[serde(rename = "getRelays")]
    GetRelays,
    #[serde(rename = "signEvent")]
    SignEvent,
    #[serde(rename = "nip44.encrypt")]
    Encrypt,
    #[serde(rename = "nip44.decrypt")]
    Decrypt,
    #[serde(rename = "replaceURL")]
    ReplaceUrl,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::GetPublicKey,
        ActionType::GetRelays,
        ActionType::SignEvent,
        ActionType::Encrypt,
        ActionType::Decrypt,
        ActionType::ReplaceUrl,
    ];

    /// Wire name, also used as the key in the persisted policy map.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::GetPublicKey => "getPublicKey",
            ActionType::GetRelays => "getRelays",
            ActionType::SignEvent => "signEvent",
            ActionType::Encrypt => "nip44.encrypt",
            ActionType::Decrypt => "nip44.decrypt",
            ActionType::ReplaceUrl => "replaceURL",
        }
    }

    /// Membership in the no-permission set. These never reach the broker's
    /// critical section and never touch the key.
    pub fn requires_permission(&self) -> bool {
        match self {
            ActionType::ReplaceUrl => false,
            ActionType::GetPublicKey
            | ActionType::GetRelays
            | ActionType::SignEvent
            | ActionType::Encrypt
            | ActionType::Decrypt => true,
        }
    }

    /// Human wording shown by consent prompts ("<host> is requesting your
    /// permission to ...").
    pub fn permission_label(&self) -> &'static str {
        match self {
            ActionType::GetPublicKey => "read your public key",
            ActionType::GetRelays => "read your list of preferred relays",
            ActionType::SignEvent => "sign events using your private key",
            ActionType::Encrypt => "encrypt messages to peers",
            ActionType::Decrypt => "decrypt messages from peers",
            ActionType::ReplaceUrl => "open nostr links",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ActionType::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| RequestError::UnknownAction(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RequestError {
    #[error("unknown action type: {0}")]
    UnknownAction(String),

    #[error("invalid params for {action}: {reason}")]
    InvalidParams { action: ActionType, reason: String },

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
}

/// Actions in the no-permission set.
#[derive(Debug, Clone, PartialEq)]
pub enum OpenRequest {
    ReplaceUrl { url: String },
}

impl OpenRequest {
    pub fn action(&self) -> ActionType {
        match self {
            OpenRequest::ReplaceUrl { .. } => ActionType::ReplaceUrl,
        }
    }
}

/// Actions that must pass the broker before they reach the key.
#[derive(Debug, Clone, PartialEq)]
pub enum GatedRequest {
    GetPublicKey,
    GetRelays,
    SignEvent { event: SignableEvent },
    Encrypt { peer: String, plaintext: String },
    Decrypt { peer: String, ciphertext: String },
}

impl GatedRequest {
    pub fn action(&self) -> ActionType {
        match self {
            GatedRequest::GetPublicKey => ActionType::GetPublicKey,
            GatedRequest::GetRelays => ActionType::GetRelays,
            GatedRequest::SignEvent { .. } => ActionType::SignEvent,
            GatedRequest::Encrypt { .. } => ActionType::Encrypt,
            GatedRequest::Decrypt { .. } => ActionType::Decrypt,
        }
    }

    /// Event kind used for conditional policy lookup. Only `signEvent`
    /// carries one.
    pub fn event_kind(&self) -> Option<u32> {
        match self {
            GatedRequest::SignEvent { event } => event.kind,
            _ => None,
        }
    }

    /// Params as shown to the human deciding on the request. Plaintexts and
    /// ciphertexts are shown since the user is consenting to exactly them.
    pub fn display_params(&self) -> Value {
        match self {
            GatedRequest::GetPublicKey | GatedRequest::GetRelays => Value::Null,
            GatedRequest::SignEvent { event } => {
                serde_json::json!({ "event": event })
            }
            GatedRequest::Encrypt { peer, plaintext } => {
                serde_json::json!({ "peer": peer, "plaintext": plaintext })
            }
            GatedRequest::Decrypt { peer, ciphertext } => {
                serde_json::json!({ "peer": peer, "ciphertext": ciphertext })
            }
        }
    }

    /// Params as recorded in decision events. Plaintexts and ciphertexts stay
    /// out of the audit trail.
    pub fn audit_params(&self) -> Value {
        match self {
            GatedRequest::GetPublicKey | GatedRequest::GetRelays => Value::Null,
            GatedRequest::SignEvent { event } => serde_json::json!({ "event": event }),
            GatedRequest::Encrypt { peer, .. } | GatedRequest::Decrypt { peer, .. } => {
                serde_json::json!({ "peer": peer })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Open(OpenRequest),
    Gated(GatedRequest),
}

#[derive(Deserialize)]
struct SignEventParams {
    event: SignableEvent,
}

#[derive(Deserialize)]
struct EncryptParams {
    peer: String,
    plaintext: String,
}

#[derive(Deserialize)]
struct DecryptParams {
    peer: String,
    ciphertext: String,
}

#[derive(Deserialize)]
struct ReplaceUrlParams {
    url: String,
}

impl Request {
    /// Builds a typed request from the wire `type` and its `params` object.
    pub fn parse(action: ActionType, params: Value) -> Result<Self, RequestError> {
        let request = match action {
            ActionType::GetPublicKey => Request::Gated(GatedRequest::GetPublicKey),
            ActionType::GetRelays => Request::Gated(GatedRequest::GetRelays),
            ActionType::SignEvent => {
                let SignEventParams { event } = serde_json::from_value(params)
                    .map_err(|e| RequestError::InvalidEvent(e.to_string()))?;
                Request::Gated(GatedRequest::SignEvent { event })
            }
            ActionType::Encrypt => {
                let EncryptParams { peer, plaintext } = typed_params(action, params)?;
                Request::Gated(GatedRequest::Encrypt { peer, plaintext })
            }
            ActionType::Decrypt => {
                let DecryptParams { peer, ciphertext } = typed_params(action, params)?;
                Request::Gated(GatedRequest::Decrypt { peer, ciphertext })
            }
            ActionType::ReplaceUrl => {
                let ReplaceUrlParams { url } = typed_params(action, params)?;
                Request::Open(OpenRequest::ReplaceUrl { url })
            }
        };

        debug_assert_eq!(request.action().requires_permission(), matches!(request, Request::Gated(_)));
        Ok(request)
    }

    pub fn action(&self) -> ActionType {
        match self {
            Request::Open(open) => open.action(),
            Request::Gated(gated) => gated.action(),
        }
    }
}

fn typed_params<T: DeserializeOwned>(action: ActionType, params: Value) -> Result<T, RequestError> {
    serde_json::from_value(params).map_err(|e| RequestError::InvalidParams {
        action,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_names_round_trip_through_from_str() {
        for action in ActionType::ALL {
            assert_eq!(action.as_str().parse::<ActionType>().unwrap(), action);
        }
        assert!(matches!(
            "nip04.encrypt".parse::<ActionType>(),
            Err(RequestError::UnknownAction(_))
        ));
    }

    #[test]
    fn only_replace_url_skips_authorization() {
        let open: Vec<_> = ActionType::ALL
            .into_iter()
            .filter(|a| !a.requires_permission())
            .collect();
        assert_eq!(open, vec![ActionType::ReplaceUrl]);
    }

    #[test]
    fn parse_routes_to_gated_or_open() {
        let req = Request::parse(ActionType::GetPublicKey, json!({})).unwrap();
        assert_eq!(req, Request::Gated(GatedRequest::GetPublicKey));

        let req = Request::parse(ActionType::ReplaceUrl, json!({"url": "nostr:npub1x"})).unwrap();
        assert!(matches!(req, Request::Open(OpenRequest::ReplaceUrl { .. })));
    }

    #[test]
    fn sign_event_params_failure_is_invalid_event() {
        let err = Request::parse(ActionType::SignEvent, json!({"event": {"kind": "one"}})).unwrap_err();
        assert!(matches!(err, RequestError::InvalidEvent(_)));
    }

    #[test]
    fn encrypt_requires_peer() {
        let err = Request::parse(ActionType::Encrypt, json!({"plaintext": "hi"})).unwrap_err();
        assert!(matches!(err, RequestError::InvalidParams { action: ActionType::Encrypt, .. }));
    }

    #[test]
    fn sign_event_exposes_kind_for_policy_lookup() {
        let req = Request::parse(
            ActionType::SignEvent,
            json!({"event": {"kind": 7, "content": "+", "created_at": 1700000000, "tags": []}}),
        )
        .unwrap();
        match req {
            Request::Gated(gated) => assert_eq!(gated.event_kind(), Some(7)),
            _ => panic!("signEvent must be gated"),
        }
    }

    #[test]
    fn origin_from_url_keeps_explicit_port() {
        assert_eq!(Origin::from_url("https://example.com/app").unwrap().as_str(), "example.com");
        assert_eq!(Origin::from_url("http://localhost:5173/").unwrap().as_str(), "localhost:5173");
        assert!(Origin::from_url("not a url").is_err());
    }
}
