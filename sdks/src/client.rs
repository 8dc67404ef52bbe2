// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::types::*;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("signer returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The signer answered with `{error}`.
    #[error("request refused: {}", wire_error_text(.0))]
    Refused(WireError),

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Whether the signer said no (stored policy, the human, or a closed prompt).
    pub fn is_denied(&self) -> bool {
        matches!(self, TransportError::Refused(WireError::Text(text)) if text == "denied")
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Client for a keyward signer daemon.
///
/// External clients are identified by the `host` they declare; the trusted
/// client (the signer's own CLI) uses the internal routes and additionally
/// manages settings and answers prompts.
#[derive(Debug, Clone)]
pub struct KeywardClient {
    base_url: String,
    client: Client,
    caller: Caller,
}

impl KeywardClient {
    /// Client for an external application.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            caller: Caller::External,
        }
    }

    /// Client for the local daemon listening on `port`, using the internal routes.
    pub fn local(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{}", port)).trusted()
    }

    pub fn trusted(mut self) -> Self {
        self.caller = Caller::Trusted;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn is_healthy(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    /// Sends a raw request and returns the envelope as received.
    pub async fn request(&self, message: &InboundMessage) -> Result<InboundResponse> {
        let path = match self.caller {
            Caller::External => "/api/request",
            Caller::Trusted => "/api/internal/request",
        };
        self.post(path, message).await
    }

    /// Sends a request and unwraps `{result}`, turning `{error}` into
    /// [`TransportError::Refused`].
    pub async fn call(&self, host: &str, action: ActionType, params: Value) -> Result<Value> {
        let message = InboundMessage {
            action: action.as_str().to_string(),
            params,
            host: Some(host.to_string()),
        };
        match self.request(&message).await? {
            InboundResponse::Success { result } => Ok(result),
            InboundResponse::Failure { error } => Err(TransportError::Refused(error)),
        }
    }

    pub async fn get_public_key(&self, host: &str) -> Result<String> {
        decode(self.call(host, ActionType::GetPublicKey, json!({})).await?)
    }

    pub async fn get_relays(&self, host: &str) -> Result<RelayList> {
        decode(self.call(host, ActionType::GetRelays, json!({})).await?)
    }

    pub async fn sign_event(&self, host: &str, event: &SignableEvent) -> Result<SignableEvent> {
        decode(self.call(host, ActionType::SignEvent, json!({ "event": event })).await?)
    }

    pub async fn encrypt(&self, host: &str, peer: &str, plaintext: &str) -> Result<String> {
        let params = json!({ "peer": peer, "plaintext": plaintext });
        decode(self.call(host, ActionType::Encrypt, params).await?)
    }

    pub async fn decrypt(&self, host: &str, peer: &str, ciphertext: &str) -> Result<String> {
        let params = json!({ "peer": peer, "ciphertext": ciphertext });
        decode(self.call(host, ActionType::Decrypt, params).await?)
    }

    /// `None` when the signer has no protocol handler configured.
    pub async fn replace_url(&self, host: &str, url: &str) -> Result<Option<String>> {
        match self.call(host, ActionType::ReplaceUrl, json!({ "url": url })).await? {
            Value::Bool(false) => Ok(None),
            other => decode(other).map(Some),
        }
    }

    // Prompts

    pub async fn pending_prompts(&self) -> Result<Vec<PendingPromptInfo>> {
        self.get("/api/prompts").await
    }

    pub async fn resolve_prompt(&self, message: &PromptResolutionMessage) -> Result<CorrelationId> {
        let handled: PromptHandled = self.post("/api/prompts/resolve", message).await?;
        Ok(handled.id)
    }

    pub async fn close_prompt(&self, id: Option<CorrelationId>) -> Result<CorrelationId> {
        let handled: PromptHandled = self.post("/api/prompts/close", &ClosePrompt { id }).await?;
        Ok(handled.id)
    }

    // Settings

    pub async fn identity(&self) -> Result<Option<Identity>> {
        self.get("/api/internal/identity").await
    }

    pub async fn generate_key(&self) -> Result<Identity> {
        self.post("/api/internal/key/generate", &json!({})).await
    }

    pub async fn import_key(&self, key: &str) -> Result<Identity> {
        self.post("/api/internal/key/import", &KeyImport { key: key.to_string() })
            .await
    }

    pub async fn clear_key(&self) -> Result<()> {
        self.post_no_content("/api/internal/key/clear", &json!({})).await
    }

    pub async fn relays(&self) -> Result<RelayList> {
        self.get("/api/internal/relays").await
    }

    pub async fn set_relay(&self, url: &str, policy: RelayPolicy) -> Result<RelayList> {
        let update = RelayUpdate {
            url: url.to_string(),
            read: policy.read,
            write: policy.write,
        };
        self.post("/api/internal/relays", &update).await
    }

    pub async fn remove_relay(&self, url: &str) -> Result<bool> {
        let removed: Removed = self
            .post("/api/internal/relays/remove", &RelayRemoval { url: url.to_string() })
            .await?;
        Ok(removed.removed > 0)
    }

    pub async fn policies(&self, query: &PolicyQuery) -> Result<Vec<PolicyRecord>> {
        let mut pairs = url::form_urlencoded::Serializer::new(String::new());
        if let Some(host) = &query.host {
            pairs.append_pair("host", host.as_str());
        }
        if let Some(decision) = query.decision {
            pairs.append_pair("decision", &decision.to_string());
        }
        if let Some(action) = query.action {
            pairs.append_pair("type", action.as_str());
        }
        let pairs = pairs.finish();
        if pairs.is_empty() {
            self.get("/api/internal/policies").await
        } else {
            self.get(&format!("/api/internal/policies?{}", pairs)).await
        }
    }

    pub async fn revoke_policies(&self, revocation: &PolicyRevocation) -> Result<usize> {
        let removed: Removed = self.post("/api/internal/policies/revoke", revocation).await?;
        Ok(removed.removed)
    }

    pub async fn settings(&self) -> Result<SettingsView> {
        self.get("/api/internal/settings").await
    }

    pub async fn set_notifications(&self, enabled: bool) -> Result<()> {
        self.post_no_content("/api/internal/settings/notifications", &NotificationsUpdate { enabled })
            .await
    }

    pub async fn set_protocol_handler(&self, template: Option<String>) -> Result<()> {
        self.post_no_content(
            "/api/internal/settings/protocol-handler",
            &ProtocolHandlerUpdate { template },
        )
        .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        parse(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        parse(response).await
    }

    async fn post_no_content<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        check_status(response).await.map(|_| ())
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    Err(TransportError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn external_call_unwraps_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/request")
            .match_body(Matcher::PartialJson(json!({"type": "getPublicKey", "host": "example.com"})))
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":"abcd"}"#)
            .create_async()
            .await;

        let client = KeywardClient::new(server.url());
        assert_eq!(client.get_public_key("example.com").await.unwrap(), "abcd");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn refusals_surface_as_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/internal/request")
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"denied"}"#)
            .create_async()
            .await;

        let client = KeywardClient::new(server.url()).trusted();
        let err = client.get_relays("keyward").await.unwrap_err();
        assert!(err.is_denied());
    }

    #[tokio::test]
    async fn replace_url_false_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/request")
            .with_header("content-type", "application/json")
            .with_body(r#"{"result":false}"#)
            .create_async()
            .await;

        let client = KeywardClient::new(server.url());
        assert_eq!(client.replace_url("example.com", "nostr:npub1x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn http_errors_carry_the_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/prompts/close")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"no pending prompt matches this resolution"}"#)
            .create_async()
            .await;

        let client = KeywardClient::new(server.url()).trusted();
        match client.close_prompt(None).await.unwrap_err() {
            TransportError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "no pending prompt matches this resolution");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
