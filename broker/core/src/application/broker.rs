// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Authorization Broker
//!
//! Decides whether an origin may use the key for an action, asks the human
//! when nothing is on record, remembers the answer when told to, and only
//! then lets the crypto operator act.
//!
//! ## Pipeline
//!
//! ```text
//! Request::Open  ──────────────────────────────────────────────► open effect
//! Request::Gated ─► key? ─► [lock] policy ─► prompt? ─► put? [unlock] ─► load key ─► operator
//! ```
//!
//! The lock is taken before the first policy read and held across the
//! prompt, so a second request can neither see a stale "no policy" answer
//! nor open a second prompt. The guard is released on every exit path by
//! drop. The id of the open prompt is published beside the lock so it can be
//! read without waiting on it.
//!
//! ## Relationships
//!
//! - reads and writes [`PolicyRepository`]
//! - opens the [`PromptChannel`]
//! - hands the request to the [`CryptoOperator`]
//! - publishes [`AuthorizationEvent`]s on the [`EventBus`]

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::domain::action::{ActionType, GatedRequest, OpenRequest, Origin, Request};
use crate::domain::error::AuthError;
use crate::domain::event::SignableEvent;
use crate::domain::events::{AuthorizationEvent, DecisionSource};
use crate::domain::policy::Decision;
use crate::domain::prompt::{CorrelationId, PromptChannel, PromptOutcome, PromptRequest};
use crate::domain::relay::RelayList;
use crate::domain::repository::{PolicyRepository, SettingsRepository, StoreError};
use crate::domain::url_template;
use crate::infrastructure::crypto::{event_signing, nip44, CryptoOperator, KeyHandle};
use crate::infrastructure::event_bus::EventBus;

/// Successful result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    PublicKey(String),
    Relays(RelayList),
    SignedEvent(SignableEvent),
    Ciphertext(String),
    Plaintext(String),
    /// Resolved link, `None` when no protocol handler is configured.
    Url(Option<String>),
}

impl Payload {
    /// Wire form of the result.
    pub fn to_json(&self) -> Value {
        match self {
            Payload::PublicKey(hex) => Value::String(hex.clone()),
            Payload::Relays(relays) => serde_json::to_value(relays).unwrap_or(Value::Null),
            Payload::SignedEvent(event) => serde_json::to_value(event).unwrap_or(Value::Null),
            Payload::Ciphertext(text) | Payload::Plaintext(text) => Value::String(text.clone()),
            Payload::Url(Some(url)) => Value::String(url.clone()),
            Payload::Url(None) => Value::Bool(false),
        }
    }
}

#[async_trait]
pub trait AuthorizationService: Send + Sync {
    async fn authorize(&self, origin: &Origin, request: Request) -> Result<Payload, AuthError>;
}

/// Proof that the caller holds the serialization lock.
type DecisionToken<'a> = MutexGuard<'a, ()>;

/// Publishes the open prompt's id until dropped.
struct OpenPromptMark<'a> {
    open: &'a parking_lot::Mutex<Option<CorrelationId>>,
}

impl Drop for OpenPromptMark<'_> {
    fn drop(&mut self) {
        *self.open.lock() = None;
    }
}

pub struct AuthorizationBroker {
    policies: Arc<dyn PolicyRepository>,
    settings: Arc<dyn SettingsRepository>,
    crypto: CryptoOperator,
    prompts: Arc<dyn PromptChannel>,
    event_bus: EventBus,
    slot: Mutex<()>,
    open_prompt: parking_lot::Mutex<Option<CorrelationId>>,
}

impl AuthorizationBroker {
    pub fn new(
        policies: Arc<dyn PolicyRepository>,
        settings: Arc<dyn SettingsRepository>,
        prompts: Arc<dyn PromptChannel>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            crypto: CryptoOperator::new(settings.clone()),
            policies,
            settings,
            prompts,
            event_bus,
            slot: Mutex::new(()),
            open_prompt: parking_lot::Mutex::new(None),
        }
    }

    /// Correlation id of the prompt currently awaiting an answer.
    pub fn pending_prompt(&self) -> Option<CorrelationId> {
        *self.open_prompt.lock()
    }

    fn mark_open(&self, _token: &DecisionToken<'_>, id: CorrelationId) -> OpenPromptMark<'_> {
        *self.open_prompt.lock() = Some(id);
        OpenPromptMark {
            open: &self.open_prompt,
        }
    }

    async fn acquire(&self) -> DecisionToken<'_> {
        self.slot.lock().await
    }

    async fn perform_open(&self, request: OpenRequest) -> Result<Payload, AuthError> {
        match request {
            OpenRequest::ReplaceUrl { url } => {
                let template = self.settings.protocol_handler().await.map_err(store_failure)?;
                let Some(template) = template.filter(|t| !t.trim().is_empty()) else {
                    return Ok(Payload::Url(None));
                };
                url_template::replace_url(&template, &url)
                    .map(|resolved| Payload::Url(Some(resolved)))
                    .map_err(|e| AuthError::OperationFailed(e.to_string()))
            }
        }
    }

    async fn authorize_gated(&self, origin: &Origin, request: GatedRequest) -> Result<Payload, AuthError> {
        let action = request.action();

        // Without a key there is nothing to consent to
        if !self.crypto.has_key().await.map_err(store_failure)? {
            debug!(origin = %origin, action = %action, "No key configured, refusing before prompting");
            return Err(AuthError::NoKey);
        }

        self.decide(origin, &request).await?;
        self.execute(origin, request).await
    }

    /// Steps 2 to 7: lock, look up, maybe prompt, maybe remember, unlock.
    /// `Ok(())` means allowed.
    async fn decide(&self, origin: &Origin, request: &GatedRequest) -> Result<(), AuthError> {
        let action = request.action();
        let token = self.acquire().await;

        let stored = self
            .policies
            .get(origin, action, request.event_kind())
            .await
            .map_err(store_failure)?;

        if let Some(decision) = stored {
            drop(token);
            debug!(origin = %origin, action = %action, decision = %decision, "Decided by stored policy");
            self.decision_made(origin, request, decision.is_allow(), DecisionSource::StoredPolicy);
            return allowed_or_denied(decision.is_allow());
        }

        let correlation_id = CorrelationId::new();
        let prompt = PromptRequest {
            id: correlation_id,
            host: origin.clone(),
            action,
            params: request.display_params(),
        };

        let mark = self.mark_open(&token, correlation_id);
        info!(origin = %origin, action = %action, correlation_id = %correlation_id, "Asking for a decision");
        self.event_bus.publish_authorization_event(AuthorizationEvent::PromptOpened {
            correlation_id,
            origin: origin.clone(),
            action,
            opened_at: Utc::now(),
        });

        let outcome = self.prompts.open(prompt).await;
        drop(mark);

        let resolution = match outcome {
            Ok(PromptOutcome::Answered(resolution)) => resolution,
            Ok(PromptOutcome::Abandoned) => {
                drop(token);
                info!(origin = %origin, action = %action, correlation_id = %correlation_id, "Prompt abandoned, refusing");
                self.prompt_abandoned(origin, action, correlation_id);
                return Err(AuthError::ChannelAborted);
            }
            Err(e) => {
                drop(token);
                warn!(origin = %origin, action = %action, error = %e, "Prompt could not be shown, refusing");
                self.prompt_abandoned(origin, action, correlation_id);
                return Err(AuthError::ChannelAborted);
            }
        };

        if let Some(conditions) = resolution.conditions {
            let decision = Decision::from_accept(resolution.accept);
            self.policies
                .put(origin, action, decision, conditions.clone())
                .await
                .map_err(|e| {
                    error!(origin = %origin, action = %action, error = %e, "Failed to remember decision");
                    store_failure(e)
                })?;
            info!(origin = %origin, action = %action, decision = %decision, "Decision remembered");
            self.event_bus.publish_authorization_event(AuthorizationEvent::PolicyUpdated {
                origin: origin.clone(),
                action,
                decision,
                conditions,
                updated_at: Utc::now(),
            });
        }

        drop(token);
        self.decision_made(origin, request, resolution.accept, DecisionSource::Prompt);
        allowed_or_denied(resolution.accept)
    }

    /// Steps 8 and 9: load the key, run the operation inside a fault boundary.
    async fn execute(&self, origin: &Origin, request: GatedRequest) -> Result<Payload, AuthError> {
        let action = request.action();
        let key = self.crypto.load_key().await?.ok_or(AuthError::NoKey)?;

        let outcome = AssertUnwindSafe(self.dispatch(&key, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(AuthError::OperationFailed(panic_detail(panic.as_ref()))));

        match &outcome {
            Ok(_) => {
                debug!(origin = %origin, action = %action, "Operation completed");
                self.event_bus.publish_authorization_event(AuthorizationEvent::OperationCompleted {
                    origin: origin.clone(),
                    action,
                    completed_at: Utc::now(),
                });
            }
            Err(e) => {
                warn!(origin = %origin, action = %action, error = %e, "Operation failed");
                self.event_bus.publish_authorization_event(AuthorizationEvent::OperationFailed {
                    origin: origin.clone(),
                    action,
                    reason: e.to_string(),
                    failed_at: Utc::now(),
                });
            }
        }
        outcome
    }

    async fn dispatch(&self, key: &KeyHandle, request: GatedRequest) -> Result<Payload, AuthError> {
        match request {
            GatedRequest::GetPublicKey => Ok(Payload::PublicKey(key.public_key_hex())),
            GatedRequest::GetRelays => Ok(Payload::Relays(self.settings.relays().await.map_err(store_failure)?)),
            GatedRequest::SignEvent { event } => Ok(Payload::SignedEvent(event_signing::sign_event(key, event)?)),
            GatedRequest::Encrypt { peer, plaintext } => Ok(Payload::Ciphertext(nip44::encrypt(key, &peer, &plaintext)?)),
            GatedRequest::Decrypt { peer, ciphertext } => Ok(Payload::Plaintext(nip44::decrypt(key, &peer, &ciphertext)?)),
        }
    }

    fn decision_made(&self, origin: &Origin, request: &GatedRequest, allowed: bool, source: DecisionSource) {
        self.event_bus.publish_authorization_event(AuthorizationEvent::DecisionMade {
            origin: origin.clone(),
            action: request.action(),
            allowed,
            source,
            params: request.audit_params(),
            decided_at: Utc::now(),
        });
    }

    fn prompt_abandoned(&self, origin: &Origin, action: ActionType, correlation_id: CorrelationId) {
        self.event_bus.publish_authorization_event(AuthorizationEvent::PromptAbandoned {
            correlation_id,
            origin: origin.clone(),
            action,
            abandoned_at: Utc::now(),
        });
    }
}

#[async_trait]
impl AuthorizationService for AuthorizationBroker {
    async fn authorize(&self, origin: &Origin, request: Request) -> Result<Payload, AuthError> {
        match request {
            Request::Open(open) => self.perform_open(open).await,
            Request::Gated(gated) => self.authorize_gated(origin, gated).await,
        }
    }
}

fn allowed_or_denied(allowed: bool) -> Result<(), AuthError> {
    if allowed {
        Ok(())
    } else {
        Err(AuthError::Denied)
    }
}

fn store_failure(e: StoreError) -> AuthError {
    AuthError::OperationFailed(e.to_string())
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("operator panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("operator panicked: {}", message)
    } else {
        "operator panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::Conditions;
    use crate::domain::prompt::{PromptError, PromptResolution};
    use crate::infrastructure::crypto::generate_secret_key;
    use crate::infrastructure::state_store::InMemoryStateStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every prompt with the same resolution and counts them.
    struct FixedAnswer {
        outcome: PromptOutcome,
        opened: AtomicUsize,
    }

    #[async_trait]
    impl PromptChannel for FixedAnswer {
        async fn open(&self, _request: PromptRequest) -> Result<PromptOutcome, PromptError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    fn broker_with(store: Arc<InMemoryStateStore>, outcome: PromptOutcome) -> (AuthorizationBroker, Arc<FixedAnswer>) {
        let prompts = Arc::new(FixedAnswer {
            outcome,
            opened: AtomicUsize::new(0),
        });
        let broker = AuthorizationBroker::new(store.clone(), store, prompts.clone(), EventBus::new(16));
        (broker, prompts)
    }

    async fn keyed_store() -> Arc<InMemoryStateStore> {
        let store = Arc::new(InMemoryStateStore::new());
        store.set_private_key(Some(generate_secret_key())).await.unwrap();
        store
    }

    #[tokio::test]
    async fn replace_url_without_handler_is_false() {
        let (broker, prompts) = broker_with(Arc::new(InMemoryStateStore::new()), PromptOutcome::Abandoned);
        let request = Request::Open(OpenRequest::ReplaceUrl {
            url: "nostr:npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg".into(),
        });
        let payload = broker.authorize(&Origin::new("example.com"), request).await.unwrap();
        assert_eq!(payload.to_json(), Value::Bool(false));
        assert_eq!(prompts.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn replace_url_uses_handler_without_key_or_prompt() {
        let store = Arc::new(InMemoryStateStore::new());
        store.set_protocol_handler(Some("https://njump.me/{ raw }".into())).await.unwrap();
        let (broker, prompts) = broker_with(store, PromptOutcome::Abandoned);
        let npub = "npub10elfcs4fr0l0r8af98jlmgdh9c8tcxjvz9qkw038js35mp4dma8qzvjptg";
        let request = Request::Open(OpenRequest::ReplaceUrl { url: format!("nostr:{}", npub) });
        let payload = broker.authorize(&Origin::new("example.com"), request).await.unwrap();
        assert_eq!(payload, Payload::Url(Some(format!("https://njump.me/{}", npub))));
        assert_eq!(prompts.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stored_deny_refuses_without_prompt() {
        let store = keyed_store().await;
        let origin = Origin::new("example.com");
        store
            .put(&origin, ActionType::GetRelays, Decision::Deny, Conditions::unconditional())
            .await
            .unwrap();
        let (broker, prompts) = broker_with(store, PromptOutcome::Answered(PromptResolution::once(true)));

        let err = broker
            .authorize(&origin, Request::Gated(GatedRequest::GetRelays))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Denied);
        assert_eq!(prompts.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_time_accept_writes_no_policy() {
        let store = keyed_store().await;
        let origin = Origin::new("example.com");
        let (broker, prompts) = broker_with(store.clone(), PromptOutcome::Answered(PromptResolution::once(true)));

        for _ in 0..2 {
            broker
                .authorize(&origin, Request::Gated(GatedRequest::GetPublicKey))
                .await
                .unwrap();
        }
        assert_eq!(prompts.opened.load(Ordering::SeqCst), 2);
        assert!(store.snapshot().await.policies.is_empty());
    }

    #[tokio::test]
    async fn remembered_rejection_is_persisted() {
        let store = keyed_store().await;
        let origin = Origin::new("example.com");
        let (broker, prompts) = broker_with(
            store.clone(),
            PromptOutcome::Answered(PromptResolution::remember(false, Conditions::kinds([4]))),
        );

        let event = SignableEvent::new(4, "secret", 1_700_000_000, vec![]);
        let err = broker
            .authorize(&origin, Request::Gated(GatedRequest::SignEvent { event: event.clone() }))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::Denied);
        assert_eq!(
            store.get(&origin, ActionType::SignEvent, Some(4)).await.unwrap(),
            Some(Decision::Deny)
        );

        broker
            .authorize(&origin, Request::Gated(GatedRequest::SignEvent { event }))
            .await
            .unwrap_err();
        assert_eq!(prompts.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abandoned_prompt_is_channel_aborted_and_not_a_decision() {
        let store = keyed_store().await;
        let (broker, _) = broker_with(store.clone(), PromptOutcome::Abandoned);
        let mut events = broker.event_bus.subscribe();

        let err = broker
            .authorize(&Origin::new("example.com"), Request::Gated(GatedRequest::GetPublicKey))
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::ChannelAborted);
        assert!(err.is_denial());
        assert!(store.snapshot().await.policies.is_empty());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.iter().any(|e| matches!(
            e,
            crate::infrastructure::event_bus::DomainEvent::Authorization(AuthorizationEvent::PromptAbandoned { .. })
        )));
        assert!(!seen.iter().any(|e| matches!(
            e,
            crate::infrastructure::event_bus::DomainEvent::Authorization(AuthorizationEvent::DecisionMade { .. })
        )));
        assert!(broker.pending_prompt().is_none());
    }

    /// Never answers.
    struct Unanswered;

    #[async_trait]
    impl PromptChannel for Unanswered {
        async fn open(&self, _request: PromptRequest) -> Result<PromptOutcome, PromptError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn open_prompt_is_visible_until_the_request_goes_away() {
        let store = keyed_store().await;
        let broker = Arc::new(AuthorizationBroker::new(
            store.clone(),
            store,
            Arc::new(Unanswered),
            EventBus::new(16),
        ));
        let mut events = broker.event_bus.subscribe();
        assert!(broker.pending_prompt().is_none());

        let requester = broker.clone();
        let handle = tokio::spawn(async move {
            requester
                .authorize(&Origin::new("example.com"), Request::Gated(GatedRequest::GetPublicKey))
                .await
        });

        let opened = loop {
            if let Ok(crate::infrastructure::event_bus::DomainEvent::Authorization(
                AuthorizationEvent::PromptOpened { correlation_id, .. },
            )) = events.recv().await
            {
                break correlation_id;
            }
        };
        assert_eq!(broker.pending_prompt(), Some(opened));

        handle.abort();
        let _ = handle.await;
        assert!(broker.pending_prompt().is_none());
    }

    #[tokio::test]
    async fn operator_failure_is_operation_failed() {
        let store = keyed_store().await;
        let (broker, _) = broker_with(store, PromptOutcome::Answered(PromptResolution::once(true)));
        let err = broker
            .authorize(
                &Origin::new("example.com"),
                Request::Gated(GatedRequest::Decrypt {
                    peer: "zz".into(),
                    ciphertext: "irrelevant".into(),
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::OperationFailed(_)));
    }

    #[test]
    fn panic_detail_reads_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_detail(boxed.as_ref()), "operator panicked: boom");
    }
}
