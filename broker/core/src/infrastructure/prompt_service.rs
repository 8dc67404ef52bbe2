// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Human Prompt Service - the consent surface behind the HTTP API
//!
//! Holds at most one pending prompt. The broker opens it and awaits a single
//! outcome; a UI answers it through [`HumanPromptService::resolve`] or closes
//! it through [`HumanPromptService::close_surface`]. Closing, timing out or
//! dropping the waiting future all fulfil the prompt as abandoned, so the
//! broker is never left waiting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::domain::action::{ActionType, Origin};
use crate::domain::prompt::{
    CorrelationId, PromptChannel, PromptError, PromptOutcome, PromptRequest, PromptResolution,
    PromptResolutionMessage,
};

/// The single pending prompt
#[derive(Debug)]
struct PendingPrompt {
    request: PromptRequest,
    created_at: DateTime<Utc>,
    response_tx: oneshot::Sender<PromptOutcome>,
}

/// Information about the pending prompt (for serialization/API)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPromptInfo {
    pub id: CorrelationId,
    pub host: Origin,
    #[serde(rename = "type")]
    pub action: ActionType,
    pub params: serde_json::Value,
    pub summary: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

pub struct HumanPromptService {
    slot: Arc<Mutex<Option<PendingPrompt>>>,
    timeout: Option<Duration>,
}

impl HumanPromptService {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            timeout: None,
        }
    }

    /// Unanswered prompts resolve as abandoned after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            timeout: Some(timeout),
        }
    }

    /// Answers the pending prompt with a wire resolution message. Host and
    /// type must match the pending prompt, and the id too when present.
    pub fn resolve(&self, message: &PromptResolutionMessage) -> Result<CorrelationId, PromptError> {
        let pending = self
            .take_if(|pending| message.answers(&pending.request))
            .ok_or(PromptError::NoMatchingPrompt)?;
        let id = pending.request.id;

        info!(
            correlation_id = %id,
            origin = %pending.request.host,
            action = %pending.request.action,
            accept = message.accept,
            remember = message.conditions.is_some(),
            "Prompt resolved"
        );

        // Receiver may already be gone if the broker was cancelled
        let _ = pending.response_tx.send(PromptOutcome::Answered(message.resolution()));
        Ok(id)
    }

    /// Answers the pending prompt by id.
    pub fn resolve_id(&self, id: CorrelationId, resolution: PromptResolution) -> Result<(), PromptError> {
        let pending = self
            .take_if(|pending| pending.request.id == id)
            .ok_or(PromptError::NoMatchingPrompt)?;

        info!(correlation_id = %id, accept = resolution.accept, "Prompt resolved");
        let _ = pending.response_tx.send(PromptOutcome::Answered(resolution));
        Ok(())
    }

    /// The surface went away. `id = None` closes whatever is pending.
    pub fn close_surface(&self, id: Option<CorrelationId>) -> Result<CorrelationId, PromptError> {
        let pending = self
            .take_if(|pending| id.is_none_or(|id| pending.request.id == id))
            .ok_or(PromptError::NoMatchingPrompt)?;
        let closed = pending.request.id;

        info!(correlation_id = %closed, "Prompt surface closed without an answer");
        let _ = pending.response_tx.send(PromptOutcome::Abandoned);
        Ok(closed)
    }

    pub fn pending(&self) -> Option<PendingPromptInfo> {
        let timeout_seconds = self.timeout.map(|t| t.as_secs());
        self.slot.lock().as_ref().map(|pending| PendingPromptInfo {
            id: pending.request.id,
            host: pending.request.host.clone(),
            action: pending.request.action,
            params: pending.request.params.clone(),
            summary: pending.request.summary(),
            created_at: pending.created_at,
            timeout_seconds,
        })
    }

    fn take_if(&self, matches: impl FnOnce(&PendingPrompt) -> bool) -> Option<PendingPrompt> {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(matches) {
            slot.take()
        } else {
            None
        }
    }
}

impl Default for HumanPromptService {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the slot if the waiting future is dropped before an outcome.
struct SlotGuard {
    slot: Arc<Mutex<Option<PendingPrompt>>>,
    id: CorrelationId,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|pending| pending.request.id == self.id) {
            debug!(correlation_id = %self.id, "Discarding prompt left behind by a cancelled request");
            slot.take();
        }
    }
}

#[async_trait]
impl PromptChannel for HumanPromptService {
    async fn open(&self, request: PromptRequest) -> Result<PromptOutcome, PromptError> {
        let id = request.id;
        let (tx, rx) = oneshot::channel();

        {
            let mut slot = self.slot.lock();
            if let Some(existing) = slot.as_ref() {
                return Err(PromptError::AlreadyPending(existing.request.id));
            }
            info!(
                correlation_id = %id,
                origin = %request.host,
                action = %request.action,
                "Prompt opened"
            );
            *slot = Some(PendingPrompt {
                request,
                created_at: Utc::now(),
                response_tx: tx,
            });
        }

        let _guard = SlotGuard {
            slot: self.slot.clone(),
            id,
        };

        let outcome = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(correlation_id = %id, "Prompt timed out");
                    return Ok(PromptOutcome::Abandoned);
                }
            },
            None => rx.await,
        };

        // Sender dropped without an answer counts as abandoned
        Ok(outcome.unwrap_or(PromptOutcome::Abandoned))
    }
}

/// Bounds any prompt channel with a deadline. A prompt still open when the
/// deadline passes is dropped and reported as abandoned.
pub struct TimedPromptChannel {
    inner: Arc<dyn PromptChannel>,
    timeout: Duration,
}

impl TimedPromptChannel {
    pub fn new(inner: Arc<dyn PromptChannel>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl PromptChannel for TimedPromptChannel {
    async fn open(&self, request: PromptRequest) -> Result<PromptOutcome, PromptError> {
        let id = request.id;
        match tokio::time::timeout(self.timeout, self.inner.open(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(correlation_id = %id, "Prompt timed out");
                Ok(PromptOutcome::Abandoned)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::policy::Conditions;

    fn request(host: &str, action: ActionType) -> PromptRequest {
        PromptRequest {
            id: CorrelationId::new(),
            host: Origin::new(host),
            action,
            params: serde_json::Value::Null,
        }
    }

    async fn wait_for_pending(service: &HumanPromptService) -> PendingPromptInfo {
        for _ in 0..100 {
            if let Some(info) = service.pending() {
                return info;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("prompt never became pending");
    }

    #[tokio::test]
    async fn test_resolution_flow() {
        let service = Arc::new(HumanPromptService::new());
        let opener = service.clone();
        let handle = tokio::spawn(async move { opener.open(request("example.com", ActionType::GetPublicKey)).await });

        let info = wait_for_pending(&service).await;
        assert_eq!(info.summary, "example.com is requesting your permission to read your public key");

        let message = PromptResolutionMessage {
            prompt: true,
            id: None,
            host: Origin::new("example.com"),
            action: ActionType::GetPublicKey,
            accept: true,
            conditions: Some(Conditions::unconditional()),
        };
        assert_eq!(service.resolve(&message).unwrap(), info.id);

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            PromptOutcome::Answered(PromptResolution::remember(true, Conditions::unconditional()))
        );
        assert!(service.pending().is_none());
    }

    #[tokio::test]
    async fn test_mismatched_resolution_is_rejected() {
        let service = Arc::new(HumanPromptService::new());
        let opener = service.clone();
        let handle = tokio::spawn(async move { opener.open(request("example.com", ActionType::SignEvent)).await });
        wait_for_pending(&service).await;

        let message = PromptResolutionMessage {
            prompt: true,
            id: None,
            host: Origin::new("example.com"),
            action: ActionType::GetPublicKey,
            accept: true,
            conditions: None,
        };
        assert_eq!(service.resolve(&message), Err(PromptError::NoMatchingPrompt));
        assert!(service.pending().is_some());

        service.close_surface(None).unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), PromptOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_close_surface_abandons() {
        let service = Arc::new(HumanPromptService::new());
        let opener = service.clone();
        let handle = tokio::spawn(async move { opener.open(request("example.com", ActionType::Encrypt)).await });
        let info = wait_for_pending(&service).await;

        assert_eq!(service.close_surface(Some(CorrelationId::new())), Err(PromptError::NoMatchingPrompt));
        assert_eq!(service.close_surface(Some(info.id)).unwrap(), info.id);
        assert_eq!(handle.await.unwrap().unwrap(), PromptOutcome::Abandoned);
        assert_eq!(service.close_surface(None), Err(PromptError::NoMatchingPrompt));
    }

    #[tokio::test]
    async fn test_timeout_flow() {
        let service = HumanPromptService::with_timeout(Duration::from_millis(50));
        let outcome = service.open(request("example.com", ActionType::GetRelays)).await.unwrap();
        assert_eq!(outcome, PromptOutcome::Abandoned);
        assert!(service.pending().is_none());
    }

    #[tokio::test]
    async fn test_second_open_while_pending_fails() {
        let service = Arc::new(HumanPromptService::new());
        let opener = service.clone();
        let handle = tokio::spawn(async move { opener.open(request("a.example", ActionType::GetPublicKey)).await });
        let info = wait_for_pending(&service).await;

        let err = service.open(request("b.example", ActionType::GetPublicKey)).await.unwrap_err();
        assert_eq!(err, PromptError::AlreadyPending(info.id));

        service.resolve_id(info.id, PromptResolution::once(false)).unwrap();
        assert_eq!(
            handle.await.unwrap().unwrap(),
            PromptOutcome::Answered(PromptResolution::once(false))
        );
    }

    #[tokio::test]
    async fn test_cancelled_open_clears_slot() {
        let service = Arc::new(HumanPromptService::new());
        let opener = service.clone();
        let handle = tokio::spawn(async move { opener.open(request("example.com", ActionType::GetPublicKey)).await });
        wait_for_pending(&service).await;

        handle.abort();
        let _ = handle.await;
        assert!(service.pending().is_none());
    }

    struct SilentChannel;

    #[async_trait]
    impl PromptChannel for SilentChannel {
        async fn open(&self, _request: PromptRequest) -> Result<PromptOutcome, PromptError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_timed_channel_abandons_silent_prompt() {
        let channel = TimedPromptChannel::new(Arc::new(SilentChannel), Duration::from_millis(50));
        let outcome = channel.open(request("example.com", ActionType::SignEvent)).await.unwrap();
        assert_eq!(outcome, PromptOutcome::Abandoned);
    }

    #[tokio::test]
    async fn test_timed_channel_passes_answers_through() {
        let service = Arc::new(HumanPromptService::new());
        let channel = Arc::new(TimedPromptChannel::new(service.clone(), Duration::from_secs(30)));
        let opener = channel.clone();
        let handle = tokio::spawn(async move { opener.open(request("example.com", ActionType::GetPublicKey)).await });
        let info = wait_for_pending(&service).await;

        service.resolve_id(info.id, PromptResolution::once(true)).unwrap();
        assert_eq!(
            handle.await.unwrap().unwrap(),
            PromptOutcome::Answered(PromptResolution::once(true))
        );
    }
}
