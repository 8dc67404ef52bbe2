// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Inbound Transport
//!
//! Turns a wire message `{type, params, host}` into a typed [`Request`],
//! hands it to the broker and renders the outcome as `{result}` or
//! `{error}`.
//!
//! Two kinds of callers reach it. Trusted callers are the signer's own UI
//! (the CLI talking to its daemon) and see full failure detail. External
//! callers are identified only by their origin and see failure detail only
//! when the deployment opts in.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::broker::AuthorizationService;
use crate::domain::action::{ActionType, Origin, Request, RequestError};
use crate::domain::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller {
    Trusted,
    External,
}

/// Request as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub action: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireError {
    Text(String),
    Detail { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundResponse {
    Success { result: Value },
    Failure { error: WireError },
}

impl InboundResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, InboundResponse::Success { .. })
    }

    pub fn invalid_request(reason: impl std::fmt::Display) -> Self {
        InboundResponse::Failure {
            error: WireError::Text(format!("invalid request: {}", reason)),
        }
    }
}

pub struct InboundTransport {
    broker: Arc<dyn AuthorizationService>,
    expose_failure_detail: bool,
}

impl InboundTransport {
    pub fn new(broker: Arc<dyn AuthorizationService>, expose_failure_detail: bool) -> Self {
        Self {
            broker,
            expose_failure_detail,
        }
    }

    /// `origin` is what the transport established about the sender (e.g. an
    /// `Origin` header); it takes precedence over the declared `host`.
    pub async fn handle(&self, caller: Caller, origin: Option<Origin>, message: InboundMessage) -> InboundResponse {
        let action = match message.action.parse::<ActionType>() {
            Ok(action) => action,
            Err(e) => return InboundResponse::invalid_request(e),
        };

        let origin = match origin
            .filter(|o| !o.is_empty())
            .or_else(|| message.host.as_deref().map(str::trim).filter(|h| !h.is_empty()).map(Origin::from))
        {
            Some(origin) => origin,
            None => return InboundResponse::invalid_request("missing host"),
        };

        let request = match Request::parse(action, message.params) {
            Ok(request) => request,
            Err(RequestError::InvalidEvent(detail)) => {
                debug!(origin = %origin, detail = %detail, "Unparseable event");
                return self.render_error(caller, &AuthError::InvalidEvent(detail));
            }
            Err(e) => return InboundResponse::invalid_request(e),
        };

        info!(origin = %origin, action = %action, caller = ?caller, "Request received");
        match self.broker.authorize(&origin, request).await {
            Ok(payload) => InboundResponse::Success {
                result: payload.to_json(),
            },
            Err(e) => self.render_error(caller, &e),
        }
    }

    pub fn render_error(&self, caller: Caller, error: &AuthError) -> InboundResponse {
        let error = match error {
            AuthError::Denied | AuthError::ChannelAborted => WireError::Text("denied".to_string()),
            AuthError::NoKey => WireError::Text(AuthError::NoKey.to_string()),
            AuthError::InvalidEvent(_) => WireError::Detail {
                message: "invalid event".to_string(),
            },
            AuthError::OperationFailed(detail) => {
                let message = if caller == Caller::Trusted || self.expose_failure_detail {
                    detail.clone()
                } else {
                    "operation failed".to_string()
                };
                WireError::Detail { message }
            }
        };
        InboundResponse::Failure { error }
    }
}
