// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

/// Outcome of a gated request that did not produce a result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// A stored policy or the human said no.
    #[error("denied")]
    Denied,

    /// No private key is configured. Nothing can proceed until one is.
    #[error("no private key found")]
    NoKey,

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Cryptographic or storage failure; carries the original detail.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// The prompt surface went away without an answer.
    #[error("prompt closed without an answer")]
    ChannelAborted,
}

impl AuthError {
    /// Whether the caller should see this as a plain denial.
    pub fn is_denial(&self) -> bool {
        matches!(self, AuthError::Denied | AuthError::ChannelAborted)
    }
}
