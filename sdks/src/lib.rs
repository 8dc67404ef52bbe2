// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! keyward Rust SDK
//!
//! Ask a running keyward signer for a public key, signatures and NIP-44
//! encryption, or manage it from a trusted local tool.

pub mod client;
pub mod types;

pub use client::{KeywardClient, TransportError};
pub use types::*;
