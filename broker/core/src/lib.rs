// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # keyward-core
//!
//! Holds one nostr private key and brokers per-origin access to what it can
//! do (public key, event signing, NIP-44 encryption) without ever handing the
//! key itself to a caller.
//!
//! # Architecture
//!
//! - **domain**: action types, events, policies, prompt contract, config
//! - **application**: the authorization broker, inbound transport, settings
//! - **infrastructure**: crypto operator, state stores, event bus, prompt service
//! - **presentation**: axum HTTP surface

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
