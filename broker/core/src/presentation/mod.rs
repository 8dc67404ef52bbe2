// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`keyward-core`)
//!
//! HTTP surface that translates requests into application service calls.
//! No authorization logic lives here.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`api`] | Axum router: inbound requests, prompt answers, settings, SSE events |
//! | [`dto`] | Bodies of the internal routes, shared with the SDK |

pub mod api;
pub mod dto;

pub use api::{app, ApiError, AppState, HostAllowList};
