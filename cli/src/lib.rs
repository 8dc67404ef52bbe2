// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! keyward CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers, daemon wiring, terminal consent prompts

pub mod commands;
pub mod daemon;
pub mod embedded;
pub mod signer;
pub mod terminal_prompt;
