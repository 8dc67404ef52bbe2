// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the keyward CLI

pub mod config;
pub mod daemon;
pub mod key;
pub mod policies;
pub mod prompt;
pub mod relays;
pub mod request;
pub mod settings;
pub mod verify;

pub use self::config::ConfigCommand;
pub use self::daemon::DaemonCommand;
pub use self::key::KeyCommand;
pub use self::policies::PolicyCommand;
pub use self::prompt::PromptCommand;
pub use self::relays::RelayCommand;
pub use self::request::RequestArgs;
pub use self::settings::SettingsCommand;
pub use self::verify::VerifyArgs;
