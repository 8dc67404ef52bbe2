// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! User settings commands
//!
//! Commands: show, notifications, protocol-handler

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use colored::Colorize;

use keyward_core::domain::node_config::SignerConfigManifest;

use crate::signer::Signer;

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(Subcommand)]
pub enum SettingsCommand {
    /// Show current settings
    Show,

    /// Turn decision notifications on or off
    Notifications {
        #[arg(value_enum)]
        state: Toggle,
    },

    /// Set the URL template for nostr: links, e.g. https://njump.me/{raw}
    ProtocolHandler {
        #[arg(value_name = "TEMPLATE", required_unless_present = "clear")]
        template: Option<String>,

        /// Remove the handler
        #[arg(long, conflicts_with = "template")]
        clear: bool,
    },
}

pub async fn handle_command(command: SettingsCommand, config: &SignerConfigManifest) -> Result<()> {
    let signer = Signer::connect(config).await?;

    match command {
        SettingsCommand::Show => {
            let view = signer.settings().await?;
            println!("{}", "Settings:".bold());
            println!("  Notifications: {}", if view.notifications { "on" } else { "off" });
            println!(
                "  Protocol handler: {}",
                view.protocol_handler.as_deref().unwrap_or("(none)")
            );
        }
        SettingsCommand::Notifications { state } => {
            let enabled = matches!(state, Toggle::On);
            signer.set_notifications(enabled).await?;
            println!(
                "{}",
                format!("✓ Notifications {}", if enabled { "on" } else { "off" }).green()
            );
        }
        SettingsCommand::ProtocolHandler { template, clear } => {
            let template = if clear { None } else { template };
            let cleared = template.is_none();
            signer.set_protocol_handler(template).await?;
            if cleared {
                println!("{}", "✓ Protocol handler removed".green());
            } else {
                println!("{}", "✓ Protocol handler saved".green());
            }
        }
    }

    Ok(())
}
