// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Relay list commands
//!
//! Commands: list, add, set, remove

use anyhow::Result;
use clap::{ArgAction, Subcommand};
use colored::Colorize;

use keyward_core::domain::node_config::SignerConfigManifest;
use keyward_core::domain::relay::{RelayList, RelayPolicy};

use crate::signer::Signer;

#[derive(Subcommand)]
pub enum RelayCommand {
    /// List configured relays
    List,

    /// Add a relay, read and write unless told otherwise
    Add {
        #[arg(value_name = "URL")]
        url: String,

        #[arg(long, action = ArgAction::Set, default_value_t = true, value_name = "BOOL")]
        read: bool,

        #[arg(long, action = ArgAction::Set, default_value_t = true, value_name = "BOOL")]
        write: bool,
    },

    /// Change the read/write flags of a relay; omitted flags keep their value
    Set {
        #[arg(value_name = "URL")]
        url: String,

        #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
        read: Option<bool>,

        #[arg(long, action = ArgAction::Set, value_name = "BOOL")]
        write: Option<bool>,
    },

    /// Remove a relay
    Remove {
        #[arg(value_name = "URL")]
        url: String,
    },
}

pub async fn handle_command(command: RelayCommand, config: &SignerConfigManifest) -> Result<()> {
    let signer = Signer::connect(config).await?;

    match command {
        RelayCommand::List => print_relays(&signer.relays().await?),
        RelayCommand::Add { url, read, write } => {
            let relays = signer.set_relay(&url, RelayPolicy { read, write }).await?;
            println!("{}", format!("✓ Relay added: {}", url.trim()).green());
            print_relays(&relays);
        }
        RelayCommand::Set { url, read, write } => {
            let current = signer.relays().await?;
            let Some(existing) = current.get(url.trim()) else {
                anyhow::bail!("Relay not configured: {} (use 'keyward relays add')", url.trim());
            };
            let policy = merge_flags(existing, read, write);
            let relays = signer.set_relay(&url, policy).await?;
            println!("{}", format!("✓ Relay updated: {}", url.trim()).green());
            print_relays(&relays);
        }
        RelayCommand::Remove { url } => {
            if signer.remove_relay(&url).await? {
                println!("{}", format!("✓ Relay removed: {}", url).green());
            } else {
                println!("{}", format!("ℹ Relay not configured: {}", url).yellow());
            }
        }
    }

    Ok(())
}

fn merge_flags(existing: RelayPolicy, read: Option<bool>, write: Option<bool>) -> RelayPolicy {
    RelayPolicy {
        read: read.unwrap_or(existing.read),
        write: write.unwrap_or(existing.write),
    }
}

fn print_relays(relays: &RelayList) {
    if relays.is_empty() {
        println!("{}", "No relays configured".yellow());
        return;
    }

    println!("{:<50} {:<6} {}", "URL", "READ", "WRITE");
    for (url, policy) in relays.iter() {
        println!("{:<50} {:<6} {}", url, flag(policy.read), flag(policy.write));
    }
}

fn flag(enabled: bool) -> &'static str {
    if enabled {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_flags_keep_their_value() {
        let existing = RelayPolicy { read: true, write: false };
        assert_eq!(merge_flags(existing, None, None), existing);
        assert_eq!(
            merge_flags(existing, Some(false), Some(true)),
            RelayPolicy { read: false, write: true }
        );
    }
}
