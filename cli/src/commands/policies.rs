// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Stored policy commands
//!
//! Commands: list, revoke

use anyhow::Result;
use chrono::DateTime;
use clap::Subcommand;
use colored::Colorize;

use keyward_core::domain::action::{ActionType, Origin};
use keyward_core::domain::node_config::SignerConfigManifest;
use keyward_core::domain::policy::{Conditions, Decision, PolicyRecord};
use keyward_core::presentation::dto::{PolicyQuery, PolicyRevocation};

use crate::signer::Signer;

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// List remembered decisions
    List {
        /// Only policies for this host
        #[arg(long)]
        host: Option<String>,

        /// Only allow or deny policies
        #[arg(long)]
        decision: Option<Decision>,

        /// Only policies for this request type (e.g. signEvent)
        #[arg(long = "type", value_name = "TYPE")]
        action: Option<ActionType>,
    },

    /// Forget remembered decisions for a host
    Revoke {
        #[arg(value_name = "HOST")]
        host: String,

        /// allow or deny
        #[arg(value_name = "DECISION")]
        decision: Decision,

        /// Only this request type; every type when omitted
        #[arg(long = "type", value_name = "TYPE")]
        action: Option<ActionType>,
    },
}

pub async fn handle_command(command: PolicyCommand, config: &SignerConfigManifest) -> Result<()> {
    let signer = Signer::connect(config).await?;

    match command {
        PolicyCommand::List { host, decision, action } => {
            let query = PolicyQuery {
                host: host.map(Origin::new),
                decision,
                action,
            };
            print_policies(&signer.policies(query).await?);
        }
        PolicyCommand::Revoke { host, decision, action } => {
            let revocation = PolicyRevocation {
                host: Origin::new(host.clone()),
                decision,
                action,
            };
            let removed = signer.revoke_policies(revocation).await?;
            if removed == 0 {
                println!("{}", format!("ℹ No {} policies stored for {}", decision, host).yellow());
            } else {
                println!("{}", format!("✓ Revoked {} {} policies for {}", removed, decision, host).green());
            }
        }
    }

    Ok(())
}

fn print_policies(records: &[PolicyRecord]) {
    if records.is_empty() {
        println!("{}", "No policies stored".yellow());
        return;
    }

    println!("{} policies found:", records.len());
    println!("{:<30} {:<22} {:<8} {:<16} {}", "HOST", "TYPE", "DECISION", "CONDITIONS", "CREATED");
    for record in records {
        let decision = match record.decision {
            Decision::Allow => "allow".green(),
            Decision::Deny => "deny".red(),
        };
        println!(
            "{:<30} {:<22} {:<8} {:<16} {}",
            record.host,
            record.action,
            decision,
            describe_conditions(&record.conditions),
            format_timestamp(record.created_at)
        );
    }
}

fn describe_conditions(conditions: &Conditions) -> String {
    match &conditions.kinds {
        None => "always".to_string(),
        Some(kinds) => {
            let kinds: Vec<String> = kinds.iter().map(u32::to_string).collect();
            format!("kinds {}", kinds.join(","))
        }
    }
}

fn format_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditions_read_naturally() {
        assert_eq!(describe_conditions(&Conditions::unconditional()), "always");
        assert_eq!(describe_conditions(&Conditions::kinds([7, 1])), "kinds 1,7");
    }

    #[test]
    fn timestamps_render_in_utc() {
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13");
    }
}
