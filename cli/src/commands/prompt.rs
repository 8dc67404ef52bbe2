// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Answer consent prompts held by a running daemon
//!
//! Commands: list, accept, reject, close

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use keyward_core::domain::node_config::SignerConfigManifest;
use keyward_core::domain::policy::Conditions;
use keyward_core::domain::prompt::PromptResolutionMessage;
use keyward_core::infrastructure::prompt_service::PendingPromptInfo;
use keyward_sdk::KeywardClient;

use crate::daemon::{check_daemon_running, DaemonStatus};

#[derive(Subcommand)]
pub enum PromptCommand {
    /// Show the pending prompt, if any
    List,

    /// Authorize the pending request
    Accept {
        /// Remember the decision for this host and request type
        #[arg(short, long)]
        remember: bool,

        /// Restrict the remembered decision to these event kinds
        #[arg(long = "kind", value_name = "KIND", requires = "remember")]
        kinds: Vec<u32>,
    },

    /// Reject the pending request
    Reject {
        /// Remember the decision for this host and request type
        #[arg(short, long)]
        remember: bool,

        /// Restrict the remembered decision to these event kinds
        #[arg(long = "kind", value_name = "KIND", requires = "remember")]
        kinds: Vec<u32>,
    },

    /// Dismiss the pending prompt; the request is denied and nothing is stored
    Close,
}

pub async fn handle_command(command: PromptCommand, config: &SignerConfigManifest) -> Result<()> {
    let listen = &config.spec.listen;
    match check_daemon_running(&listen.host, listen.port).await {
        Ok(DaemonStatus::Running { .. }) => {}
        Ok(DaemonStatus::Unhealthy { pid, error }) => {
            println!(
                "{}",
                format!("⚠ Daemon is running (PID: {}) but unhealthy: {}", pid, error).yellow()
            );
            println!("Run 'keyward daemon status' for more info.");
            return Ok(());
        }
        _ => {
            println!("{}", "Prompts are only held by a running daemon.".red());
            println!("Run 'keyward daemon start' to start the daemon.");
            return Ok(());
        }
    }

    let client = KeywardClient::new(format!("http://{}", listen.address())).trusted();

    match command {
        PromptCommand::List => list(&client).await,
        PromptCommand::Accept { remember, kinds } => answer(&client, true, remember, kinds).await,
        PromptCommand::Reject { remember, kinds } => answer(&client, false, remember, kinds).await,
        PromptCommand::Close => close(&client).await,
    }
}

async fn list(client: &KeywardClient) -> Result<()> {
    let pending = client.pending_prompts().await?;
    if pending.is_empty() {
        println!("{}", "No pending prompt".yellow());
        return Ok(());
    }
    for prompt in &pending {
        print_prompt(prompt);
    }
    Ok(())
}

async fn answer(client: &KeywardClient, accept: bool, remember: bool, kinds: Vec<u32>) -> Result<()> {
    let prompt = current(client).await?;
    let message = resolution_message(&prompt, accept, remember, kinds);
    client.resolve_prompt(&message).await?;

    let verb = if accept { "Authorized" } else { "Rejected" };
    let scope = if remember { " (remembered)" } else { "" };
    println!(
        "{}",
        format!("✓ {} {} for {}{}", verb, prompt.action, prompt.host, scope).green()
    );
    Ok(())
}

async fn close(client: &KeywardClient) -> Result<()> {
    let prompt = current(client).await?;
    client.close_prompt(Some(prompt.id)).await?;
    println!("{}", format!("✓ Prompt closed: {}", prompt.summary).green());
    Ok(())
}

async fn current(client: &KeywardClient) -> Result<PendingPromptInfo> {
    client
        .pending_prompts()
        .await?
        .into_iter()
        .next()
        .context("No pending prompt")
}

fn resolution_message(
    prompt: &PendingPromptInfo,
    accept: bool,
    remember: bool,
    kinds: Vec<u32>,
) -> PromptResolutionMessage {
    let conditions = remember.then(|| {
        if kinds.is_empty() {
            Conditions::unconditional()
        } else {
            Conditions::kinds(kinds)
        }
    });
    PromptResolutionMessage {
        prompt: true,
        id: Some(prompt.id),
        host: prompt.host.clone(),
        action: prompt.action,
        accept,
        conditions,
    }
}

fn print_prompt(prompt: &PendingPromptInfo) {
    println!("{}", prompt.summary.bold());
    println!("  ID: {}", prompt.id);
    println!("  Waiting since: {}", prompt.created_at.format("%H:%M:%S"));
    if let Some(timeout) = prompt.timeout_seconds {
        println!("  Times out after: {}s", timeout);
    }
    if !prompt.params.is_null() {
        if let Ok(params) = serde_json::to_string_pretty(&prompt.params) {
            println!("{}", params.dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keyward_core::domain::action::{ActionType, Origin};
    use keyward_core::domain::prompt::CorrelationId;
    use serde_json::json;

    fn pending() -> PendingPromptInfo {
        PendingPromptInfo {
            id: CorrelationId::new(),
            host: Origin::new("example.com"),
            action: ActionType::SignEvent,
            params: json!({"event": {"kind": 1}}),
            summary: "example.com wants to sign an event".to_string(),
            created_at: Utc::now(),
            timeout_seconds: Some(120),
        }
    }

    #[test]
    fn one_off_answers_carry_no_conditions() {
        let prompt = pending();
        let message = resolution_message(&prompt, true, false, vec![]);
        assert_eq!(message.id, Some(prompt.id));
        assert!(message.accept);
        assert!(message.conditions.is_none());
    }

    #[test]
    fn remembered_answers_scope_to_kinds() {
        let prompt = pending();
        let always = resolution_message(&prompt, false, true, vec![]);
        assert_eq!(always.conditions, Some(Conditions::unconditional()));

        let scoped = resolution_message(&prompt, true, true, vec![1, 7]);
        assert_eq!(scoped.conditions, Some(Conditions::kinds([1, 7])));
        assert_eq!(scoped.host, prompt.host);
        assert_eq!(scoped.action, prompt.action);
    }
}
