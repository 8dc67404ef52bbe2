// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Send a single signer request and print the response.
//!
//! Runs as the signer's own UI unless `--remote` is given, in which case the
//! request goes through the daemon's external endpoint and is subject to the
//! same rendering rules as any other caller.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use keyward_core::application::transport::{InboundMessage, InboundResponse};
use keyward_core::domain::node_config::SignerConfigManifest;
use keyward_sdk::{wire_error_text, KeywardClient};

use crate::signer::Signer;

#[derive(Args)]
pub struct RequestArgs {
    /// Request type, e.g. getPublicKey, signEvent, nip44.encrypt
    #[arg(long = "type", value_name = "TYPE")]
    pub action: String,

    /// Host the request is made on behalf of
    #[arg(long)]
    pub host: String,

    /// Request parameters as JSON
    #[arg(long, value_name = "JSON")]
    pub params: Option<String>,

    /// Go through the daemon's external endpoint, as a third-party caller would
    #[arg(long)]
    pub remote: bool,
}

pub async fn handle_command(args: RequestArgs, config: &SignerConfigManifest) -> Result<()> {
    let params = match args.params.as_deref() {
        Some(raw) => serde_json::from_str::<Value>(raw).context("--params is not valid JSON")?,
        None => Value::Null,
    };

    let message = InboundMessage {
        action: args.action,
        params,
        host: Some(args.host),
    };

    let response = if args.remote {
        let client = KeywardClient::new(format!("http://{}", config.spec.listen.address()));
        if !client.is_healthy().await {
            anyhow::bail!(
                "No daemon answering at {}; run 'keyward daemon start' first",
                config.spec.listen.address()
            );
        }
        client.request(&message).await.context("Request to daemon failed")?
    } else {
        Signer::connect(config).await?.request(message).await?
    };

    match response {
        InboundResponse::Success { result } => {
            let rendered = match result {
                Value::String(text) => text,
                other => serde_json::to_string_pretty(&other)?,
            };
            println!("{}", rendered);
            Ok(())
        }
        InboundResponse::Failure { error } => {
            eprintln!("{}", format!("✗ {}", wire_error_text(&error)).red());
            std::process::exit(1);
        }
    }
}
