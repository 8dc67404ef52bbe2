// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Check a signed event's id and signature offline.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::io::Read;

use keyward_core::domain::event::SignableEvent;
use keyward_core::infrastructure::crypto::event_signing::verify_event;

#[derive(Args)]
pub struct VerifyArgs {
    /// Event JSON; read from stdin when omitted
    #[arg(value_name = "JSON")]
    pub event: Option<String>,
}

pub fn handle_command(args: VerifyArgs) -> Result<()> {
    let raw = match args.event {
        Some(raw) => raw,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read event from stdin")?;
            buffer
        }
    };

    let event: SignableEvent = serde_json::from_str(raw.trim()).context("Event is not valid JSON")?;

    match verify_event(&event) {
        Ok(()) => {
            println!("{}", "✓ Signature valid".green());
            if let Some(id) = &event.id {
                println!("  id: {}", id);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("✗ {}", e).red());
            std::process::exit(1);
        }
    }
}
