// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Key management commands
//!
//! Commands: show, generate, import, export, clear

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Confirm, Password};

use keyward_core::application::settings::Identity;
use keyward_core::domain::node_config::SignerConfigManifest;

use crate::signer::Signer;

#[derive(Subcommand)]
pub enum KeyCommand {
    /// Show the public identity of the stored key
    Show,

    /// Generate a fresh key, replacing any stored one
    Generate {
        /// Skip the confirmation when a key already exists
        #[arg(short, long)]
        yes: bool,
    },

    /// Import a key as 64 hex characters or an nsec
    Import {
        /// Key to import; prompted for when omitted
        #[arg(value_name = "KEY")]
        key: Option<String>,

        /// Skip the confirmation when a key already exists
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the stored key as an nsec (daemon must be stopped)
    Export,

    /// Remove the stored key
    Clear {
        /// Skip the confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

pub async fn handle_command(command: KeyCommand, config: &SignerConfigManifest) -> Result<()> {
    let signer = Signer::connect(config).await?;

    match command {
        KeyCommand::Show => show(&signer).await,
        KeyCommand::Generate { yes } => generate(&signer, yes).await,
        KeyCommand::Import { key, yes } => import(&signer, key, yes).await,
        KeyCommand::Export => export(&signer).await,
        KeyCommand::Clear { yes } => clear(&signer, yes).await,
    }
}

async fn show(signer: &Signer) -> Result<()> {
    match signer.identity().await? {
        Some(identity) => print_identity(&identity),
        None => {
            println!("{}", "No key stored".yellow());
            println!("Run 'keyward key generate' or 'keyward key import' to set one.");
        }
    }
    Ok(())
}

async fn generate(signer: &Signer, yes: bool) -> Result<()> {
    if !confirm_replace(signer, yes).await? {
        return Ok(());
    }
    let identity = signer.generate_key().await?;
    println!("{}", "✓ Key generated".green());
    print_identity(&identity);
    Ok(())
}

async fn import(signer: &Signer, key: Option<String>, yes: bool) -> Result<()> {
    if !confirm_replace(signer, yes).await? {
        return Ok(());
    }
    let key = match key {
        Some(key) => key,
        None => Password::with_theme(&ColorfulTheme::default())
            .with_prompt("Private key (hex or nsec)")
            .interact()
            .context("Failed to read key")?,
    };

    let identity = signer.import_key(key.trim()).await?;
    println!("{}", "✓ Key imported".green());
    print_identity(&identity);
    Ok(())
}

async fn export(signer: &Signer) -> Result<()> {
    match signer.export_key().await? {
        Some(nsec) => println!("{}", nsec),
        None => println!("{}", "No key stored".yellow()),
    }
    Ok(())
}

async fn clear(signer: &Signer, yes: bool) -> Result<()> {
    if signer.identity().await?.is_none() {
        println!("{}", "ℹ No key stored".yellow());
        return Ok(());
    }
    if !yes && !confirm("Remove the stored key? This cannot be undone")? {
        return Ok(());
    }
    signer.clear_key().await?;
    println!("{}", "✓ Key removed".green());
    Ok(())
}

async fn confirm_replace(signer: &Signer, yes: bool) -> Result<bool> {
    if yes || signer.identity().await?.is_none() {
        return Ok(true);
    }
    confirm("A key is already stored. Replace it?")
}

fn confirm(question: &str) -> Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(question)
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

fn print_identity(identity: &Identity) {
    println!("  npub: {}", identity.npub.bold());
    println!("  hex:  {}", identity.hex);
    if let Some(nprofile) = &identity.nprofile {
        println!("  nprofile: {}", nprofile);
    }
}
