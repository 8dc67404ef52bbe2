// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # keyward
//!
//! A nostr signer that keeps the private key and asks before using it.
//!
//! ## Architecture
//!
//! - **Daemon mode**: `keyward daemon start` serves the HTTP API and holds prompts
//! - **Default mode**: commands delegate to the daemon if running, else open the
//!   state file themselves and ask on the terminal
//! - **Detection**: HTTP health check, then PID file
//!
//! ## Commands
//!
//! - `keyward daemon start|stop|status` - Manage the daemon
//! - `keyward key show|generate|import|export|clear` - The signing key
//! - `keyward relays list|add|set|remove` - Relay list
//! - `keyward policies list|revoke` - Remembered decisions
//! - `keyward settings show|notifications|protocol-handler` - User settings
//! - `keyward prompt list|accept|reject|close` - Answer the daemon's prompt
//! - `keyward request --type <TYPE> --host <HOST> [--remote]` - Send one request
//! - `keyward verify [JSON]` - Check a signed event
//! - `keyward config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use keyward::commands::{
    self, ConfigCommand, DaemonCommand, KeyCommand, PolicyCommand, PromptCommand, RelayCommand, RequestArgs,
    SettingsCommand, VerifyArgs,
};
use keyward_core::domain::node_config::SignerConfigManifest;

/// keyward - a nostr signer that asks first
#[derive(Parser)]
#[command(name = "keyward")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "KEYWARD_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP API host (overrides spec.listen.host)
    #[arg(long, global = true, env = "KEYWARD_HOST")]
    host: Option<String>,

    /// HTTP API port (overrides spec.listen.port)
    #[arg(long, global = true, env = "KEYWARD_PORT")]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "KEYWARD_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage daemon lifecycle
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },

    /// Manage the signing key
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },

    /// Manage the relay list
    Relays {
        #[command(subcommand)]
        command: RelayCommand,
    },

    /// Inspect and revoke remembered decisions
    Policies {
        #[command(subcommand)]
        command: PolicyCommand,
    },

    /// User settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Answer the daemon's consent prompt
    Prompt {
        #[command(subcommand)]
        command: PromptCommand,
    },

    /// Send a single request to the signer
    Request(RequestArgs),

    /// Verify a signed event
    Verify(VerifyArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    let command = match cli.command {
        Some(command) => command,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    };

    let config_path = cli.config;
    let load = || load_config(config_path.clone(), cli.host.clone(), cli.port);

    match command {
        Commands::Config { command } => commands::config::handle_command(command, config_path.clone()).await,
        Commands::Daemon { command } => commands::daemon::handle_command(command, load()?).await,
        Commands::Key { command } => commands::key::handle_command(command, &load()?).await,
        Commands::Relays { command } => commands::relays::handle_command(command, &load()?).await,
        Commands::Policies { command } => commands::policies::handle_command(command, &load()?).await,
        Commands::Settings { command } => commands::settings::handle_command(command, &load()?).await,
        Commands::Prompt { command } => commands::prompt::handle_command(command, &load()?).await,
        Commands::Request(args) => commands::request::handle_command(args, &load()?).await,
        Commands::Verify(args) => commands::verify::handle_command(args),
    }
}

fn load_config(path: Option<PathBuf>, host: Option<String>, port: Option<u16>) -> Result<SignerConfigManifest> {
    let mut config = SignerConfigManifest::load_or_default(path).context("Failed to load configuration")?;
    if let Some(host) = host {
        config.spec.listen.host = host;
    }
    if let Some(port) = port {
        config.spec.listen.port = port;
    }
    Ok(config)
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
