// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon lifecycle management commands
//!
//! Commands: start, stop, status

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use tracing::{info, warn};

use crate::daemon::{check_daemon_running, start_daemon, stop_daemon, DaemonStatus};
use keyward_core::domain::node_config::SignerConfigManifest;

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground
    Start,

    /// Stop the daemon gracefully
    Stop {
        /// Force kill if daemon doesn't stop gracefully
        #[arg(short, long)]
        force: bool,

        /// Timeout in seconds (default: 30)
        #[arg(short, long, default_value = "30")]
        timeout: u64,
    },

    /// Check daemon status
    Status,
}

pub async fn handle_command(command: DaemonCommand, config: SignerConfigManifest) -> Result<()> {
    match command {
        DaemonCommand::Start => start(config).await,
        DaemonCommand::Stop { force, timeout } => stop(&config, force, timeout).await,
        DaemonCommand::Status => status(&config).await,
    }
}

async fn start(config: SignerConfigManifest) -> Result<()> {
    info!("Checking if daemon is already running...");

    let listen = &config.spec.listen;
    match check_daemon_running(&listen.host, listen.port).await {
        Ok(DaemonStatus::Running { pid, .. }) => {
            println!("{}", format!("✓ Daemon already running (PID: {})", pid).green());
            println!("Use 'keyward daemon stop' to stop it first.");
            return Ok(());
        }
        Ok(DaemonStatus::Stopped) => {
            info!("Daemon not running, starting...");
        }
        Ok(DaemonStatus::Unhealthy { pid, error }) => {
            warn!("Daemon PID {} exists but unhealthy (error: {}), stopping...", pid, error);
            stop_daemon(false, 10).await?;
        }
        Err(e) => {
            warn!("Failed to check daemon status: {}", e);
        }
    }

    start_daemon(config).await
}

async fn stop(config: &SignerConfigManifest, force: bool, timeout: u64) -> Result<()> {
    info!("Stopping daemon...");

    let listen = &config.spec.listen;
    match check_daemon_running(&listen.host, listen.port).await {
        Ok(DaemonStatus::Stopped) => {
            println!("{}", "ℹ Daemon not running".yellow());
            return Ok(());
        }
        Ok(DaemonStatus::Running { pid, .. }) | Ok(DaemonStatus::Unhealthy { pid, .. }) => {
            println!("Stopping daemon (PID: {})...", pid);
            stop_daemon(force, timeout).await?;
            println!("{}", "✓ Daemon stopped".green());
        }
        Err(e) => {
            println!("{}", format!("✗ Failed to check daemon: {}", e).red());
            return Err(e);
        }
    }

    Ok(())
}

async fn status(config: &SignerConfigManifest) -> Result<()> {
    let listen = &config.spec.listen;
    match check_daemon_running(&listen.host, listen.port).await {
        Ok(DaemonStatus::Running { pid, uptime }) => {
            println!("{}", "✓ Daemon is running".green());
            println!("  Address: {}", listen.address());
            if pid != 0 {
                println!("  PID: {}", pid);
            }
            if let Some(uptime) = uptime {
                println!("  Uptime: {}", format_duration(uptime));
            }
        }
        Ok(DaemonStatus::Stopped) => {
            println!("{}", "✗ Daemon is not running".red());
        }
        Ok(DaemonStatus::Unhealthy { pid, error }) => {
            println!("{}", format!("⚠ Daemon unhealthy (PID: {})", pid).yellow());
            println!("  Process exists but HTTP API check failed: {}", error);
        }
        Err(e) => {
            println!("{}", format!("✗ Failed to check status: {}", e).red());
            return Err(e);
        }
    }

    Ok(())
}

fn format_duration(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
