// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - PID file management
//! - HTTP health checks
//! - Graceful shutdown

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
#[cfg(unix)]
use tokio::time::sleep;
use tracing::info;
#[cfg(unix)]
use tracing::warn;

pub mod server;

pub use server::start_daemon;

#[cfg(unix)]
const PID_FILE: &str = "/var/run/keyward/keyward.pid";
const PID_FILE_NAME: &str = "keyward.pid";

#[derive(Debug, Clone)]
pub enum DaemonStatus {
    Running { pid: u32, uptime: Option<u64> },
    Stopped,
    Unhealthy { pid: u32, error: String },
}

/// Health check first, PID file second.
pub async fn check_daemon_running(host: &str, port: u16) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;

    let health_url = format!("http://{}:{}/health", host, port);

    let pid_file = get_pid_file_path();
    let local_pid = std::fs::read_to_string(&pid_file)
        .ok()
        .and_then(|content| content.trim().parse::<u32>().ok());

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let uptime = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["uptime_seconds"].as_u64());

            // 0 when the daemon answers but was not started from this machine's PID file
            Ok(DaemonStatus::Running {
                pid: local_pid.unwrap_or(0),
                uptime,
            })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy {
            pid: local_pid.unwrap_or(0),
            error: format!("HTTP {}", resp.status()),
        }),
        Err(e) => match local_pid {
            Some(pid) if process_exists(pid) => Ok(DaemonStatus::Unhealthy {
                pid,
                error: e.to_string(),
            }),
            Some(_) => {
                // Stale PID file
                let _ = std::fs::remove_file(&pid_file);
                Ok(DaemonStatus::Stopped)
            }
            None => Ok(DaemonStatus::Stopped),
        },
    }
}

/// Sends SIGTERM and waits up to `timeout_secs` for the process to exit.
#[cfg(unix)]
pub async fn stop_daemon(force: bool, timeout_secs: u64) -> Result<()> {
    let pid_file = get_pid_file_path();

    let pid = std::fs::read_to_string(&pid_file)
        .context("Failed to read PID file")?
        .trim()
        .parse::<u32>()
        .context("Invalid PID")?;

    info!("Sending SIGTERM to process {}", pid);
    send_signal(pid, libc::SIGTERM)?;

    for _ in 0..timeout_secs {
        if !process_exists(pid) {
            info!("Daemon stopped gracefully");
            let _ = std::fs::remove_file(&pid_file);
            return Ok(());
        }
        sleep(Duration::from_secs(1)).await;
    }

    if !force {
        anyhow::bail!("Daemon did not stop within timeout");
    }

    warn!("Graceful shutdown timeout, sending SIGKILL");
    send_signal(pid, libc::SIGKILL)?;
    sleep(Duration::from_secs(1)).await;
    let _ = std::fs::remove_file(&pid_file);
    Ok(())
}

#[cfg(not(unix))]
pub async fn stop_daemon(_force: bool, _timeout_secs: u64) -> Result<()> {
    anyhow::bail!("Stopping the daemon is only supported on unix; stop the process manually")
}

pub fn get_pid_file_path() -> PathBuf {
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail
        let uid = unsafe { libc::geteuid() };
        if uid == 0 {
            return PathBuf::from(PID_FILE);
        }
    }
    std::env::temp_dir().join(PID_FILE_NAME)
}

fn process_exists(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // SAFETY: signal 0 only checks for existence
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: i32) -> Result<()> {
    // SAFETY: plain kill(2) on a PID read from our own PID file
    if unsafe { libc::kill(pid as i32, signal) } != 0 {
        anyhow::bail!("Failed to send signal {} to process {}", signal, pid);
    }
    Ok(())
}

pub fn write_pid_file(pid: u32) -> Result<()> {
    let pid_file = get_pid_file_path();
    if let Some(parent) = pid_file.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {:?}", parent))?;
    }
    std::fs::write(&pid_file, pid.to_string())
        .with_context(|| format!("Failed to write PID file: {:?}", pid_file))?;
    info!("Wrote PID file: {:?}", pid_file);
    Ok(())
}

pub fn remove_pid_file() -> Result<()> {
    let pid_file = get_pid_file_path();
    if pid_file.exists() {
        std::fs::remove_file(&pid_file)
            .with_context(|| format!("Failed to remove PID file: {:?}", pid_file))?;
        info!("Removed PID file: {:?}", pid_file);
    }
    Ok(())
}
