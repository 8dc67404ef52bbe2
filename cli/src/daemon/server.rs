// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use keyward_core::{
    application::{
        AuthorizationBroker, DecisionNotifier, InboundTransport, LogSink, SettingsService,
    },
    domain::{
        node_config::{PromptMode, SignerConfigManifest},
        prompt::PromptChannel,
    },
    infrastructure::{
        event_bus::EventBus,
        prompt_service::{HumanPromptService, TimedPromptChannel},
        state_store::JsonFileStateStore,
    },
    presentation::{app, AppState, HostAllowList},
};

use super::{remove_pid_file, write_pid_file};
use crate::terminal_prompt::TerminalPromptChannel;

/// Runs the signer in the foreground until Ctrl+C or SIGTERM.
pub async fn start_daemon(config: SignerConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    let pid = std::process::id();
    write_pid_file(pid)?;
    let _guard = PidFileGuard;

    info!("keyward daemon starting (PID: {})", pid);

    let spec = &config.spec;
    let store = Arc::new(
        JsonFileStateStore::open(&spec.state_path)
            .await
            .with_context(|| format!("Failed to open state file {:?}", spec.state_path))?,
    );
    info!("State loaded from {:?}", spec.state_path);

    let event_bus = EventBus::new(spec.event_bus_capacity);

    // In terminal mode the HTTP prompt endpoints stay mounted but never see a prompt
    let prompt_timeout = Duration::from_secs(spec.prompt.timeout_seconds);
    let http_prompts = Arc::new(HumanPromptService::with_timeout(prompt_timeout));
    let prompt_channel: Arc<dyn PromptChannel> = match spec.prompt.mode {
        PromptMode::Http => http_prompts.clone(),
        PromptMode::Terminal => Arc::new(TimedPromptChannel::new(
            Arc::new(TerminalPromptChannel::new()),
            prompt_timeout,
        )),
    };
    info!(mode = ?spec.prompt.mode, timeout_seconds = spec.prompt.timeout_seconds, "Prompt channel ready");

    let broker = Arc::new(AuthorizationBroker::new(
        store.clone(),
        store.clone(),
        prompt_channel,
        event_bus.clone(),
    ));
    let transport = Arc::new(InboundTransport::new(broker, spec.expose_failure_detail));
    let settings = Arc::new(SettingsService::new(store.clone(), store.clone(), event_bus.clone()));

    let notifier = Arc::new(DecisionNotifier::new(store, event_bus.clone(), Arc::new(LogSink))).start();

    let app_state = AppState {
        transport,
        prompts: http_prompts,
        settings,
        event_bus,
        start_time: Instant::now(),
        allowed_hosts: HostAllowList::new(&spec.listen.host, spec.listen.port),
    };

    let addr = spec.listen.address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    axum::serve(listener, app(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    notifier.abort();
    info!("Daemon shutting down");

    Ok(())
}

struct PidFileGuard;

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_pid_file() {
            warn!("Failed to clean up PID file: {}", e);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
