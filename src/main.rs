// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod config;

use std::sync::Arc;

use clap::Parser;
use cli::Cli;
use sessiond_core::SessionManager;
use sessiond_hub::{AutoSubscribeConfig, Hub};
use sessiond_scheduler::Scheduler;
use sessiond_sdk::mock::EchoSdk;
use sessiond_store::Store;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let daemon_config = config::load(cli.config.as_deref())?;

    let store = if cli.ephemeral {
        Store::open_in_memory()?
    } else {
        match &daemon_config.store.database_path {
            Some(path) => Store::open(path)?,
            None => Store::open_in_memory()?,
        }
    };

    // sessiond-store → sessiond-core's Session Manager.
    let session_manager = Arc::new(SessionManager::new(store.clone(), Arc::new(EchoSdk)));
    let active_ids = session_manager.create_at_startup().await?;
    tracing::info!(count = active_ids.len(), "attached active sessions");

    // sessiond-core → sessiond-hub: every session Runtime that's already
    // live gets its events bridged onto the Hub so a transport adapter can
    // subscribe without knowing sessiond-core exists.
    let hub = Hub::with_dedup(
        AutoSubscribeConfig {
            global_methods: daemon_config.hub.global_auto_subscribe.clone(),
            session_methods: daemon_config.hub.session_auto_subscribe.clone(),
        },
        std::time::Duration::from_secs(daemon_config.hub.request_timeout_secs),
        daemon_config.hub.dedup_capacity,
        std::time::Duration::from_secs(daemon_config.hub.dedup_ttl_secs),
    );

    for id in &active_ids {
        let runtime = session_manager.get_session(id).await?;
        bridge_runtime_events(&runtime, &hub);
    }

    // sessiond-hub → sessiond-scheduler: recurring job firings are events
    // like any other, scoped to `"room:<roomId>"` or the global scope.
    let scheduler = Scheduler::new(store.clone());
    bridge_scheduler_events(&scheduler, &hub);
    scheduler.start().await?;
    tracing::info!(jobs = scheduler.scheduled_job_count(), "scheduler armed");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, tearing down");

    scheduler.stop();
    session_manager.tear_down().await;

    Ok(())
}

/// Forward every [`sessiond_core::RuntimeEvent`] this Runtime emits onto the
/// Hub, matching the teacher's `sven-p2p` relay pattern of a dedicated
/// forwarding task per event source rather than a shared fan-in loop.
fn bridge_runtime_events(runtime: &sessiond_core::Runtime, hub: &Hub) {
    let mut events = runtime.subscribe();
    let hub = hub.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            let session_id = event.session_id().to_string();
            let method = event.method();
            match serde_json::to_value(&event) {
                Ok(payload) => {
                    hub.publish(&session_id, method, payload).await;
                }
                Err(e) => {
                    tracing::warn!(session_id, method, error = %e, "failed to serialize runtime event");
                }
            }
        }
    });
}

fn bridge_scheduler_events(scheduler: &Scheduler, hub: &Hub) {
    let mut events = scheduler.subscribe();
    let hub = hub.clone();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            use sessiond_scheduler::SchedulerEvent;
            let (scope, method) = match &event {
                SchedulerEvent::RecurringJobCreated { room_id, .. } => (format!("room:{room_id}"), "recurringJob.created"),
                SchedulerEvent::RecurringJobUpdated { room_id, .. } => (format!("room:{room_id}"), "recurringJob.updated"),
                SchedulerEvent::RecurringJobTriggered { session_id, .. } => (session_id.clone(), "recurringJob.triggered"),
            };
            match serde_json::to_value(&event) {
                Ok(payload) => {
                    hub.publish(&scope, method, payload).await;
                }
                Err(e) => {
                    tracing::warn!(scope, method, error = %e, "failed to serialize scheduler event");
                }
            }
        }
    });
}

/// Structured logging via `tracing`/`tracing-subscriber`, grounded in the
/// teacher's headless-mode `init_logging` branch in `sven/src/main.rs`: one
/// global subscriber, level controlled by `-v`/`RUST_LOG`, writing to
/// stderr. The daemon has no TUI mode, so the teacher's stderr-corrupts-the-
/// display concern does not apply here.
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
