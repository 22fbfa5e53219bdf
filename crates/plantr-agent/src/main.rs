// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::Parser;
use plantr_agent::{Agent, AgentConfig, ShellRunner, SyncError, build_router};
use plantr_inventory::{Inventory, InventoryKind, NoopInventory, SqliteInventory};
use plantr_telemetry::{BodyLogging, LogFormat, LogLevel};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "plantr-agent", version, about = "plantr node agent")]
struct Args {
    /// Listen port for the local sync trigger.
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: LogLevel,

    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Log request bodies at debug.
    #[arg(long, env = "LOG_REQUESTS")]
    log_requests: bool,

    /// Log response bodies at debug.
    #[arg(long, env = "LOG_RESPONSES")]
    log_responses: bool,

    /// Controller base address, e.g. `https://plantr.example.com`.
    #[arg(long, env = "CONTROLLER_ADDRESS")]
    controller_address: String,

    /// Path to this node's private key.
    #[arg(long, env = "PRIVATE_KEY_PATH")]
    private_key_path: PathBuf,

    /// This node's id.
    #[arg(long, env = "NODE_ID")]
    node_id: String,

    /// Time between background syncs, humantime syntax. `0` disables the
    /// background loop (syncs then only run via the RPC trigger).
    #[arg(long, env = "POLL_INTERVAL", default_value = "60s")]
    poll_interval: String,

    #[arg(long, env = "STORAGE_TYPE", default_value = "sqlite")]
    storage_type: InventoryKind,

    #[arg(long, env = "SQLITE_DB_PATH", default_value = "/var/plantr/agent.db")]
    sqlite_db_path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    plantr_telemetry::init(args.log_level, args.log_format);

    if args.controller_address.is_empty() {
        bail!("controller address must be set");
    }
    if args.node_id.is_empty() {
        bail!("node id must be set");
    }

    let poll_interval = if args.poll_interval == "0" {
        None
    } else {
        humantime::parse_duration(&args.poll_interval)
            .context("parsing POLL_INTERVAL")
            .map(|interval| (!interval.is_zero()).then_some(interval))?
    };

    let private_key_pem = std::fs::read_to_string(&args.private_key_path)
        .with_context(|| format!("reading private key {}", args.private_key_path.display()))?;

    let inventory: Arc<dyn Inventory> = match args.storage_type {
        InventoryKind::Sqlite => {
            if let Some(parent) = args.sqlite_db_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            Arc::new(SqliteInventory::open(&args.sqlite_db_path)?)
        }
        InventoryKind::None => Arc::new(NoopInventory),
    };

    // The worker owns a blocking HTTP client; build it off the async
    // threads.
    let conf = AgentConfig {
        node_id: args.node_id.clone(),
        private_key_pem,
        controller_address: args.controller_address.clone(),
        inventory,
        runner: Arc::new(ShellRunner),
    };
    let agent = Arc::new(
        tokio::task::spawn_blocking(move || Agent::new(conf))
            .await
            .context("building agent worker")?,
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poll_task = poll_interval.map(|interval| {
        info!(?interval, "starting periodic sync loop");
        tokio::spawn(poll_loop(agent.clone(), interval, shutdown_rx))
    });

    let app = build_router(
        agent,
        BodyLogging {
            requests: args.log_requests,
            responses: args.log_responses,
        },
    );
    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(port = args.port, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    // Let the in-flight background sync wind down, but not forever.
    let _ = shutdown_tx.send(true);
    if let Some(task) = poll_task {
        let _ = tokio::time::timeout(Duration::from_secs(10), task).await;
    }

    Ok(())
}

/// Tick until shutdown, skipping ticks that find a sync already running.
async fn poll_loop(
    agent: Arc<Agent>,
    interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; consume it so the initial sync
    // waits a full interval like every later one.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let agent = agent.clone();
                let result = tokio::task::spawn_blocking(move || agent.sync()).await;
                match result {
                    Ok(Ok(())) => info!("periodic sync complete"),
                    Ok(Err(SyncError::InProgress)) => {
                        info!("periodic sync aborted, sync already in progress");
                    }
                    Ok(Err(err)) => error!(error = %err, "error during periodic sync"),
                    Err(join) => error!(error = %join, "periodic sync task failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("ending periodic sync loop");
                return;
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
