// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

use anyhow::{Context, Result, bail};
use clap::Parser;
use plantr_controller::{Controller, ControllerConfig, build_router};
use plantr_git::{GitClient, GitKind, GithubGitClient, StaticGitClient};
use plantr_storage::{SqliteStorage, StorageClient, StorageKind};
use plantr_telemetry::{BodyLogging, LogFormat, LogLevel};
use plantr_vault::{HashicorpVault, NoopVault, VaultClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "plantr-controller", version, about = "plantr control plane")]
struct Args {
    /// Listen port.
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

    #[arg(long, env = "STORAGE_TYPE", default_value = "sqlite")]
    storage_type: StorageKind,

    #[arg(long, env = "SQLITE_DB_PATH", default_value = "/var/plantr/storage.db")]
    sqlite_db_path: PathBuf,

    #[arg(long, env = "GIT_TYPE", default_value = "github")]
    git_type: GitKind,

    /// Access token for the configuration repository.
    #[arg(long, env = "GIT_ACCESS_TOKEN", default_value = "")]
    git_access_token: String,

    /// Configuration repository URL.
    #[arg(long, env = "GIT_URL")]
    git_url: String,

    /// Local checkout served when GIT_TYPE=static.
    #[arg(long, env = "GIT_STATIC_CHECKOUT_PATH", default_value = "")]
    git_static_checkout_path: String,

    /// HS256 signing key for bearer tokens.
    #[arg(long, env = "JWT_SIGNING_KEY")]
    jwt_signing_key: String,

    /// Token lifetime, humantime syntax.
    #[arg(long, env = "JWT_DURATION", default_value = "240h")]
    jwt_duration: String,

    /// Consult HashiCorp Vault during rendering.
    #[arg(long, env = "VAULT_ENABLED")]
    vault_enabled: bool,

    #[arg(long, env = "VAULT_ADDRESS", default_value = "")]
    vault_address: String,

    #[arg(long, env = "VAULT_TOKEN", default_value = "")]
    vault_token: String,

    #[arg(long, env = "VAULT_SECRET_PATH", default_value = "plantr")]
    vault_secret_path: String,

    /// Token for release-asset lookups and agent downloads.
    #[arg(long, env = "GITHUB_RELEASE_TOKEN")]
    github_release_token: Option<String>,

    /// Shared secret validating push webhooks.
    #[arg(long, env = "GITHUB_WEBHOOK_SECRET")]
    github_webhook_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    plantr_telemetry::init(args.log_level, args.log_format);

    let jwt_duration = humantime::parse_duration(&args.jwt_duration)
        .context("parsing JWT_DURATION")
        .and_then(|d| chrono::Duration::from_std(d).context("JWT_DURATION out of range"))?;

    let storage: Arc<dyn StorageClient> = match args.storage_type {
        StorageKind::Sqlite => {
            if let Some(parent) = args.sqlite_db_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            Arc::new(SqliteStorage::open(&args.sqlite_db_path)?)
        }
    };

    let git: Arc<dyn GitClient> = match args.git_type {
        GitKind::Github => Arc::new(GithubGitClient::new(args.git_access_token.clone())?),
        GitKind::Static => {
            if args.git_static_checkout_path.is_empty() {
                bail!("GIT_STATIC_CHECKOUT_PATH must be set when GIT_TYPE=static");
            }
            Arc::new(StaticGitClient::new(args.git_static_checkout_path.clone())?)
        }
    };

    let vault: Arc<dyn VaultClient> = if args.vault_enabled {
        if args.vault_address.is_empty() {
            bail!("VAULT_ADDRESS must be set when VAULT_ENABLED is set");
        }
        Arc::new(HashicorpVault::new(
            args.vault_address.clone(),
            args.vault_token.clone(),
            args.vault_secret_path.clone(),
        ))
    } else {
        Arc::new(NoopVault)
    };

    let controller = Arc::new(Controller::new(ControllerConfig {
        repo_url: args.git_url.clone(),
        jwt_signing_key: args.jwt_signing_key.into_bytes(),
        jwt_duration,
        git,
        storage,
        vault,
        github_release_token: args.github_release_token.clone(),
        github_webhook_secret: args.github_webhook_secret.clone(),
        github_api_base: None,
    }));

    let app = build_router(
        controller,
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
        .context("serve")
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
