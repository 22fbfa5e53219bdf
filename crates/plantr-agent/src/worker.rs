// SPDX-License-Identifier: MIT OR Apache-2.0
//! The sync worker: token lifecycle and ordered seed execution.

use crate::client::ControllerClient;
use crate::error::{SeedFailures, SyncError};
use crate::exec::{CommandRunner, run_shell};
use crate::{git_repo, handlers};
use chrono::{DateTime, Duration, Utc};
use plantr_inventory::{Inventory, InventoryRow};
use plantr_proto as proto;
use std::cell::OnceCell;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

/// Tokens are reused until this close to their expiry.
fn token_reuse_margin() -> Duration {
    Duration::minutes(5)
}

/// Everything needed to build an [`Agent`].
pub struct AgentConfig {
    /// This node's id, as listed in the configuration repository.
    pub node_id: String,
    /// PEM private key matching the node's configured public key.
    pub private_key_pem: String,
    /// Controller base address.
    pub controller_address: String,
    /// Record of already-applied seeds.
    pub inventory: Arc<dyn Inventory>,
    /// OS command execution.
    pub runner: Arc<dyn CommandRunner>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// The per-node sync worker. Methods are blocking; drive them from the
/// tokio blocking pool.
pub struct Agent {
    node_id: String,
    private_key_pem: String,
    client: ControllerClient,
    inventory: Arc<dyn Inventory>,
    runner: Arc<dyn CommandRunner>,
    http: reqwest::blocking::Client,
    token: Mutex<Option<CachedToken>>,
    sync_lock: Mutex<()>,
}

impl Agent {
    /// Build a worker.
    pub fn new(conf: AgentConfig) -> Self {
        Self {
            node_id: conf.node_id,
            private_key_pem: conf.private_key_pem,
            client: ControllerClient::new(conf.controller_address),
            inventory: conf.inventory,
            runner: conf.runner,
            http: reqwest::blocking::Client::new(),
            token: Mutex::new(None),
            sync_lock: Mutex::new(()),
        }
    }

    /// Run one full sync: authenticate, pull, execute.
    ///
    /// At most one sync runs at a time; concurrent callers get
    /// [`SyncError::InProgress`] instead of queueing.
    pub fn sync(&self) -> Result<(), SyncError> {
        let _guard = self
            .sync_lock
            .try_lock()
            .map_err(|_| SyncError::InProgress)?;

        let token = self.ensure_token()?;
        let data = self.client.get_sync_data(&token)?;
        info!(seeds = data.seeds.len(), "got sync data");
        self.execute_seeds(&data.seeds)
    }

    /// Ask the controller to reload its configuration.
    pub fn force_refresh(&self) -> Result<(), SyncError> {
        let token = self.ensure_token()?;
        self.client.force_refresh(&token)?;
        Ok(())
    }

    /// Reuse the cached token while it has life left, otherwise run the
    /// two-phase login. The cached expiry comes from the token's own `exp`
    /// claim, so a short controller-side JWT_DURATION is honored.
    fn ensure_token(&self) -> Result<String, SyncError> {
        let mut cached = self.token.lock().expect("token lock poisoned");

        if let Some(entry) = cached.as_ref() {
            if entry.expires_at > Utc::now() + token_reuse_margin() {
                return Ok(entry.token.clone());
            }
            info!("cached token close to expiry, re-authenticating");
        }

        let response = self.client.login(&proto::LoginRequest {
            node_id: self.node_id.clone(),
            challenge_id: None,
            challenge_value: None,
        })?;
        let proto::LoginResponse::Challenge {
            challenge_id,
            sealed_challenge,
        } = response
        else {
            return Err(SyncError::UnexpectedLogin);
        };

        let challenge_value = plantr_auth::open_value(&self.private_key_pem, &sealed_challenge)?;

        let response = self.client.login(&proto::LoginRequest {
            node_id: self.node_id.clone(),
            challenge_id: Some(challenge_id),
            challenge_value: Some(challenge_value),
        })?;
        let proto::LoginResponse::Token { token } = response else {
            return Err(SyncError::UnexpectedLogin);
        };

        let expires_at = plantr_auth::peek_expiration(&token)?;
        info!(%expires_at, "login complete");
        *cached = Some(CachedToken {
            token: token.clone(),
            expires_at,
        });
        Ok(token)
    }

    /// Execute seeds in order.
    ///
    /// Inventory hits skip a seed; inventory read errors abort the run;
    /// handler failures are accumulated and joined at the end so one bad
    /// seed never masks the others.
    pub(crate) fn execute_seeds(&self, seeds: &[proto::Seed]) -> Result<(), SyncError> {
        let gate = UpdateGate::new(self.runner.as_ref(), seeds);
        let mut failures: Vec<(String, anyhow::Error)> = Vec::new();

        for seed in seeds {
            let name = &seed.metadata.display_name;

            let skip_inventory = matches!(
                &seed.element,
                proto::SeedElement::GoInstall(install) if install.version.is_none()
            );
            if !skip_inventory {
                match self.inventory.get(&seed.metadata.hash) {
                    Ok(Some(_)) => {
                        info!(seed = %name, "already installed, skipping");
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => return Err(SyncError::Inventory(err)),
                }
            }

            if matches!(&seed.element, proto::SeedElement::SystemPackage(_)) {
                gate.run().map_err(SyncError::SystemUpdate)?;
            }

            info!(seed = %name, "executing seed");
            match self.execute_seed(seed) {
                Ok(Some(mut row)) => {
                    row.hash = seed.metadata.hash.clone();
                    if let Err(err) = self.inventory.put(&row) {
                        failures.push((name.clone(), err.into()));
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!(seed = %name, error = %format!("{err:#}"), "seed failed");
                    failures.push((name.clone(), err));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Seeds(SeedFailures { failures }))
        }
    }

    /// Grab the sync lock directly, letting tests simulate an in-flight
    /// sync without a slow real one.
    #[cfg(test)]
    pub(crate) fn lock_for_test(&self) -> std::sync::MutexGuard<'_, ()> {
        self.sync_lock.lock().expect("sync lock poisoned")
    }

    fn execute_seed(&self, seed: &proto::Seed) -> anyhow::Result<Option<InventoryRow>> {
        match &seed.element {
            proto::SeedElement::ConfigFile(file) => handlers::config_file(file),
            proto::SeedElement::GithubRelease(spec) | proto::SeedElement::UrlDownload(spec) => {
                handlers::download(&self.http, spec)
            }
            proto::SeedElement::SystemPackage(package) => {
                handlers::system_package(self.runner.as_ref(), package)
            }
            proto::SeedElement::GitRepo(spec) => git_repo::execute(spec),
            proto::SeedElement::Golang(golang) => {
                handlers::golang(self.runner.as_ref(), &self.http, golang)
            }
            proto::SeedElement::GoInstall(install) => {
                handlers::go_install(self.runner.as_ref(), install)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Update gate
// ---------------------------------------------------------------------------

/// One-shot package-manager-update latch.
///
/// Bound once per `execute_seeds` call from the first system-package seed's
/// manager; the command runs at most once, strictly before the first
/// install, and its outcome (including failure) is memoized for any later
/// caller.
struct UpdateGate<'a> {
    runner: &'a dyn CommandRunner,
    command: Option<&'static str>,
    state: OnceCell<Result<(), String>>,
}

impl<'a> UpdateGate<'a> {
    fn new(runner: &'a dyn CommandRunner, seeds: &[proto::Seed]) -> Self {
        let command = seeds
            .iter()
            .find_map(|seed| match &seed.element {
                proto::SeedElement::SystemPackage(package) => Some(package),
                _ => None,
            })
            .and_then(|package| match package {
                proto::SystemPackage::Apt { .. } => {
                    Some("sudo DEBIAN_FRONTEND=noninteractive apt update")
                }
                // Homebrew auto-updates on install.
                proto::SystemPackage::Brew { .. } => None,
                proto::SystemPackage::Pacman { .. } => Some("sudo pacman -Sy --noconfirm"),
            });

        Self {
            runner,
            command,
            state: OnceCell::new(),
        }
    }

    fn run(&self) -> Result<(), String> {
        self.state
            .get_or_init(|| {
                let Some(line) = self.command else {
                    return Ok(());
                };
                info!(command = line, "running one-shot package manager update");
                run_shell(self.runner, line)
                    .map(|_| ())
                    .map_err(|err| format!("{err:#}"))
            })
            .clone()
    }
}
