// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agent error types.

use crate::client::ClientError;
use plantr_auth::{KeyError, TokenError};
use plantr_inventory::InventoryError;
use std::fmt;

/// Why a sync run failed.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Another sync holds the lock. Callers surface this as "unavailable"
    /// rather than an error worth retrying immediately.
    #[error("sync already in progress")]
    InProgress,

    /// Talking to the controller failed.
    #[error(transparent)]
    Transport(#[from] ClientError),

    /// The controller answered a login phase with the wrong message shape.
    #[error("unexpected login response from controller")]
    UnexpectedLogin,

    /// The sealed challenge could not be decrypted.
    #[error("error opening challenge: {0}")]
    Auth(#[from] KeyError),

    /// The minted token could not be inspected.
    #[error("error reading token expiration: {0}")]
    Token(#[from] TokenError),

    /// An inventory read failed. Fatal for the whole run: executing with a
    /// half-consulted inventory risks mass re-installation.
    #[error("error reading inventory: {0}")]
    Inventory(#[from] InventoryError),

    /// The one-shot package-manager update failed before the first
    /// system-package seed.
    #[error("error running package manager update: {0}")]
    SystemUpdate(String),

    /// One or more seeds failed; the rest of the run completed.
    #[error(transparent)]
    Seeds(#[from] SeedFailures),
}

/// Accumulated per-seed failures, each attributed to its display name.
#[derive(Debug)]
pub struct SeedFailures {
    /// `(display name, error)` pairs, in execution order.
    pub failures: Vec<(String, anyhow::Error)>,
}

impl fmt::Display for SeedFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} seed(s) failed:", self.failures.len())?;
        for (name, err) in &self.failures {
            writeln!(f, "  {name}: {err:#}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SeedFailures {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_failures_name_every_seed() {
        let failures = SeedFailures {
            failures: vec![
                ("PKG:one".into(), anyhow::anyhow!("install failed")),
                ("~/.bashrc".into(), anyhow::anyhow!("permission denied")),
            ],
        };
        let rendered = failures.to_string();
        assert!(rendered.contains("2 seed(s) failed"));
        assert!(rendered.contains("PKG:one: install failed"));
        assert!(rendered.contains("~/.bashrc: permission denied"));
    }
}
