// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fixed-path git client for local development.

use crate::{Checkout, GitClient, GitError};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;

/// Serves a checkout that already exists on local disk.
///
/// `latest_commit` always answers the same placeholder, so `ensure_config`
/// re-reads the directory on every refresh. Useful while iterating on a
/// configuration repository without pushing.
pub struct StaticGitClient {
    checkout_path: PathBuf,
}

impl StaticGitClient {
    /// Build a client serving `checkout_path`.
    pub fn new(checkout_path: impl Into<PathBuf>) -> Result<Self, GitError> {
        let checkout_path = checkout_path.into();
        if checkout_path.as_os_str().is_empty() {
            return Err(GitError::UrlParse("checkout path is required".into()));
        }
        Ok(Self { checkout_path })
    }
}

#[async_trait]
impl GitClient for StaticGitClient {
    async fn latest_commit(&self, _url: &str) -> Result<String, GitError> {
        Ok("not-a-real-commit".to_string())
    }

    async fn clone_at_commit(&self, _url: &str, commit: &str) -> Result<Checkout, GitError> {
        debug!(commit, path = %self.checkout_path.display(), "serving static checkout");
        Ok(Checkout::Fixed(self.checkout_path.clone()))
    }

    async fn latest_release(&self, _url: &str) -> Result<String, GitError> {
        Ok("fake-tag".to_string())
    }
}
