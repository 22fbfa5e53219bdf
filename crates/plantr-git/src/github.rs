// SPDX-License-Identifier: MIT OR Apache-2.0
//! GitHub-hosted repository client.

use crate::{Checkout, GitClient, GitError};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tempfile::TempDir;
use tracing::debug;

const DEFAULT_API_BASE: &str = "https://api.github.com";

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(https://github\.com/|git@github\.com:)(?P<owner>[a-zA-Z0-9_.\-]+)/(?P<repo>[a-zA-Z0-9_.\-]+?)(\.git)?$",
        )
        .expect("static pattern compiles")
    })
}

/// Client for repositories hosted on GitHub.
///
/// Commit and release lookups go through the REST API; clones go through
/// libgit2 on the blocking pool, authenticating as `__token__`.
#[derive(Debug)]
pub struct GithubGitClient {
    token: String,
    api_base: String,
    http: reqwest::Client,
}

impl GithubGitClient {
    /// Build a client. The token is required; unauthenticated access to
    /// private configuration repositories cannot work.
    pub fn new(token: impl Into<String>) -> Result<Self, GitError> {
        let token = token.into();
        if token.is_empty() {
            return Err(GitError::MissingToken);
        }
        Ok(Self {
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            http: reqwest::Client::new(),
        })
    }

    /// Point REST calls at a different base URL. Tests use this to talk to
    /// a local server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn parse_url(url: &str) -> Result<(String, String), GitError> {
        let captures = url_pattern()
            .captures(url)
            .ok_or_else(|| GitError::UrlParse(url.to_string()))?;
        let owner = captures["owner"].to_string();
        let repo = captures["repo"].to_string();
        Ok((owner, repo))
    }
}

#[async_trait]
impl GitClient for GithubGitClient {
    async fn latest_commit(&self, url: &str) -> Result<String, GitError> {
        #[derive(Deserialize)]
        struct Commit {
            sha: String,
        }

        let (owner, repo) = Self::parse_url(url)?;
        debug!(owner, repo, "querying latest commit");

        let commits: Vec<Commit> = self
            .http
            .get(format!("{}/repos/{owner}/{repo}/commits", self.api_base))
            .query(&[("per_page", "1")])
            .header("accept", "application/vnd.github+json")
            .header("user-agent", "plantr-controller")
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        commits
            .into_iter()
            .next()
            .map(|c| c.sha)
            .ok_or_else(|| GitError::Payload("repository has no commits".into()))
    }

    async fn clone_at_commit(&self, url: &str, commit: &str) -> Result<Checkout, GitError> {
        let url = url.to_string();
        let commit = commit.to_string();
        let token = self.token.clone();

        let dir = tokio::task::spawn_blocking(move || clone_blocking(&url, &commit, &token))
            .await
            .map_err(|err| GitError::Task(err.to_string()))??;

        Ok(Checkout::Temp(dir))
    }

    async fn latest_release(&self, url: &str) -> Result<String, GitError> {
        #[derive(Deserialize)]
        struct Release {
            tag_name: String,
        }

        let (owner, repo) = Self::parse_url(url)?;
        debug!(owner, repo, "querying latest release");

        let release: Release = self
            .http
            .get(format!(
                "{}/repos/{owner}/{repo}/releases/latest",
                self.api_base
            ))
            .header("accept", "application/vnd.github+json")
            .header("user-agent", "plantr-controller")
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(release.tag_name)
    }
}

/// Clone `url` into a fresh temp dir and detach HEAD at `commit`.
///
/// A full fetch, not a shallow one: webhook deliveries can reference a
/// commit that is no longer the branch head by the time we clone.
fn clone_blocking(url: &str, commit: &str, token: &str) -> Result<TempDir, GitError> {
    let dir = tempfile::Builder::new().prefix("plantr-checkout").tempdir()?;

    let mut callbacks = git2::RemoteCallbacks::new();
    let token = token.to_string();
    callbacks.credentials(move |_, _, _| git2::Cred::userpass_plaintext("__token__", &token));

    let mut fetch = git2::FetchOptions::new();
    fetch.remote_callbacks(callbacks);

    let repo = git2::build::RepoBuilder::new()
        .fetch_options(fetch)
        .clone(url, dir.path())?;

    let oid = git2::Oid::from_str(commit)?;
    let target = repo.find_commit(oid)?;

    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(target.as_object(), Some(&mut checkout))?;
    repo.set_head_detached(oid)?;

    Ok(dir)
}
