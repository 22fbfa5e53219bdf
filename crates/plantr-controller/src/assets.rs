// SPDX-License-Identifier: MIT OR Apache-2.0
//! GitHub release asset resolution.
//!
//! Resolutions are cached in storage keyed by `(seed hash, os, arch)` so a
//! fleet of nodes polling the controller does not hammer the GitHub API.

use crate::error::ControllerError;
use plantr_core::{Arch, GithubRelease, Node, Os};
use plantr_storage::{ReleaseAsset, StorageClient};
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// One asset attached to a GitHub release.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct GithubAsset {
    pub(crate) name: String,
    pub(crate) browser_download_url: String,
}

/// Resolves `(repo, tag, os, arch)` to a direct download URL.
pub struct AssetResolver {
    api_base: String,
    token: Option<String>,
    http: reqwest::Client,
    storage: Arc<dyn StorageClient>,
}

impl AssetResolver {
    /// Build a resolver over the given storage cache.
    pub fn new(storage: Arc<dyn StorageClient>, token: Option<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            token,
            http: reqwest::Client::new(),
            storage,
        }
    }

    /// Point API calls at a different base URL. Tests use this to talk to a
    /// local server.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Resolve the download URL for `release` on `node`, consulting and
    /// filling the cache. `hash` is the seed fingerprint keying the cache.
    pub(crate) async fn resolve(
        &self,
        release: &GithubRelease,
        node: &Node,
        hash: &str,
    ) -> Result<String, ControllerError> {
        if let Some(url) =
            self.storage
                .read_release_asset(hash, node.os.as_str(), node.arch.as_str())?
        {
            debug!(repo = release.repo, tag = release.tag, "release asset cache hit");
            return Ok(url);
        }

        let assets = self.fetch_assets(&release.repo, &release.tag).await?;
        let asset = select_asset(release, node, &assets)?;

        self.storage.write_release_asset(&ReleaseAsset {
            hash: hash.to_string(),
            os: node.os.as_str().to_string(),
            arch: node.arch.as_str().to_string(),
            download_url: asset.browser_download_url.clone(),
        })?;

        Ok(asset.browser_download_url.clone())
    }

    async fn fetch_assets(
        &self,
        repo: &str,
        tag: &str,
    ) -> Result<Vec<GithubAsset>, ControllerError> {
        #[derive(Deserialize)]
        struct Release {
            assets: Vec<GithubAsset>,
        }

        let mut request = self
            .http
            .get(format!("{}/repos/{repo}/releases/tags/{tag}", self.api_base))
            .header("accept", "application/vnd.github+json")
            .header("user-agent", "plantr-controller");

        match &self.token {
            Some(token) => request = request.basic_auth("__token__", Some(token)),
            None => warn!(
                "making un-authenticated request to github API, this will likely result in being very quickly rate limited"
            ),
        }

        let release: Release = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(release.assets)
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

fn os_pattern(os: Os) -> &'static str {
    match os {
        Os::Linux => r"(?i)(\b|_|-)linux",
        Os::Darwin => r"(?i)(\b|_|-)(darwin|mac(os)?|apple|osx)",
    }
}

fn arch_pattern(arch: Arch) -> &'static str {
    match arch {
        Arch::Amd64 => r"(?i)(\b|_|-)(x86_64|amd64|x64)",
        Arch::Arm64 => r"(?i)(\b|_|-)(arm64|aarch64)",
    }
}

const CHECKSUM_PATTERN: &str = r"(?i)(\b|_|-)(.sha256|.sha256sum|.sig)$";
const LINUX_PACKAGE_PATTERN: &str = r"(?i)(\b|_|-)(\.deb|\.rpm|\.apk)$";
const MUSL_PATTERN: &str = r"(?i)musl";

/// Pick the one asset for the node's platform.
///
/// A user-supplied pattern must match exactly one asset. Otherwise the
/// auto-detect pipeline narrows the list step by step: drop checksums and
/// signatures, drop OS packages, keep the node's OS, keep the node's arch,
/// prefer musl on linux, stopping early once a single candidate remains.
pub(crate) fn select_asset<'a>(
    release: &GithubRelease,
    node: &Node,
    assets: &'a [GithubAsset],
) -> Result<&'a GithubAsset, ControllerError> {
    if let Some(pattern) = release.asset_pattern(node.os, node.arch) {
        debug!("using user defined asset pattern");
        let regex = compile(pattern)?;
        let matched: Vec<&GithubAsset> =
            assets.iter().filter(|a| regex.is_match(&a.name)).collect();
        if matched.len() != 1 {
            return Err(ControllerError::AssetDetect(format!(
                "expected 1 matching asset for user pattern, got {}",
                matched.len()
            )));
        }
        return Ok(matched[0]);
    }

    debug!("no pattern given, attempting to auto-detect");

    enum Step {
        Drop(&'static str),
        Keep(&'static str),
    }

    let mut steps = vec![
        Step::Drop(CHECKSUM_PATTERN),
        Step::Drop(LINUX_PACKAGE_PATTERN),
        Step::Keep(os_pattern(node.os)),
        Step::Keep(arch_pattern(node.arch)),
    ];
    if node.os == Os::Linux {
        steps.push(Step::Keep(MUSL_PATTERN));
    }

    let mut candidates: Vec<&GithubAsset> = assets.iter().collect();
    for step in steps {
        let (regex, keep) = match step {
            Step::Drop(pattern) => (compile(pattern)?, false),
            Step::Keep(pattern) => (compile(pattern)?, true),
        };
        candidates.retain(|asset| regex.is_match(&asset.name) == keep);
        if candidates.len() == 1 {
            return Ok(candidates[0]);
        }
    }

    Err(ControllerError::AssetDetect(format!(
        "expected 1 asset for {}/{}, got {}",
        node.os,
        node.arch,
        candidates.len()
    )))
}

fn compile(pattern: &str) -> Result<Regex, ControllerError> {
    Regex::new(pattern)
        .map_err(|err| ControllerError::AssetDetect(format!("invalid pattern '{pattern}': {err}")))
}
