// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Service routes
// ---------------------------------------------------------------------------

/// Controller login route. The only controller route that skips auth.
pub const CONTROLLER_LOGIN: &str = "/plantr.v1.ControllerService/Login";
/// Controller sync-data route.
pub const CONTROLLER_GET_SYNC_DATA: &str = "/plantr.v1.ControllerService/GetSyncData";
/// Controller force-refresh route.
pub const CONTROLLER_FORCE_REFRESH: &str = "/plantr.v1.ControllerService/ForceRefresh";
/// Agent-local sync trigger route.
pub const AGENT_SYNC: &str = "/plantr.agent.v1.AgentService/Sync";
/// GitHub push webhook route.
pub const GITHUB_WEBHOOK: &str = "/webhooks/github";

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

/// Request body for both login phases.
///
/// Phase 1 sends only `node_id`; phase 2 adds the challenge id and the
/// value recovered by decrypting the sealed challenge.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    /// The calling node's id.
    pub node_id: String,
    /// Challenge id returned by phase 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_id: Option<String>,
    /// Decrypted challenge value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_value: Option<String>,
}

impl LoginRequest {
    /// Whether this request carries a phase-2 challenge response.
    pub fn is_challenge_response(&self) -> bool {
        self.challenge_id.is_some() && self.challenge_value.is_some()
    }
}

/// Response body for both login phases.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum LoginResponse {
    /// Phase-1 result: a challenge sealed to the node's public key.
    Challenge {
        /// Opaque challenge id, echoed back in phase 2.
        challenge_id: String,
        /// Base64 of the RSA-OAEP-encrypted challenge value.
        sealed_challenge: String,
    },
    /// Phase-2 result: a bearer token.
    Token {
        /// Signed JWT for subsequent calls.
        token: String,
    },
}

// ---------------------------------------------------------------------------
// Sync data
// ---------------------------------------------------------------------------

/// Request body for `GetSyncData`. The node is identified by its token.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct GetSyncDataRequest {}

/// Response body for `GetSyncData`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GetSyncDataResponse {
    /// Rendered seeds, in execution order.
    pub seeds: Vec<Seed>,
}

/// Request body for `ForceRefresh`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ForceRefreshRequest {}

/// Response body for `ForceRefresh`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ForceRefreshResponse {}

/// Request body for the agent-local `Sync` trigger.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SyncRequest {}

/// Response body for the agent-local `Sync` trigger.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SyncResponse {}

// ---------------------------------------------------------------------------
// Rendered seeds
// ---------------------------------------------------------------------------

/// Identification attached to every rendered seed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedMetadata {
    /// Human-readable name for logs and error attribution.
    pub display_name: String,
    /// Content fingerprint keying the agent inventory.
    pub hash: String,
}

/// One rendered work item, ready for the agent to execute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Identification.
    pub metadata: SeedMetadata,
    /// The concrete payload.
    pub element: SeedElement,
}

/// Tagged union of rendered seed payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SeedElement {
    /// A fully rendered file.
    ConfigFile(ConfigFile),
    /// A GitHub release download, already resolved to a URL.
    GithubRelease(Download),
    /// A plain URL download.
    UrlDownload(Download),
    /// A system package for the node's manager.
    SystemPackage(SystemPackage),
    /// A pinned git checkout.
    GitRepo(GitRepo),
    /// The Go toolchain.
    Golang(Golang),
    /// A `go install`-able package.
    GoInstall(GoInstall),
}

/// A rendered configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Final file content.
    pub content: String,
    /// Absolute destination path on the node.
    pub destination: String,
    /// Optional file mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

/// A resolved download, shared by the GitHub-release and URL kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
    /// Direct download URL.
    pub download_url: String,
    /// Directory to install into (the node's bin dir).
    pub destination_directory: String,
    /// Rename the installed binary or directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_override: Option<String>,
    /// Extract the whole archive tree instead of a single binary.
    #[serde(default)]
    pub archive_release: bool,
    /// Pattern selecting the one executable when extracting a binary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_regex: Option<String>,
    /// `Authorization` header value for the download request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_header: Option<String>,
}

/// The manager-specific package payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "manager", rename_all = "snake_case")]
pub enum SystemPackage {
    /// Install via apt.
    Apt {
        /// Package name.
        name: String,
    },
    /// Install via Homebrew.
    Brew {
        /// Package name.
        name: String,
    },
    /// Install via pacman.
    Pacman {
        /// Package name.
        name: String,
    },
}

impl SystemPackage {
    /// The package name regardless of manager.
    pub fn name(&self) -> &str {
        match self {
            Self::Apt { name } | Self::Brew { name } | Self::Pacman { name } => name,
        }
    }
}

/// Which ref of a git repository to pin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum GitRef {
    /// A tag name.
    Tag(String),
    /// A full commit hash.
    Commit(String),
}

/// A pinned git checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepo {
    /// Clone URL.
    pub url: String,
    /// Absolute checkout location on the node.
    pub location: String,
    /// Pinned ref.
    pub reference: GitRef,
}

/// The Go toolchain at a specific version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Golang {
    /// Toolchain version.
    pub version: String,
}

/// A `go install`-able package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoInstall {
    /// Package path.
    pub package: String,
    /// Pinned version; `None` means `@latest`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
