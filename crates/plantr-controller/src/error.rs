// SPDX-License-Identifier: MIT OR Apache-2.0
//! Controller-wide error type.

use plantr_auth::{KeyError, TokenError};
use plantr_core::{ParseError, SeedError};
use plantr_git::GitError;
use plantr_storage::StorageError;
use plantr_vault::VaultError;

/// Everything the controller can fail with. The HTTP boundary translates
/// these into transport codes; internal callers always see this type.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Login or sync for a node the configuration does not know.
    #[error("unknown node id '{0}'")]
    UnknownNodeId(String),

    /// Phase-2 login with a challenge id that was never issued (or was
    /// already consumed).
    #[error("unknown challenge id")]
    UnknownChallengeId,

    /// Phase-2 login with the wrong challenge value.
    #[error("incorrect challenge value")]
    IncorrectChallengeValue,

    /// A node references a role the configuration does not define.
    #[error("node '{node}' references unknown role '{role}'")]
    UnknownRole {
        /// The node being synced.
        node: String,
        /// The missing role.
        role: String,
    },

    /// Repository access failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// The cloned repository did not parse.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The config-parsing task was cancelled or panicked.
    #[error("config load task failed: {0}")]
    LoadTask(String),

    /// Storage layer failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Vault read failure.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// A seed could not be resolved for the target node.
    #[error(transparent)]
    Seed(#[from] SeedError),

    /// Challenge sealing failed.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Token minting failed.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// A `config_file` template failed to render.
    #[error("error rendering template: {0}")]
    Template(#[from] minijinja::Error),

    /// The GitHub release API could not be reached.
    #[error("error getting release assets: {0}")]
    Github(#[from] reqwest::Error),

    /// Asset selection found no unique match.
    #[error("unable to auto-detect release asset: {0}")]
    AssetDetect(String),

    /// Webhook delivery without a valid signature.
    #[error("invalid webhook signature")]
    WebhookSignature,

    /// Webhook delivery but no secret configured.
    #[error("webhook secret is not configured")]
    WebhookNotConfigured,

    /// Webhook body was not a push event.
    #[error("unexpected webhook payload: {0}")]
    WebhookPayload(String),
}
