// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod github;
mod local;

pub use github::GithubGitClient;
pub use local::StaticGitClient;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the git hosting layer.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// A GitHub client needs an access token.
    #[error("git access token is required")]
    MissingToken,

    /// The repository URL is not a recognized GitHub URL.
    #[error("unable to extract owner/repo from URL '{0}'")]
    UrlParse(String),

    /// The REST API could not be reached or answered with an error status.
    #[error("error querying git API: {0}")]
    Api(#[from] reqwest::Error),

    /// The API answered with an unexpected body.
    #[error("unexpected API payload: {0}")]
    Payload(String),

    /// libgit2 failed while cloning or checking out.
    #[error("error cloning repository: {0}")]
    Clone(#[from] git2::Error),

    /// The blocking clone task was cancelled or panicked.
    #[error("clone task failed: {0}")]
    Task(String),

    /// Temp-dir allocation for the checkout failed.
    #[error("error staging checkout: {0}")]
    Io(#[from] std::io::Error),

    /// `GIT_TYPE` holds an unknown value.
    #[error("unknown git type '{0}'")]
    UnknownKind(String),
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// A repository checkout the caller can read from.
///
/// Temporary checkouts own their directory and remove it on drop; static
/// checkouts borrow a long-lived path on disk.
#[derive(Debug)]
pub enum Checkout {
    /// A clone staged into a scoped temp directory.
    Temp(tempfile::TempDir),
    /// A fixed local path, used by [`StaticGitClient`].
    Fixed(PathBuf),
}

impl Checkout {
    /// Root directory of the checkout.
    pub fn path(&self) -> &Path {
        match self {
            Self::Temp(dir) => dir.path(),
            Self::Fixed(path) => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Access to the hosted configuration repository.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// The most recent commit hash on the default branch.
    async fn latest_commit(&self, url: &str) -> Result<String, GitError>;

    /// Clone the repository and check out `commit`.
    async fn clone_at_commit(&self, url: &str, commit: &str) -> Result<Checkout, GitError>;

    /// The tag name of the most recent release.
    async fn latest_release(&self, url: &str) -> Result<String, GitError>;
}

// ---------------------------------------------------------------------------
// Kind selection
// ---------------------------------------------------------------------------

/// Supported git client backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GitKind {
    /// Hosted on GitHub.
    #[default]
    Github,
    /// A fixed local checkout, for development.
    Static,
}

impl FromStr for GitKind {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::Github),
            "static" => Ok(Self::Static),
            other => Err(GitError::UnknownKind(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_kind_parses() {
        assert_eq!("github".parse::<GitKind>().unwrap(), GitKind::Github);
        assert_eq!("static".parse::<GitKind>().unwrap(), GitKind::Static);
        assert!("gitlab".parse::<GitKind>().is_err());
    }

    #[test]
    fn checkout_path_for_fixed() {
        let checkout = Checkout::Fixed("/srv/plantr-repo".into());
        assert_eq!(checkout.path(), Path::new("/srv/plantr-repo"));
    }
}
