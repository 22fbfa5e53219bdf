// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod migrate;
mod sqlite;

pub use migrate::run_migrations;
pub use sqlite::SqliteStorage;

use std::str::FromStr;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Anything SQLite reported.
    #[error("storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// `STORAGE_TYPE` holds an unknown value.
    #[error("unknown storage type '{0}'")]
    UnknownKind(String),
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A single-use login challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    /// Opaque id the node echoes back.
    pub id: String,
    /// The value sealed to the node's public key.
    pub value: String,
}

/// A cached GitHub release-asset resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseAsset {
    /// Seed fingerprint the resolution belongs to.
    pub hash: String,
    /// Target operating system.
    pub os: String,
    /// Target architecture.
    pub arch: String,
    /// Resolved direct download URL.
    pub download_url: String,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Persistent state the controller delegates to the storage layer.
///
/// Implementations serialize concurrent access internally; callers treat
/// every method as an isolated transaction.
pub trait StorageClient: Send + Sync {
    /// Persist a freshly issued challenge.
    fn write_challenge(&self, challenge: &Challenge) -> Result<(), StorageError>;

    /// Look up a challenge by id. A missing row is `None`, not an error.
    fn read_challenge(&self, id: &str) -> Result<Option<Challenge>, StorageError>;

    /// Remove a consumed challenge. Removing an absent id is a no-op.
    fn delete_challenge(&self, id: &str) -> Result<(), StorageError>;

    /// Upsert a release-asset resolution.
    fn write_release_asset(&self, asset: &ReleaseAsset) -> Result<(), StorageError>;

    /// Look up a cached resolution by `(hash, os, arch)`.
    fn read_release_asset(
        &self,
        hash: &str,
        os: &str,
        arch: &str,
    ) -> Result<Option<String>, StorageError>;

    /// Drop all challenges and cached resolutions.
    fn purge(&self) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// Kind selection
// ---------------------------------------------------------------------------

/// Supported storage backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StorageKind {
    /// Local SQLite file (or `:memory:`).
    #[default]
    Sqlite,
}

impl FromStr for StorageKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(Self::Sqlite),
            other => Err(StorageError::UnknownKind(other.to_string())),
        }
    }
}
