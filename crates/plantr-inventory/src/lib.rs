// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the inventory layer.
///
/// Read errors are fatal for an agent run: a half-consulted inventory
/// risks mass re-installation.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    /// Anything SQLite reported.
    #[error("inventory error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Migration bootstrap failed.
    #[error(transparent)]
    Storage(#[from] plantr_storage::StorageError),

    /// `STORAGE_TYPE` holds an unknown value.
    #[error("unknown inventory type '{0}'")]
    UnknownKind(String),
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// One applied seed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InventoryRow {
    /// Seed fingerprint; primary key.
    pub hash: String,
    /// Filesystem location the seed produced, when it has one.
    pub path: Option<String>,
    /// Package name the seed installed, when it has one.
    pub package: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Persistent set of applied seeds.
pub trait Inventory: Send + Sync {
    /// Look up a row by fingerprint. A missing row is `None`, not an error.
    fn get(&self, hash: &str) -> Result<Option<InventoryRow>, InventoryError>;

    /// Record a row, purging prior rows whose `path` or `package` collides
    /// with the new row's values. Runs as a single transaction.
    fn put(&self, row: &InventoryRow) -> Result<(), InventoryError>;
}

// ---------------------------------------------------------------------------
// SQLite implementation
// ---------------------------------------------------------------------------

/// SQLite-backed inventory.
pub struct SqliteInventory {
    conn: Mutex<Connection>,
}

impl SqliteInventory {
    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: &Path) -> Result<Self, InventoryError> {
        info!(path = %path.display(), "opening sqlite inventory");
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database. Used by tests.
    pub fn open_in_memory() -> Result<Self, InventoryError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, InventoryError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        plantr_storage::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Inventory for SqliteInventory {
    fn get(&self, hash: &str) -> Result<Option<InventoryRow>, InventoryError> {
        let conn = self.conn.lock().expect("inventory lock poisoned");
        let row = conn
            .query_row(
                "SELECT hash, path, package FROM agent_inventory WHERE hash = ?1",
                [hash],
                |row| {
                    Ok(InventoryRow {
                        hash: row.get(0)?,
                        path: row.get(1)?,
                        package: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    fn put(&self, row: &InventoryRow) -> Result<(), InventoryError> {
        let mut conn = self.conn.lock().expect("inventory lock poisoned");
        let tx = conn.transaction()?;

        if let Some(package) = &row.package {
            let purged = tx.execute(
                "DELETE FROM agent_inventory WHERE package = ?1",
                [package],
            )?;
            if purged > 0 {
                debug!(package, purged, "purged colliding package rows");
            }
        }
        if let Some(path) = &row.path {
            let purged = tx.execute("DELETE FROM agent_inventory WHERE path = ?1", [path])?;
            if purged > 0 {
                debug!(path, purged, "purged colliding path rows");
            }
        }

        tx.execute(
            "INSERT OR REPLACE INTO agent_inventory (hash, path, package) VALUES (?1, ?2, ?3)",
            params![row.hash, row.path, row.package],
        )?;
        tx.commit()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Noop implementation
// ---------------------------------------------------------------------------

/// Inventory that remembers nothing: every seed always re-runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopInventory;

impl Inventory for NoopInventory {
    fn get(&self, _hash: &str) -> Result<Option<InventoryRow>, InventoryError> {
        Ok(None)
    }

    fn put(&self, _row: &InventoryRow) -> Result<(), InventoryError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Kind selection
// ---------------------------------------------------------------------------

/// Supported inventory backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InventoryKind {
    /// Local SQLite file.
    #[default]
    Sqlite,
    /// No persistence at all.
    None,
}

impl FromStr for InventoryKind {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(Self::Sqlite),
            "none" => Ok(Self::None),
            other => Err(InventoryError::UnknownKind(other.to_string())),
        }
    }
}
