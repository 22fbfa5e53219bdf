// SPDX-License-Identifier: MIT OR Apache-2.0
//! SQLite implementation of [`StorageClient`].

use crate::migrate::run_migrations;
use crate::{Challenge, ReleaseAsset, StorageClient, StorageError};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// SQLite-backed storage. A single connection guarded by a mutex: writes
/// are rare (one challenge per login, one cache row per new release) so
/// contention is not a concern.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!(path = %path.display(), "opening sqlite storage");
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database. Used by tests and local development.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let conn = self.conn.lock().expect("storage lock poisoned");
        f(&conn)
    }
}

impl StorageClient for SqliteStorage {
    fn write_challenge(&self, challenge: &Challenge) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO challenge (id, value) VALUES (?1, ?2)",
                params![challenge.id, challenge.value],
            )?;
            Ok(())
        })
    }

    fn read_challenge(&self, id: &str) -> Result<Option<Challenge>, StorageError> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, value FROM challenge WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(Challenge {
                            id: row.get(0)?,
                            value: row.get(1)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    fn delete_challenge(&self, id: &str) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM challenge WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    fn write_release_asset(&self, asset: &ReleaseAsset) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO github_release_asset (hash, os, arch, download_url) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![asset.hash, asset.os, asset.arch, asset.download_url],
            )?;
            Ok(())
        })
    }

    fn read_release_asset(
        &self,
        hash: &str,
        os: &str,
        arch: &str,
    ) -> Result<Option<String>, StorageError> {
        self.with_conn(|conn| {
            let url = conn
                .query_row(
                    "SELECT download_url FROM github_release_asset \
                     WHERE hash = ?1 AND os = ?2 AND arch = ?3",
                    params![hash, os, arch],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(url)
        })
    }

    fn purge(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute_batch("DELETE FROM challenge; DELETE FROM github_release_asset;")?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> SqliteStorage {
        SqliteStorage::open_in_memory().unwrap()
    }

    #[test]
    fn challenge_roundtrip_and_delete() {
        let s = storage();
        let challenge = Challenge {
            id: "c-1".into(),
            value: "secret".into(),
        };
        s.write_challenge(&challenge).unwrap();

        assert_eq!(s.read_challenge("c-1").unwrap(), Some(challenge));
        assert_eq!(s.read_challenge("c-2").unwrap(), None);

        s.delete_challenge("c-1").unwrap();
        assert_eq!(s.read_challenge("c-1").unwrap(), None);

        // Deleting again is a no-op.
        s.delete_challenge("c-1").unwrap();
    }

    #[test]
    fn release_asset_upsert_and_lookup() {
        let s = storage();
        let asset = ReleaseAsset {
            hash: "h1".into(),
            os: "linux".into(),
            arch: "amd64".into(),
            download_url: "https://example.com/v1".into(),
        };
        s.write_release_asset(&asset).unwrap();

        assert_eq!(
            s.read_release_asset("h1", "linux", "amd64").unwrap(),
            Some("https://example.com/v1".into())
        );
        assert_eq!(s.read_release_asset("h1", "darwin", "amd64").unwrap(), None);

        // Writing the same key replaces the URL.
        s.write_release_asset(&ReleaseAsset {
            download_url: "https://example.com/v2".into(),
            ..asset
        })
        .unwrap();
        assert_eq!(
            s.read_release_asset("h1", "linux", "amd64").unwrap(),
            Some("https://example.com/v2".into())
        );
    }

    #[test]
    fn purge_clears_both_tables() {
        let s = storage();
        s.write_challenge(&Challenge {
            id: "c-1".into(),
            value: "v".into(),
        })
        .unwrap();
        s.write_release_asset(&ReleaseAsset {
            hash: "h1".into(),
            os: "linux".into(),
            arch: "amd64".into(),
            download_url: "u".into(),
        })
        .unwrap();

        s.purge().unwrap();
        assert_eq!(s.read_challenge("c-1").unwrap(), None);
        assert_eq!(s.read_release_asset("h1", "linux", "amd64").unwrap(), None);
    }

    #[test]
    fn open_persists_to_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("storage.db");
        {
            let s = SqliteStorage::open(&path).unwrap();
            s.write_challenge(&Challenge {
                id: "c-1".into(),
                value: "v".into(),
            })
            .unwrap();
        }
        let s = SqliteStorage::open(&path).unwrap();
        assert!(s.read_challenge("c-1").unwrap().is_some());
    }
}
