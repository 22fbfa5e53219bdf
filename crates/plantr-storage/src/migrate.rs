// SPDX-License-Identifier: MIT OR Apache-2.0
//! Embedded schema migrations.
//!
//! Migrations are append-only; the applied count is tracked in
//! `PRAGMA user_version` so reruns are cheap no-ops.

use crate::StorageError;
use rusqlite::Connection;
use tracing::debug;

const MIGRATIONS: &[&str] = &[
    include_str!("../migrations/0001_challenge.sql"),
    include_str!("../migrations/0002_github_release_asset.sql"),
    include_str!("../migrations/0003_agent_inventory.sql"),
];

/// Bring a connection's schema up to date.
pub fn run_migrations(conn: &Connection) -> Result<(), StorageError> {
    let applied: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(applied as usize) {
        debug!(migration = index + 1, "applying migration");
        conn.execute_batch(sql)?;
        conn.pragma_update(None, "user_version", (index + 1) as i64)?;
    }

    Ok(())
}
