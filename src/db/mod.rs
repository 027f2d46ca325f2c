// src/db/mod.rs

//! Installed-state store backed by SQLite
//!
//! Two logical collections: `installed_packages` (what is on the system) and
//! `repo_packages` (what the synced repositories offer). All writes go
//! through the four operations on [`store::Store`]; the transaction engine
//! performs exactly one store write per transaction, the atomic batch
//! update.

pub mod schema;
pub mod store;

pub use store::Store;

use crate::error::Result;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Open (creating if necessary) the database at `path` with the pragmas the
/// engine relies on: WAL journaling for crash safety, foreign keys on.
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    schema::migrate(&conn)?;
    debug!("opened database at {}", path.display());
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("var/lib/aurora/aurora.db");

        let _conn = open(&db_path).unwrap();
        assert!(db_path.exists());
    }

    #[test]
    fn test_open_sets_wal_mode() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("aurora.db");

        let conn = open(&db_path).unwrap();
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
    }
}
