// src/db/schema.rs

//! Database schema and migrations
//!
//! List-valued fields (`deps`, `files`, ...) are stored as newline-joined
//! text; an empty list round-trips to an empty string. The installed table
//! carries `repo_name` and `post_remove_script` as two distinct columns.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version >= SCHEMA_VERSION {
        debug!("schema is up to date (version {current_version})");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("applying schema migration to version {version}");
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => unreachable!("unknown migration version: {version}"),
    }
}

/// Initial schema - Version 1
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("creating schema version 1");

    conn.execute_batch(
        "
        -- Packages installed on the target system
        CREATE TABLE installed_packages (
            name TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            arch TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            installed_size INTEGER NOT NULL DEFAULT 0,
            checksum TEXT NOT NULL DEFAULT '',
            repo_name TEXT NOT NULL DEFAULT '',
            deps TEXT NOT NULL DEFAULT '',
            makedepends TEXT NOT NULL DEFAULT '',
            provides TEXT NOT NULL DEFAULT '',
            conflicts TEXT NOT NULL DEFAULT '',
            replaces TEXT NOT NULL DEFAULT '',
            pre_install_script TEXT NOT NULL DEFAULT '',
            post_install_script TEXT NOT NULL DEFAULT '',
            pre_remove_script TEXT NOT NULL DEFAULT '',
            post_remove_script TEXT NOT NULL DEFAULT '',
            files TEXT NOT NULL DEFAULT '',
            install_date TEXT NOT NULL DEFAULT '',
            owned_files TEXT NOT NULL DEFAULT ''
        );

        -- Packages advertised by the synced repositories
        CREATE TABLE repo_packages (
            name TEXT PRIMARY KEY,
            version TEXT NOT NULL,
            arch TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            installed_size INTEGER NOT NULL DEFAULT 0,
            checksum TEXT NOT NULL DEFAULT '',
            repo_name TEXT NOT NULL DEFAULT '',
            deps TEXT NOT NULL DEFAULT '',
            makedepends TEXT NOT NULL DEFAULT '',
            provides TEXT NOT NULL DEFAULT '',
            conflicts TEXT NOT NULL DEFAULT '',
            replaces TEXT NOT NULL DEFAULT '',
            pre_install_script TEXT NOT NULL DEFAULT '',
            post_install_script TEXT NOT NULL DEFAULT '',
            pre_remove_script TEXT NOT NULL DEFAULT '',
            post_remove_script TEXT NOT NULL DEFAULT '',
            files TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX idx_installed_provides ON installed_packages(provides);
        CREATE INDEX idx_repo_provides ON repo_packages(provides);
        ",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = create_test_db();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, 0);

        set_schema_version(&conn, 1).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_migrate_creates_all_tables() {
        let conn = create_test_db();
        migrate(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"installed_packages".to_string()));
        assert!(tables.contains(&"repo_packages".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = create_test_db();

        migrate(&conn).unwrap();
        let version1 = get_schema_version(&conn).unwrap();

        migrate(&conn).unwrap();
        let version2 = get_schema_version(&conn).unwrap();

        assert_eq!(version1, version2);
        assert_eq!(version1, SCHEMA_VERSION);
    }

    #[test]
    fn test_repo_name_and_post_remove_are_distinct_columns() {
        let conn = create_test_db();
        migrate(&conn).unwrap();

        conn.execute(
            "INSERT INTO installed_packages (name, version, arch, repo_name, post_remove_script)
             VALUES ('p', '1.0', 'any', 'core', '.hooks/post_remove.lua')",
            [],
        )
        .unwrap();

        let (repo, script): (String, String) = conn
            .query_row(
                "SELECT repo_name, post_remove_script FROM installed_packages WHERE name = 'p'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(repo, "core");
        assert_eq!(script, ".hooks/post_remove.lua");
    }
}
