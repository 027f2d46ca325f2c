// src/db/store.rs

//! The installed-state store contract
//!
//! Four write operations: `add_installed`, `remove_installed`,
//! `replace_repo_packages`, and `atomic_update`. The engine's COMMIT_DB
//! phase calls only `atomic_update`, which applies its adds and removes
//! inside one SQLite transaction - all or nothing.

use crate::error::Result;
use crate::package::{InstalledPackage, Package};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};

/// Newline-join a list of strings; empty lists become empty strings
fn join(items: &[String]) -> String {
    items.join("\n")
}

fn join_paths(items: &[PathBuf]) -> String {
    items
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a newline-joined string; empty strings become empty lists
fn split(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    s.lines()
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

fn split_paths(s: &str) -> Vec<PathBuf> {
    split(s).into_iter().map(PathBuf::from).collect()
}

/// Scripts are stored as empty strings when absent
fn script_to_db(script: &Option<String>) -> &str {
    script.as_deref().unwrap_or("")
}

fn script_from_db(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

const PACKAGE_COLUMNS: &str = "name, version, arch, description, installed_size, checksum, \
     repo_name, deps, makedepends, provides, conflicts, replaces, \
     pre_install_script, post_install_script, pre_remove_script, post_remove_script, files";

fn package_from_row(row: &Row) -> rusqlite::Result<Package> {
    Ok(Package {
        name: row.get(0)?,
        version: row.get(1)?,
        arch: row.get(2)?,
        description: row.get(3)?,
        installed_size: row.get(4)?,
        checksum: row.get(5)?,
        repo_name: row.get(6)?,
        deps: split(&row.get::<_, String>(7)?),
        makedepends: split(&row.get::<_, String>(8)?),
        provides: split(&row.get::<_, String>(9)?),
        conflicts: split(&row.get::<_, String>(10)?),
        replaces: split(&row.get::<_, String>(11)?),
        pre_install: script_from_db(row.get(12)?),
        post_install: script_from_db(row.get(13)?),
        pre_remove: script_from_db(row.get(14)?),
        post_remove: script_from_db(row.get(15)?),
        files: split_paths(&row.get::<_, String>(16)?),
    })
}

fn installed_from_row(row: &Row) -> rusqlite::Result<InstalledPackage> {
    Ok(InstalledPackage {
        package: package_from_row(row)?,
        install_date: row.get(17)?,
        owned_files: split_paths(&row.get::<_, String>(18)?),
    })
}

fn insert_installed(conn: &Connection, pkg: &InstalledPackage) -> rusqlite::Result<()> {
    let p = &pkg.package;
    conn.execute(
        "INSERT OR REPLACE INTO installed_packages (
            name, version, arch, description, installed_size, checksum,
            repo_name, deps, makedepends, provides, conflicts, replaces,
            pre_install_script, post_install_script, pre_remove_script, post_remove_script,
            files, install_date, owned_files
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            p.name,
            p.version,
            p.arch,
            p.description,
            p.installed_size,
            p.checksum,
            p.repo_name,
            join(&p.deps),
            join(&p.makedepends),
            join(&p.provides),
            join(&p.conflicts),
            join(&p.replaces),
            script_to_db(&p.pre_install),
            script_to_db(&p.post_install),
            script_to_db(&p.pre_remove),
            script_to_db(&p.post_remove),
            join_paths(&p.files),
            pkg.install_date,
            join_paths(&pkg.owned_files),
        ],
    )?;
    Ok(())
}

fn insert_repo_package(conn: &Connection, p: &Package) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO repo_packages (
            name, version, arch, description, installed_size, checksum,
            repo_name, deps, makedepends, provides, conflicts, replaces,
            pre_install_script, post_install_script, pre_remove_script, post_remove_script,
            files
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            p.name,
            p.version,
            p.arch,
            p.description,
            p.installed_size,
            p.checksum,
            p.repo_name,
            join(&p.deps),
            join(&p.makedepends),
            join(&p.provides),
            join(&p.conflicts),
            join(&p.replaces),
            script_to_db(&p.pre_install),
            script_to_db(&p.post_install),
            script_to_db(&p.pre_remove),
            script_to_db(&p.post_remove),
            join_paths(&p.files),
        ],
    )?;
    Ok(())
}

/// Durable store of installed packages and synced repository records
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open the store at the given database path, creating it if needed
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = super::open(db_path)?;
        Ok(Self { conn })
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        super::schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Insert-or-replace an installed package record by name
    pub fn add_installed(&self, pkg: &InstalledPackage) -> Result<()> {
        insert_installed(&self.conn, pkg)?;
        Ok(())
    }

    /// Remove an installed package record; idempotent
    pub fn remove_installed(&self, name: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM installed_packages WHERE name = ?1", [name])?;
        Ok(())
    }

    /// Look up one installed package by name
    pub fn get_installed(&self, name: &str) -> Result<Option<InstalledPackage>> {
        let sql = format!(
            "SELECT {PACKAGE_COLUMNS}, install_date, owned_files FROM installed_packages WHERE name = ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row([name], installed_from_row).optional()?)
    }

    /// Check whether a package is installed
    pub fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.get_installed(name)?.is_some())
    }

    /// List every installed package
    pub fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        let sql = format!(
            "SELECT {PACKAGE_COLUMNS}, install_date, owned_files FROM installed_packages ORDER BY name"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let pkgs = stmt
            .query_map([], installed_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pkgs)
    }

    /// Replace the entire repo table atomically with the given records
    pub fn replace_repo_packages(&mut self, packages: &[Package]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM repo_packages", [])?;
        for pkg in packages {
            insert_repo_package(&tx, pkg)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Look up one repository package by name
    pub fn get_repo_package(&self, name: &str) -> Result<Option<Package>> {
        let sql = format!("SELECT {PACKAGE_COLUMNS} FROM repo_packages WHERE name = ?1");
        let mut stmt = self.conn.prepare(&sql)?;
        Ok(stmt.query_row([name], package_from_row).optional()?)
    }

    /// List every known repository package
    pub fn list_repo_packages(&self) -> Result<Vec<Package>> {
        let sql = format!("SELECT {PACKAGE_COLUMNS} FROM repo_packages ORDER BY name");
        let mut stmt = self.conn.prepare(&sql)?;
        let pkgs = stmt
            .query_map([], package_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pkgs)
    }

    /// Apply a batch of installed-package adds and removes in one database
    /// transaction. This is the sole write the engine performs during
    /// COMMIT_DB: either every mutation applies or none does.
    pub fn atomic_update(&mut self, adds: &[InstalledPackage], removes: &[String]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for name in removes {
            tx.execute("DELETE FROM installed_packages WHERE name = ?1", [name])?;
        }
        for pkg in adds {
            insert_installed(&tx, pkg)?;
        }
        tx.commit()?;
        Ok(())
    }
}
