// src/lib.rs

//! Aurora package manager engine
//!
//! The runtime half of the Aurora toolchain: it synchronizes remote
//! repository indexes, resolves dependencies, downloads and verifies
//! artifacts, and applies install/remove/upgrade operations to a target
//! root atomically, with journal-based rollback.
//!
//! # Architecture
//!
//! - One transaction at a time, guarded by a system-wide advisory lock
//! - Three sources of truth kept consistent: the target-root filesystem,
//!   the SQLite installed-state store, and the artifact cache
//! - Backups before mutation; a single atomic database commit per
//!   transaction; rollback restores the pre-transaction state exactly
//! - Package hooks run in an embedded Lua sandbox, never the host shell

pub mod archive;
pub mod crypto;
pub mod db;
mod error;
pub mod fetch;
pub mod filesystem;
pub mod index;
pub mod package;
pub mod repos;
pub mod resolver;
pub mod script;
pub mod transaction;
pub mod version;

pub use error::{Error, Result};
pub use package::{InstalledPackage, Package};
pub use transaction::{
    EngineConfig, FsJournal, PendingInstall, TransactionEngine, TransactionPlan, TransactionState,
};

/// Application name; state paths derive from it
pub const APP_NAME: &str = "aurora";

/// Package archive extension
pub const PKG_EXT: &str = "pkg.tar.zst";

/// Default trusted-key directory
pub const DEFAULT_KEY_DIR: &str = "/etc/aurora/keys";
