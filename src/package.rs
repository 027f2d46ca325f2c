// src/package.rs

//! Package data model
//!
//! A `Package` is a repository record: the metadata a repository index (or a
//! package archive's embedded metadata document) declares for one package.
//! An `InstalledPackage` is the same record plus what the engine learned at
//! install time: the install date and the concrete set of files it owns on
//! disk. `owned_files` is ground truth for uninstall and rollback.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A package as described by a repository index or archive metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    pub arch: String,
    #[serde(default)]
    pub description: String,
    /// Uncompressed size on disk, in bytes
    #[serde(default)]
    pub installed_size: i64,
    /// Hex SHA-256 of the package archive
    pub checksum: String,
    /// Originating repository; assigned during sync
    #[serde(default)]
    pub repo_name: String,

    /// Runtime dependencies (opaque names or virtual provisions)
    #[serde(default)]
    pub deps: Vec<String>,
    /// Build-time dependencies; recorded but unused by the runtime engine
    #[serde(default)]
    pub makedepends: Vec<String>,
    /// Virtual names this package satisfies
    #[serde(default)]
    pub provides: Vec<String>,
    /// Names that must not be concurrently installed
    #[serde(default)]
    pub conflicts: Vec<String>,
    /// Names whose installation implicitly removes them
    #[serde(default)]
    pub replaces: Vec<String>,

    /// Archive-relative hook script paths
    #[serde(default)]
    pub pre_install: Option<String>,
    #[serde(default)]
    pub post_install: Option<String>,
    #[serde(default)]
    pub pre_remove: Option<String>,
    #[serde(default)]
    pub post_remove: Option<String>,

    /// Archive-relative paths this package will own once installed
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Package {
    /// Artifact filename as published in a repository: `<name>-<version>.pkg.tar.zst`
    pub fn artifact_name(&self) -> String {
        format!("{}-{}.{}", self.name, self.version, crate::PKG_EXT)
    }
}

/// A package installed on the target system
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledPackage {
    pub package: Package,
    /// ISO local date (YYYY-MM-DD) of installation
    pub install_date: String,
    /// The exact paths (relative to the target root) created by the engine
    /// for this package
    pub owned_files: Vec<PathBuf>,
}

impl InstalledPackage {
    pub fn name(&self) -> &str {
        &self.package.name
    }

    pub fn version(&self) -> &str {
        &self.package.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name() {
        let pkg = Package {
            name: "zlib".to_string(),
            version: "1.3.1".to_string(),
            arch: "x86_64".to_string(),
            description: String::new(),
            installed_size: 0,
            checksum: "00".to_string(),
            repo_name: String::new(),
            deps: vec![],
            makedepends: vec![],
            provides: vec![],
            conflicts: vec![],
            replaces: vec![],
            pre_install: None,
            post_install: None,
            pre_remove: None,
            post_remove: None,
            files: vec![],
        };
        assert_eq!(pkg.artifact_name(), "zlib-1.3.1.pkg.tar.zst");
    }
}
