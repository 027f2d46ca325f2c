// src/index.rs

//! Repository index and package metadata parsing
//!
//! Two documents share the same schema: `repo.yaml` (a YAML sequence of
//! package records) and the `.AURORA_META` file embedded in every archive
//! (a single record whose `checksum` field declares the SHA-256 of the
//! published archive).

use crate::error::{Error, Result};
use crate::package::Package;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Parse a single package record from a YAML string (`.AURORA_META` content)
pub fn parse_package_str(content: &str) -> Result<Package> {
    serde_yaml::from_str(content).map_err(|e| Error::Parse(format!("package metadata: {e}")))
}

/// Parse a single package record from a file
pub fn parse_package_file(path: &Path) -> Result<Package> {
    let content = fs::read_to_string(path)?;
    parse_package_str(&content)
}

/// Parse a repository index: a YAML sequence of package records.
///
/// Invalid entries are skipped with a warning rather than failing the whole
/// index; a repository with one malformed record should not take the rest of
/// its packages down with it.
pub fn parse_repository_index(path: &Path) -> Result<Vec<Package>> {
    let content = fs::read_to_string(path)?;
    parse_repository_index_str(&content)
}

/// Parse a repository index from a string. An empty document is an empty
/// repository, not an error.
pub fn parse_repository_index_str(content: &str) -> Result<Vec<Package>> {
    let docs: Option<Vec<serde_yaml::Value>> = serde_yaml::from_str(content)
        .map_err(|e| Error::Parse(format!("repository index is not a YAML sequence: {e}")))?;
    let docs = docs.unwrap_or_default();

    let mut packages = Vec::with_capacity(docs.len());
    for node in docs {
        match serde_yaml::from_value::<Package>(node) {
            Ok(pkg) => packages.push(pkg),
            Err(e) => warn!("skipping invalid package record in repository index: {e}"),
        }
    }
    Ok(packages)
}
