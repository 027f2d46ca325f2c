// src/filesystem/path.rs

//! Path sanitization for untrusted inputs
//!
//! Package archives and repository indexes name the paths they want to own;
//! none of them may escape the target root. Malicious inputs to guard
//! against include `../../../etc/passwd`, absolute paths, and
//! `foo/../../bar`.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Sanitize a path from an untrusted source.
///
/// Rejects `..` components, skips `.` components, strips leading slashes so
/// the result is always relative, and rejects paths that are empty after
/// normalization.
pub fn sanitize_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy();

    let relative = path_str.trim_start_matches('/');

    let mut normalized = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => normalized.push(c),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(Error::PathTraversal(path_str.to_string()));
            }
            Component::Prefix(_) | Component::RootDir => {}
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(Error::PathTraversal(format!(
            "empty path after sanitization: '{path_str}'"
        )));
    }

    Ok(normalized)
}

/// Join a root with an untrusted path, guaranteeing the result stays under
/// the root.
pub fn safe_join(root: impl AsRef<Path>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let sanitized = sanitize_path(path.as_ref())?;
    Ok(root.as_ref().join(sanitized))
}
