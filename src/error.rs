// src/error.rs

//! Error types for the aurora engine
//!
//! Every fallible operation in the crate returns this single taxonomy.
//! Wrapped libraries (HTTP client, archive decoder, Lua, OpenPGP) are mapped
//! into it at the module that owns them; their error types never appear in
//! the public surface.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while planning or executing a transaction
#[derive(Error, Debug)]
pub enum Error {
    /// Resolver could not produce a plan (missing package, missing
    /// dependency, or dependency cycle)
    #[error("dependency resolution failed: {0}")]
    ResolutionFailed(String),

    /// Multiple packages virtually provide a dependency and none matches by
    /// exact name
    #[error("dependency '{name}' is provided by multiple packages ({providers}); install one explicitly")]
    AmbiguousProvider { name: String, providers: String },

    /// Install-time precondition failure
    #[error("package '{0}' is already installed")]
    PackageAlreadyInstalled(String),

    /// Remove-time precondition failure
    #[error("package '{0}' is not installed")]
    PackageNotInstalled(String),

    /// A resolved package conflicts with an installed one
    #[error("package '{package}' conflicts with installed package '{conflicts_with}'")]
    ConflictDetected {
        package: String,
        conflicts_with: String,
    },

    /// Removal would leave an installed package with an unsatisfied
    /// dependency
    #[error("cannot remove '{package}': required by installed package '{required_by}'")]
    DependencyViolation {
        package: String,
        required_by: String,
    },

    /// Two packages want the same path, or an unowned file occupies a path a
    /// package needs
    #[error("file conflict: {0}")]
    FileConflict(String),

    /// All mirrors for at least one artifact failed
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// A downloaded artifact failed its SHA-256 check
    #[error("checksum mismatch for {name}: expected {expected}, computed {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// An archive could not be opened or decoded, or contains an unsafe or
    /// unsupported entry
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// A pre-install or pre-remove hook signalled failure
    #[error("scriptlet failed: {0}")]
    ScriptletFailed(String),

    /// Pre-flight free-space check failed
    #[error("not enough free space on {path}: required {required} bytes, available {available}")]
    NotEnoughSpace {
        path: String,
        required: u64,
        available: u64,
    },

    /// A filesystem call required by the transaction failed
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    /// The installed-state store failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// An index or metadata document could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// A repository index signature did not verify against the trusted keys
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// A version string is not a dotted sequence of non-negative integers
    #[error("invalid version '{0}': versions must be dotted non-negative integers")]
    InvalidVersion(String),

    /// A path from an untrusted source attempted to escape its root
    #[error("path traversal rejected: {0}")]
    PathTraversal(String),
}

impl Error {
    /// True if this error was raised during planning, before any state was
    /// touched. Used by front-ends for messaging only; the engine guarantees
    /// planning has no side effects regardless.
    pub fn is_planning_error(&self) -> bool {
        matches!(
            self,
            Error::ResolutionFailed(_)
                | Error::AmbiguousProvider { .. }
                | Error::PackageAlreadyInstalled(_)
                | Error::PackageNotInstalled(_)
                | Error::ConflictDetected { .. }
                | Error::DependencyViolation { .. }
        )
    }
}
