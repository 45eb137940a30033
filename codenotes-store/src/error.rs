//! Error types for codenotes-store

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Remote operation that failed during synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Push,
    Pull,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOperation::Push => write!(f, "push"),
            SyncOperation::Pull => write!(f, "pull"),
        }
    }
}

/// Errors that can occur in the annotation store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The repository root could not be created or initialized
    #[error("Failed to initialize annotation repository at {}: {reason}", .path.display())]
    RepositoryInit { path: PathBuf, reason: String },

    /// An operation needing a repository ran before `initialize`
    #[error("Annotation repository is not initialized")]
    RepositoryNotInitialized,

    /// A local version-control command failed
    #[error("git {operation} failed: {reason}")]
    Vcs { operation: String, reason: String },

    /// Push or pull against a remote failed
    #[error("Failed to {operation} '{remote}': {reason}")]
    Sync {
        operation: SyncOperation,
        remote: String,
        reason: String,
    },

    /// The annotation document could not be written
    #[error("Failed to write annotations to {}: {reason}", .path.display())]
    StorageWrite { path: PathBuf, reason: String },

    /// An annotation with the same id already exists in the project
    #[error("Annotation already exists: {id}")]
    DuplicateAnnotation { id: String },
}

impl StoreError {
    /// Create a repository initialization error
    pub fn repository_init(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::RepositoryInit {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a local version-control error
    pub fn vcs(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Vcs {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a synchronization error
    pub fn sync(operation: SyncOperation, remote: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Sync {
            operation,
            remote: remote.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a storage write error
    pub fn storage_write(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::StorageWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable camelCase tag for presentation layers
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::RepositoryInit { .. } => "repositoryInit",
            StoreError::RepositoryNotInitialized => "repositoryNotInitialized",
            StoreError::Vcs { .. } => "vcs",
            StoreError::Sync { .. } => "sync",
            StoreError::StorageWrite { .. } => "storageWrite",
            StoreError::DuplicateAnnotation { .. } => "duplicateAnnotation",
        }
    }
}

/// Non-fatal problem found while loading a project's document.
///
/// The store degrades to an empty collection and hands this back to the
/// caller instead of failing the load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageReadWarning {
    #[error("Could not read {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("Malformed annotation document {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Unsupported annotation document version '{version}' in {}", .path.display())]
    UnsupportedVersion { path: PathBuf, version: String },
}

impl StorageReadWarning {
    /// Path of the document the warning refers to
    pub fn path(&self) -> &PathBuf {
        match self {
            StorageReadWarning::Unreadable { path, .. }
            | StorageReadWarning::Malformed { path, .. }
            | StorageReadWarning::UnsupportedVersion { path, .. } => path,
        }
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
