//! Error types shared by every backend.
//!
//! The taxonomy is closed: callers branch on [`FileOpError`] kinds, never on
//! message text. Edit and read failures wrap it with their own extra
//! conditions.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of per-file failure kinds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FileOpError {
    /// No file at the path.
    FileNotFound,
    /// The OS refused access.
    PermissionDenied,
    /// Expected a file, found a directory.
    IsDirectory,
    /// The path is malformed, unsafe, or escapes its root.
    ///
    /// The execution-scoped store also reports creation conflicts this way.
    InvalidPath,
    /// Create-only operation targeted an existing file.
    AlreadyExists,
}

impl std::error::Error for FileOpError {}

impl From<&io::Error> for FileOpError {
    fn from(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => FileOpError::FileNotFound,
            io::ErrorKind::PermissionDenied => FileOpError::PermissionDenied,
            io::ErrorKind::IsADirectory => FileOpError::IsDirectory,
            io::ErrorKind::AlreadyExists => FileOpError::AlreadyExists,
            _ => FileOpError::InvalidPath,
        }
    }
}

impl From<io::Error> for FileOpError {
    fn from(e: io::Error) -> Self {
        FileOpError::from(&e)
    }
}

/// Failure of a string-replacement edit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// The target could not be loaded or stored.
    #[error("{0}")]
    Op(#[from] FileOpError),

    /// `old_string` does not occur in the file.
    #[error("old_string not found in file content")]
    NotFound,

    /// `old_string` occurs more than once and `replace_all` was not set.
    #[error(
        "old_string appears {count} times. Provide more context to make it unique, or set replace_all=true."
    )]
    Ambiguous {
        /// How many times `old_string` occurs.
        count: usize,
    },

    /// `old_string == new_string`; the edit would be a no-op.
    #[error("old_string and new_string are identical")]
    Identical,
}

/// Failure of a paginated read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    /// One of the taxonomy kinds.
    #[error("{kind}: {path}")]
    Op {
        /// The failure kind.
        kind: FileOpError,
        /// The path as the caller supplied it.
        path: String,
    },

    /// The file exceeds the backend's size limit.
    #[error("file too large ({size} bytes, max {max} bytes): {path}")]
    TooLarge {
        /// The path as the caller supplied it.
        path: String,
        /// Actual size on disk.
        size: u64,
        /// Configured limit.
        max: u64,
    },
}

impl ReadError {
    /// Create an `Op` error.
    pub fn op(kind: FileOpError, path: impl Into<String>) -> Self {
        Self::Op {
            kind,
            path: path.into(),
        }
    }

    /// Create a `FileNotFound` error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::op(FileOpError::FileNotFound, path)
    }

    /// The taxonomy kind, if this is not a size failure.
    pub fn kind(&self) -> Option<FileOpError> {
        match self {
            ReadError::Op { kind, .. } => Some(*kind),
            ReadError::TooLarge { .. } => None,
        }
    }
}

/// A path rejected by [`crate::paths::validate`].
///
/// Every variant surfaces to callers as [`FileOpError::InvalidPath`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A literal `..` segment.
    #[error("Path traversal not allowed: {0}")]
    Traversal(String),

    /// A `~` anywhere in the path.
    #[error("Home directory expansion not allowed: {0}")]
    HomeExpansion(String),

    /// A Windows drive-letter absolute path such as `C:\`.
    #[error("Windows absolute paths not allowed: {0}")]
    DriveLetter(String),

    /// The normalized path is outside every allowed prefix.
    #[error("Path {path} not within allowed prefixes: {allowed:?}")]
    OutsideAllowed {
        /// The normalized path.
        path: String,
        /// The prefixes that were allowed.
        allowed: Vec<String>,
    },

    /// The path resolves outside the backend's root directory.
    #[error("Path escapes root directory: {0}")]
    EscapesRoot(String),
}

impl From<PathError> for FileOpError {
    fn from(_: PathError) -> Self {
        FileOpError::InvalidPath
    }
}

/// Misuse of the backend contract itself.
///
/// These are returned from bulk operations instead of per-item results and
/// indicate a programming error, not a runtime condition.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend has no way to perform this operation.
    #[error("{backend} does not support {operation}")]
    Unsupported {
        /// Backend type name.
        backend: &'static str,
        /// Operation name.
        operation: &'static str,
    },

    /// A worker task running a blocking operation failed.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl BackendError {
    /// Create an `Unsupported` error.
    pub fn unsupported(backend: &'static str, operation: &'static str) -> Self {
        Self::Unsupported { backend, operation }
    }
}

/// Result type for bulk operations.
pub type BackendResult<T> = Result<T, BackendError>;
