//! Error types shared by every storage backend.

use std::io;

use thiserror::Error;

/// Storage error covering all failure modes of backend and tree operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The path does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The target path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A directory was expected but the path is a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The entry name is blank, reserved, or contains a path separator.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// The path is malformed or the operation makes no sense for it.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A remote operation was attempted without a live session.
    #[error("not connected to a remote share")]
    NotConnected,

    /// The remote session failed (network, authentication, timeout).
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// The caller may not touch the path.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// A non-atomic operation stopped midway and left side effects behind.
    ///
    /// For copies the destination is partially populated; for moves both
    /// source and destination may exist.
    #[error("{operation} partially completed after {completed} item(s): {cause}")]
    PartialFailure {
        /// Operation name (`copy`, `delete`, `move`, `transfer`).
        operation: &'static str,
        /// Number of entries already processed when the failure happened.
        completed: usize,
        /// The failure that stopped the operation.
        #[source]
        cause: Box<StorageError>,
    },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl StorageError {
    /// Map an I/O error on `path` to the matching storage error kind.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path),
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path),
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path),
            io::ErrorKind::NotADirectory => StorageError::NotADirectory(path),
            io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable => {
                StorageError::ConnectionError(format!("{path}: {err}"))
            }
            _ => StorageError::Io(format!("{path}: {err}")),
        }
    }

    /// Wrap `cause` as a partial failure, unless nothing was done yet.
    pub fn partial(operation: &'static str, completed: usize, cause: StorageError) -> Self {
        if completed == 0 {
            return cause;
        }
        StorageError::PartialFailure {
            operation,
            completed,
            cause: Box::new(cause),
        }
    }

    /// Whether this error means the remote session is unusable.
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            StorageError::NotConnected | StorageError::ConnectionError(_)
        )
    }

    /// Whether this is a [`StorageError::PartialFailure`].
    pub fn is_partial(&self) -> bool {
        matches!(self, StorageError::PartialFailure { .. })
    }
}
