//! The uniform storage contract and its two implementations.
//!
//! [`StorageBackend`] splits into backend-specific primitives (listing, stat,
//! single-entry mutations, raw streams) and composite operations provided on
//! top of them. Composite operations route through [`crate::tree`], so
//! recursive behaviour is implemented once and is identical on every backend.
//!
//! # Concurrency
//!
//! Backends are `Send + Sync` and keep no per-call state. Two callers
//! mutating the same subtree at once race with undefined interleaving; no
//! isolation is provided between concurrent operations.

pub mod local;
pub mod remote;

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::entry::FileEntry;
use crate::error::{StorageError, StorageResult};
use crate::path;
use crate::tree;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

/// Readable byte stream handed out by a backend. Dropping it closes the file.
pub type ReadHandle = Box<dyn Read + Send>;

/// Writable byte stream handed out by a backend. Dropping it closes the file.
pub type WriteHandle = Box<dyn Write + Send>;

/// Uniform storage operations.
pub trait StorageBackend: Send + Sync {
    /// Short backend name for logs.
    fn kind(&self) -> BackendKind;

    /// Non-recursive listing of a directory in backend-native order.
    ///
    /// Fails with `NotFound` if the path is absent and `NotADirectory` if it
    /// is a file. An empty directory yields an empty vector.
    fn list(&self, path: &str) -> StorageResult<Vec<FileEntry>>;

    /// Describe a single path, or `None` if it does not exist.
    fn stat(&self, path: &str) -> StorageResult<Option<FileEntry>>;

    /// Create directory `name` inside `parent`.
    fn mkdir(&self, parent: &str, name: &str) -> StorageResult<FileEntry>;

    /// Rename an entry within its directory.
    fn rename(&self, path: &str, new_name: &str) -> StorageResult<FileEntry>;

    /// Remove a single file.
    fn remove_file(&self, path: &str) -> StorageResult<()>;

    /// Remove a directory that has no children left.
    fn remove_empty_dir(&self, path: &str) -> StorageResult<()>;

    /// Copy a single file to a path that must not exist yet.
    fn copy_file(&self, src: &str, dst: &str) -> StorageResult<()>;

    /// Move `src` to `dst` in one atomic step if the backend can.
    ///
    /// Returns `Ok(false)` when no atomic move is possible (cross volume,
    /// cross share); callers then fall back to copy and delete.
    fn try_atomic_move(&self, src: &str, dst: &str) -> StorageResult<bool>;

    /// Open a file for reading.
    fn open_read(&self, path: &str) -> StorageResult<ReadHandle>;

    /// Create a new file for writing. Fails with `AlreadyExists` if present.
    fn open_write(&self, path: &str) -> StorageResult<WriteHandle>;

    /// Whether the path exists. Never fails.
    fn exists(&self, path: &str) -> bool {
        matches!(self.stat(path), Ok(Some(_)))
    }

    /// Delete a file, or a directory with all its descendants.
    ///
    /// This is permanent; there is no trash or undo.
    fn delete(&self, path: &str) -> StorageResult<()>
    where
        Self: Sized,
    {
        tree::delete_tree(self, path)
    }

    /// Copy a file or a whole directory tree.
    fn copy(&self, src: &str, dst: &str) -> StorageResult<()>
    where
        Self: Sized,
    {
        tree::copy_tree(self, src, dst)
    }

    /// Move a file or directory tree, atomically when supported.
    fn move_to(&self, src: &str, dst: &str) -> StorageResult<()>
    where
        Self: Sized,
    {
        tree::move_tree(self, src, dst)
    }

    /// Size in bytes; the recursive sum of file sizes for a directory.
    fn size(&self, path: &str) -> StorageResult<u64>
    where
        Self: Sized,
    {
        tree::size_tree(self, path)
    }

    /// Parent directory of a path, or `None` at the root.
    fn parent_path(&self, path: &str) -> Option<String> {
        path::parent(path)
    }

    /// Run `f` with a reader for `path`; the handle is closed on every exit.
    fn read_stream<T, F>(&self, path: &str, f: F) -> StorageResult<T>
    where
        Self: Sized,
        F: FnOnce(&mut dyn Read) -> StorageResult<T>,
    {
        let mut handle = self.open_read(path)?;
        f(&mut handle)
    }

    /// Run `f` with a writer for a new file at `path`.
    ///
    /// The handle is flushed and closed on success. When `f` or the flush
    /// fails, the handle is closed and the partial file removed.
    fn write_stream<T, F>(&self, path: &str, f: F) -> StorageResult<T>
    where
        Self: Sized,
        F: FnOnce(&mut dyn Write) -> StorageResult<T>,
    {
        let mut handle = self.open_write(path)?;
        let result = f(&mut handle).and_then(|value| {
            handle
                .flush()
                .map_err(|e| StorageError::from_io(e, path))
                .map(|_| value)
        });
        drop(handle);

        if result.is_err() {
            if let Err(cleanup) = self.remove_file(path) {
                tracing::warn!(path, error = %cleanup, "Failed to remove partial file");
            }
        }
        result
    }
}

/// Which backend an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Local => write!(f, "local"),
            BackendKind::Remote => write!(f, "remote"),
        }
    }
}

/// Explicit choice between the two backends.
///
/// Callers pick the variant; nothing is inferred from path syntax. A remote
/// backend always carries its own session reference.
#[derive(Clone)]
pub enum Backend {
    Local(LocalBackend),
    Remote(RemoteBackend),
}

macro_rules! dispatch {
    ($self:ident, $backend:ident => $call:expr) => {
        match $self {
            Backend::Local($backend) => $call,
            Backend::Remote($backend) => $call,
        }
    };
}

impl StorageBackend for Backend {
    fn kind(&self) -> BackendKind {
        dispatch!(self, b => b.kind())
    }

    fn list(&self, path: &str) -> StorageResult<Vec<FileEntry>> {
        dispatch!(self, b => b.list(path))
    }

    fn stat(&self, path: &str) -> StorageResult<Option<FileEntry>> {
        dispatch!(self, b => b.stat(path))
    }

    fn mkdir(&self, parent: &str, name: &str) -> StorageResult<FileEntry> {
        dispatch!(self, b => b.mkdir(parent, name))
    }

    fn rename(&self, path: &str, new_name: &str) -> StorageResult<FileEntry> {
        dispatch!(self, b => b.rename(path, new_name))
    }

    fn remove_file(&self, path: &str) -> StorageResult<()> {
        dispatch!(self, b => b.remove_file(path))
    }

    fn remove_empty_dir(&self, path: &str) -> StorageResult<()> {
        dispatch!(self, b => b.remove_empty_dir(path))
    }

    fn copy_file(&self, src: &str, dst: &str) -> StorageResult<()> {
        dispatch!(self, b => b.copy_file(src, dst))
    }

    fn try_atomic_move(&self, src: &str, dst: &str) -> StorageResult<bool> {
        dispatch!(self, b => b.try_atomic_move(src, dst))
    }

    fn open_read(&self, path: &str) -> StorageResult<ReadHandle> {
        dispatch!(self, b => b.open_read(path))
    }

    fn open_write(&self, path: &str) -> StorageResult<WriteHandle> {
        dispatch!(self, b => b.open_write(path))
    }

    fn delete(&self, path: &str) -> StorageResult<()> {
        dispatch!(self, b => b.delete(path))
    }

    fn copy(&self, src: &str, dst: &str) -> StorageResult<()> {
        dispatch!(self, b => b.copy(src, dst))
    }

    fn move_to(&self, src: &str, dst: &str) -> StorageResult<()> {
        dispatch!(self, b => b.move_to(src, dst))
    }

    fn size(&self, path: &str) -> StorageResult<u64> {
        dispatch!(self, b => b.size(path))
    }
}

impl From<LocalBackend> for Backend {
    fn from(backend: LocalBackend) -> Self {
        Backend::Local(backend)
    }
}

impl From<RemoteBackend> for Backend {
    fn from(backend: RemoteBackend) -> Self {
        Backend::Remote(backend)
    }
}
