//! Recursive directory operations shared by every backend.
//!
//! Everything here is written against the [`StorageBackend`] primitives only,
//! so local and remote trees behave identically. Walks are depth-first and
//! visit children in the backend's listing order.
//!
//! None of these operations are atomic. When one fails after making changes,
//! the error is a [`StorageError::PartialFailure`] carrying the number of
//! entries already processed; the changes are not rolled back.

use std::io::{Read, Write};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::backend::{BackendKind, StorageBackend};
use crate::entry::FileEntry;
use crate::error::{StorageError, StorageResult};
use crate::path;
use crate::query::name_matches;

/// Buffer size for streamed transfers (64KB).
pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

fn require<B: StorageBackend + ?Sized>(backend: &B, target: &str) -> StorageResult<FileEntry> {
    backend
        .stat(target)?
        .ok_or_else(|| StorageError::NotFound(target.to_string()))
}

fn ensure_absent<B: StorageBackend + ?Sized>(backend: &B, target: &str) -> StorageResult<()> {
    match backend.stat(target)? {
        Some(_) => Err(StorageError::AlreadyExists(target.to_string())),
        None => Ok(()),
    }
}

fn reject_into_self(src: &str, dst: &str) -> StorageResult<()> {
    if path::is_within(dst, src) {
        return Err(StorageError::InvalidPath(format!(
            "cannot place a directory inside itself: {src} -> {dst}"
        )));
    }
    Ok(())
}

/// Copy a file or directory tree to a path that must not exist yet.
pub fn copy_tree<B: StorageBackend + ?Sized>(backend: &B, src: &str, dst: &str) -> StorageResult<()> {
    copy_counted(backend, src, dst).map(|_| ())
}

/// Copy and report how many entries were created.
fn copy_counted<B: StorageBackend + ?Sized>(
    backend: &B,
    src: &str,
    dst: &str,
) -> StorageResult<usize> {
    let src = path::normalize(src)?;
    let dst = path::normalize(dst)?;

    let source = require(backend, &src)?;
    ensure_absent(backend, &dst)?;

    if !source.is_directory {
        backend.copy_file(&src, &dst)?;
        return Ok(1);
    }
    reject_into_self(&src, &dst)?;

    let mut completed = 0;
    copy_dir(backend, &src, &dst, &mut completed)
        .map_err(|e| StorageError::partial("copy", completed, e))?;
    tracing::debug!(from = %src, to = %dst, entries = completed, "Copied directory tree");
    Ok(completed)
}

fn copy_dir<B: StorageBackend + ?Sized>(
    backend: &B,
    src: &str,
    dst: &str,
    completed: &mut usize,
) -> StorageResult<()> {
    let (parent, name) = path::split(dst)?;
    backend.mkdir(&parent, &name)?;
    *completed += 1;

    for child in backend.list(src)? {
        let target = path::join(dst, &child.name);
        if child.is_directory {
            copy_dir(backend, &child.path, &target, completed)?;
        } else {
            backend.copy_file(&child.path, &target)?;
            *completed += 1;
        }
    }
    Ok(())
}

/// Delete a file, or a directory and all of its descendants.
///
/// Children are removed before their directory. The root is refused.
pub fn delete_tree<B: StorageBackend + ?Sized>(backend: &B, target: &str) -> StorageResult<()> {
    let target = path::normalize(target)?;
    if target == path::ROOT {
        return Err(StorageError::InvalidPath(
            "refusing to delete the root".to_string(),
        ));
    }

    let entry = require(backend, &target)?;
    if !entry.is_directory {
        return backend.remove_file(&target);
    }

    let mut completed = 0;
    delete_dir(backend, &target, &mut completed)
        .map_err(|e| StorageError::partial("delete", completed, e))?;
    tracing::debug!(path = %target, entries = completed, "Deleted directory tree");
    Ok(())
}

fn delete_dir<B: StorageBackend + ?Sized>(
    backend: &B,
    dir: &str,
    completed: &mut usize,
) -> StorageResult<()> {
    for child in backend.list(dir)? {
        if child.is_directory {
            delete_dir(backend, &child.path, completed)?;
        } else {
            backend.remove_file(&child.path)?;
            *completed += 1;
        }
    }
    backend.remove_empty_dir(dir)?;
    *completed += 1;
    Ok(())
}

/// Size of a file, or the sum of all file sizes beneath a directory.
pub fn size_tree<B: StorageBackend + ?Sized>(backend: &B, target: &str) -> StorageResult<u64> {
    let target = path::normalize(target)?;
    let entry = require(backend, &target)?;
    if !entry.is_directory {
        return Ok(entry.size);
    }
    dir_size(backend, &target)
}

fn dir_size<B: StorageBackend + ?Sized>(backend: &B, dir: &str) -> StorageResult<u64> {
    let mut total: u64 = 0;
    for child in backend.list(dir)? {
        let size = if child.is_directory {
            dir_size(backend, &child.path)?
        } else {
            child.size
        };
        total = total.saturating_add(size);
    }
    Ok(total)
}

/// Result of [`search_tree`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    /// Matches in pre-order.
    pub entries: Vec<FileEntry>,
    /// Directories below the root whose listing was denied. Their contents
    /// are missing from `entries`.
    pub skipped: Vec<String>,
}

impl SearchOutcome {
    /// Whether every directory under the root was searched.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Find entries whose name contains `query`, ignoring case.
///
/// Non-recursive search filters the direct children of `root`. Recursive
/// search walks the whole tree and returns matches in pre-order; a matching
/// directory is still descended into. Subdirectories that deny access are
/// not searched and are reported in [`SearchOutcome::skipped`]. An empty
/// query matches everything.
pub fn search_tree<B: StorageBackend + ?Sized>(
    backend: &B,
    root: &str,
    query: &str,
    recursive: bool,
) -> StorageResult<SearchOutcome> {
    let root = path::normalize(root)?;
    let mut outcome = SearchOutcome::default();

    if !recursive {
        outcome.entries = backend
            .list(&root)?
            .into_iter()
            .filter(|entry| name_matches(&entry.name, query))
            .collect();
        return Ok(outcome);
    }

    search_dir(backend, &root, query, &mut outcome)?;
    tracing::debug!(
        root = %root,
        query,
        matches = outcome.entries.len(),
        skipped = outcome.skipped.len(),
        "Search finished"
    );
    Ok(outcome)
}

fn search_dir<B: StorageBackend + ?Sized>(
    backend: &B,
    dir: &str,
    query: &str,
    outcome: &mut SearchOutcome,
) -> StorageResult<()> {
    for entry in backend.list(dir)? {
        let descend = entry.is_directory.then(|| entry.path.clone());
        if name_matches(&entry.name, query) {
            outcome.entries.push(entry);
        }

        if let Some(child) = descend {
            match search_dir(backend, &child, query, outcome) {
                Ok(()) => {}
                Err(StorageError::PermissionDenied(denied)) => {
                    tracing::warn!(path = %child, error = %denied, "Skipping unreadable directory during search");
                    outcome.skipped.push(child);
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Move a file or directory tree.
///
/// Uses the backend's atomic move when it can. Otherwise copies, then
/// deletes the source; if that delete fails both trees exist and the error is
/// a `move` partial failure.
pub fn move_tree<B: StorageBackend + ?Sized>(backend: &B, src: &str, dst: &str) -> StorageResult<()> {
    let src = path::normalize(src)?;
    let dst = path::normalize(dst)?;
    if src == path::ROOT {
        return Err(StorageError::InvalidPath("cannot move the root".to_string()));
    }

    let source = require(backend, &src)?;
    ensure_absent(backend, &dst)?;
    if source.is_directory {
        reject_into_self(&src, &dst)?;
    }

    if backend.try_atomic_move(&src, &dst)? {
        tracing::debug!(from = %src, to = %dst, "Moved atomically");
        return Ok(());
    }

    let copied = copy_counted(backend, &src, &dst)?;
    delete_tree(backend, &src).map_err(|e| {
        tracing::warn!(from = %src, to = %dst, error = %e, "Source removal failed after copy");
        StorageError::PartialFailure {
            operation: "move",
            completed: copied,
            cause: Box::new(e),
        }
    })?;
    tracing::debug!(from = %src, to = %dst, entries = copied, "Moved by copy and delete");
    Ok(())
}

/// Checksum of one file written by [`transfer_tree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChecksum {
    /// Destination path.
    pub path: String,
    pub size: u64,
    /// Hex-encoded SHA-256.
    pub sha256: String,
}

/// Outcome of a cross-backend transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReport {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    pub checksums: Vec<FileChecksum>,
}

impl TransferReport {
    fn entries(&self) -> usize {
        self.files + self.directories
    }
}

/// Copy a file or tree from one backend to another through byte streams.
///
/// Each file is hashed while it is written and then read back from the
/// destination; a digest mismatch fails the transfer.
pub fn transfer_tree<S, D>(
    source: &S,
    src: &str,
    destination: &D,
    dst: &str,
) -> StorageResult<TransferReport>
where
    S: StorageBackend + ?Sized,
    D: StorageBackend + ?Sized,
{
    let src = path::normalize(src)?;
    let dst = path::normalize(dst)?;

    let entry = require(source, &src)?;
    ensure_absent(destination, &dst)?;
    // Two local backends share one filesystem.
    if entry.is_directory
        && source.kind() == BackendKind::Local
        && destination.kind() == BackendKind::Local
    {
        reject_into_self(&src, &dst)?;
    }

    let mut report = TransferReport::default();
    let result = if entry.is_directory {
        transfer_dir(source, &src, destination, &dst, &mut report)
    } else {
        transfer_file(source, &src, destination, &dst, &mut report)
    };
    result.map_err(|e| StorageError::partial("transfer", report.entries(), e))?;

    tracing::info!(
        from = %src,
        from_backend = %source.kind(),
        to = %dst,
        to_backend = %destination.kind(),
        files = report.files,
        bytes = report.bytes,
        "Transfer complete"
    );
    Ok(report)
}

fn transfer_dir<S, D>(
    source: &S,
    src: &str,
    destination: &D,
    dst: &str,
    report: &mut TransferReport,
) -> StorageResult<()>
where
    S: StorageBackend + ?Sized,
    D: StorageBackend + ?Sized,
{
    let (parent, name) = path::split(dst)?;
    destination.mkdir(&parent, &name)?;
    report.directories += 1;

    for child in source.list(src)? {
        let target = path::join(dst, &child.name);
        if child.is_directory {
            transfer_dir(source, &child.path, destination, &target, report)?;
        } else {
            transfer_file(source, &child.path, destination, &target, report)?;
        }
    }
    Ok(())
}

fn transfer_file<S, D>(
    source: &S,
    src: &str,
    destination: &D,
    dst: &str,
    report: &mut TransferReport,
) -> StorageResult<()>
where
    S: StorageBackend + ?Sized,
    D: StorageBackend + ?Sized,
{
    let mut reader = source.open_read(src)?;
    let mut writer = destination.open_write(dst)?;

    let streamed = pump(&mut reader, &mut writer, src, dst);
    drop(writer);
    drop(reader);

    let (size, written_hash) = match streamed {
        Ok(done) => done,
        Err(e) => {
            if let Err(cleanup) = destination.remove_file(dst) {
                tracing::warn!(path = %dst, error = %cleanup, "Failed to remove partial file");
            }
            return Err(e);
        }
    };

    let mut check = destination.open_read(dst)?;
    let (_, stored_hash) = digest(&mut check, dst)?;
    if stored_hash != written_hash {
        return Err(StorageError::Io(format!(
            "checksum mismatch for {dst}: expected {written_hash}, got {stored_hash}"
        )));
    }

    report.files += 1;
    report.bytes += size;
    report.checksums.push(FileChecksum {
        path: dst.to_string(),
        size,
        sha256: written_hash,
    });
    Ok(())
}

/// Copy all bytes, hashing them on the way. Returns size and hex digest.
fn pump(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    src: &str,
    dst: &str,
) -> StorageResult<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| StorageError::from_io(e, src))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .map_err(|e| StorageError::from_io(e, dst))?;
        hasher.update(&buffer[..read]);
        size += read as u64;
    }
    writer.flush().map_err(|e| StorageError::from_io(e, dst))?;

    Ok((size, hex::encode(hasher.finalize())))
}

fn digest(reader: &mut dyn Read, label: &str) -> StorageResult<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut size = 0u64;

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| StorageError::from_io(e, label))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::backend::{LocalBackend, RemoteBackend};
    use crate::connections::ConnectionProfile;
    use crate::session::{MemoryConnector, MemoryShare, SmbSession};

    fn root(dir: &TempDir) -> String {
        dir.path().to_string_lossy().to_string()
    }

    fn create_test_tree(dir: &std::path::Path) {
        fs::create_dir_all(dir.join("src/a/deep")).unwrap();
        fs::create_dir_all(dir.join("src/b")).unwrap();
        fs::write(dir.join("src/top.txt"), "0123456789").unwrap();
        fs::write(dir.join("src/a/one.log"), "abc").unwrap();
        fs::write(dir.join("src/a/deep/Report.PDF"), "12345").unwrap();
        fs::write(dir.join("src/b/two.txt"), "xy").unwrap();
    }

    async fn remote_backend() -> (RemoteBackend, MemoryShare) {
        let share = MemoryShare::new();
        share.add_share("data");
        share.add_file("/data/docs/a.txt", "alpha");
        share.add_file("/data/docs/b.txt", "bravo");
        share.add_file("/data/docs/sub/c.txt", "charlie");
        share.add_share("archive");

        let session = SmbSession::new(Arc::new(MemoryConnector::new(share.clone())));
        session
            .connect(ConnectionProfile::new("nas", "10.0.0.5").with_anonymous(true))
            .await
            .unwrap();
        (RemoteBackend::new(session), share)
    }

    #[test]
    fn test_copy_tree_preserves_structure() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let backend = LocalBackend::new();
        let base = root(&temp_dir);

        copy_tree(&backend, &format!("{base}/src"), &format!("{base}/dst")).unwrap();

        assert_eq!(
            fs::read_to_string(temp_dir.path().join("dst/a/deep/Report.PDF")).unwrap(),
            "12345"
        );
        assert!(temp_dir.path().join("dst/b/two.txt").exists());
        assert_eq!(
            size_tree(&backend, &format!("{base}/dst")).unwrap(),
            size_tree(&backend, &format!("{base}/src")).unwrap()
        );
    }

    #[test]
    fn test_copy_tree_preconditions() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let backend = LocalBackend::new();
        let base = root(&temp_dir);

        let missing = copy_tree(&backend, &format!("{base}/nope"), &format!("{base}/x"));
        assert!(matches!(missing, Err(StorageError::NotFound(_))));

        let exists = copy_tree(&backend, &format!("{base}/src/top.txt"), &format!("{base}/src/b/two.txt"));
        assert!(matches!(exists, Err(StorageError::AlreadyExists(_))));

        let into_self = copy_tree(&backend, &format!("{base}/src"), &format!("{base}/src/a/copy"));
        assert!(matches!(into_self, Err(StorageError::InvalidPath(_))));
    }

    #[test]
    fn test_delete_tree() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let backend = LocalBackend::new();
        let base = root(&temp_dir);

        delete_tree(&backend, &format!("{base}/src")).unwrap();
        assert!(!temp_dir.path().join("src").exists());

        let again = delete_tree(&backend, &format!("{base}/src"));
        assert!(matches!(again, Err(StorageError::NotFound(_))));

        assert!(matches!(
            delete_tree(&backend, "/"),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_mkdir_then_delete() {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let created = backend.mkdir(&root(&temp_dir), "x").unwrap();
        backend.delete(&created.path).unwrap();
        assert!(!backend.exists(&created.path));
    }

    #[test]
    fn test_size_tree() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let backend = LocalBackend::new();
        let base = root(&temp_dir);

        assert_eq!(size_tree(&backend, &format!("{base}/src")).unwrap(), 20);
        assert_eq!(size_tree(&backend, &format!("{base}/src/top.txt")).unwrap(), 10);
        assert_eq!(size_tree(&backend, &format!("{base}/src/b")).unwrap(), 2);
    }

    #[test]
    fn test_search_tree() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let backend = LocalBackend::new();
        let src = format!("{}/src", root(&temp_dir));

        let everything = search_tree(&backend, &src, "", true).unwrap();
        assert_eq!(everything.entries.len(), 7);
        assert!(everything.is_complete());

        let direct = search_tree(&backend, &src, "", false).unwrap();
        assert_eq!(direct.entries.len(), 3);

        let report = search_tree(&backend, &src, "report", true).unwrap().entries;
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].name, "Report.PDF");

        let shallow = search_tree(&backend, &src, "report", false).unwrap();
        assert!(shallow.entries.is_empty());

        // a matching directory is still descended into
        let matches = search_tree(&backend, &src, "E", true).unwrap().entries;
        let names: Vec<_> = matches.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"deep"));
        assert!(names.contains(&"Report.PDF"));
        assert!(names.contains(&"one.log"));
    }

    #[test]
    fn test_search_results_are_preorder() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let backend = LocalBackend::new();
        let src = format!("{}/src", root(&temp_dir));

        let results = search_tree(&backend, &src, "", true).unwrap().entries;
        for (index, entry) in results.iter().enumerate() {
            let parent = entry.parent_path().unwrap();
            if parent != src {
                let parent_index = results.iter().position(|e| e.path == parent).unwrap();
                assert!(parent_index < index);
            }
        }
    }

    #[test]
    fn test_move_tree_local() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let backend = LocalBackend::new();
        let base = root(&temp_dir);

        move_tree(&backend, &format!("{base}/src"), &format!("{base}/moved")).unwrap();
        assert!(!temp_dir.path().join("src").exists());
        assert!(temp_dir.path().join("moved/a/deep/Report.PDF").exists());

        let into_self = move_tree(&backend, &format!("{base}/moved"), &format!("{base}/moved/a/x"));
        assert!(matches!(into_self, Err(StorageError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_remote_copy_partial_failure() {
        let (backend, share) = remote_backend().await;
        share.deny("/archive/docs/b.txt");

        let result = copy_tree(&backend, "/data/docs", "/archive/docs");
        match result {
            Err(StorageError::PartialFailure {
                operation,
                completed,
                cause,
            }) => {
                assert_eq!(operation, "copy");
                assert_eq!(completed, 2);
                assert!(matches!(*cause, StorageError::PermissionDenied(_)));
            }
            other => panic!("expected partial failure, got {other:?}"),
        }
        // what was copied before the failure stays
        assert_eq!(share.read_file("/archive/docs/a.txt").unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn test_remote_delete_partial_failure() {
        let (backend, share) = remote_backend().await;
        share.deny("/data/docs/b.txt");

        let result = delete_tree(&backend, "/data/docs");
        assert!(matches!(
            result,
            Err(StorageError::PartialFailure {
                operation: "delete",
                ..
            })
        ));
        assert!(!share.contains("/data/docs/a.txt"));
        assert!(share.contains("/data/docs/b.txt"));
    }

    #[tokio::test]
    async fn test_remote_move_fallback_reports_partial_failure() {
        let (backend, share) = remote_backend().await;
        share.deny("/data/docs/sub");

        let result = move_tree(&backend, "/data/docs", "/archive/docs");
        // listing /data/docs/sub is denied, so the copy itself stops midway
        assert!(matches!(
            result,
            Err(StorageError::PartialFailure {
                operation: "copy",
                ..
            })
        ));

        share.allow("/data/docs/sub");
        share.set_read_only("/data/docs/sub/c.txt");
        let result = move_tree(&backend, "/data/docs", "/archive/moved");
        match result {
            Err(StorageError::PartialFailure { operation, .. }) => assert_eq!(operation, "move"),
            other => panic!("expected move partial failure, got {other:?}"),
        }
        assert!(share.contains("/archive/moved/sub/c.txt"));
        assert!(share.contains("/data/docs/sub/c.txt"));
    }

    #[tokio::test]
    async fn test_remote_search_reports_denied_directories() {
        let (backend, share) = remote_backend().await;
        share.deny("/data/docs/sub");

        let outcome = search_tree(&backend, "/data", "", true).unwrap();
        let paths: Vec<_> = outcome.entries.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"/data/docs/sub"));
        assert!(!paths.contains(&"/data/docs/sub/c.txt"));
        assert!(!outcome.is_complete());
        assert_eq!(outcome.skipped, vec!["/data/docs/sub".to_string()]);

        // the root itself is not skippable
        share.deny("/data");
        assert!(matches!(
            search_tree(&backend, "/data", "", true),
            Err(StorageError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_transfer_local_to_remote_and_back() {
        let (remote, share) = remote_backend().await;
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let local = LocalBackend::new();
        let base = root(&temp_dir);

        let up = transfer_tree(&local, &format!("{base}/src"), &remote, "/archive/src").unwrap();
        assert_eq!(up.files, 4);
        assert_eq!(up.directories, 4);
        assert_eq!(up.bytes, 20);
        assert_eq!(share.read_file("/archive/src/a/one.log").unwrap(), b"abc");

        let down = transfer_tree(&remote, "/data/docs", &local, &format!("{base}/docs")).unwrap();
        assert_eq!(down.files, 3);
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("docs/sub/c.txt")).unwrap(),
            "charlie"
        );
        let alpha = down
            .checksums
            .iter()
            .find(|c| c.path.ends_with("/docs/a.txt"))
            .unwrap();
        assert_eq!(alpha.sha256, hex::encode(Sha256::digest(b"alpha")));
    }

    #[test]
    fn test_transfer_between_local_backends_refuses_own_subtree() {
        let temp_dir = TempDir::new().unwrap();
        create_test_tree(temp_dir.path());
        let base = root(&temp_dir);

        let result = transfer_tree(
            &LocalBackend::new(),
            &format!("{base}/src"),
            &LocalBackend::new(),
            &format!("{base}/src/inner"),
        );
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
        assert!(!temp_dir.path().join("src/inner").exists());

        let report = transfer_tree(
            &LocalBackend::new(),
            &format!("{base}/src/a"),
            &LocalBackend::new(),
            &format!("{base}/src/b/a"),
        )
        .unwrap();
        assert_eq!(report.files, 2);
    }

    #[tokio::test]
    async fn test_transfer_refuses_existing_destination() {
        let (remote, _share) = remote_backend().await;
        let temp_dir = TempDir::new().unwrap();
        let local = LocalBackend::new();

        let result = transfer_tree(&remote, "/data/docs", &local, &root(&temp_dir));
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));
    }
}
