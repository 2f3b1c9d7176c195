//! Local filesystem backend.
//!
//! A thin synchronous adapter over `std::fs`. Host paths double as uniform
//! paths. Symbolic links are reported as files and never traversed, so tree
//! operations cannot escape through a link.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::entry::{epoch_millis, FileEntry};
use crate::error::{StorageError, StorageResult};
use crate::path;

use super::{BackendKind, ReadHandle, StorageBackend, WriteHandle};

/// Local device storage.
///
/// When allowed roots are configured, every path must lie within one of them;
/// anything else fails with `PermissionDenied`.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    /// Normalized allowed roots. Empty means all paths are allowed.
    allowed_paths: Vec<String>,
}

impl LocalBackend {
    /// Create a backend with access to the whole filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend restricted to the given roots.
    pub fn with_allowed_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        let allowed_paths = paths
            .into_iter()
            .filter_map(|p| match path::normalize(&p.to_string_lossy()) {
                Ok(normalized) => Some(normalized),
                Err(e) => {
                    tracing::warn!(path = %p.display(), error = %e, "Ignoring allowed path");
                    None
                }
            })
            .collect();
        Self { allowed_paths }
    }

    /// Configured roots, if any.
    pub fn allowed_paths(&self) -> &[String] {
        &self.allowed_paths
    }

    /// Normalize a path and check it against the allowed roots.
    fn resolve(&self, raw: &str) -> StorageResult<String> {
        let uniform = path::normalize(raw)?;
        if !self.allowed_paths.is_empty()
            && !self
                .allowed_paths
                .iter()
                .any(|root| path::is_within(&uniform, root))
        {
            return Err(StorageError::PermissionDenied(uniform));
        }
        Ok(uniform)
    }

    /// Metadata without following a final symlink; `None` if absent.
    fn lookup(path: &str) -> StorageResult<Option<Metadata>> {
        match fs::symlink_metadata(path) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io(e, path)),
        }
    }

    fn require(path: &str) -> StorageResult<Metadata> {
        Self::lookup(path)?.ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    fn require_dir(path: &str) -> StorageResult<()> {
        if Self::require(path)?.is_dir() {
            Ok(())
        } else {
            Err(StorageError::NotADirectory(path.to_string()))
        }
    }

    fn ensure_absent(path: &str) -> StorageResult<()> {
        match Self::lookup(path)? {
            Some(_) => Err(StorageError::AlreadyExists(path.to_string())),
            None => Ok(()),
        }
    }

    fn to_entry(path: String, meta: &Metadata) -> FileEntry {
        let modified = meta.modified().map(epoch_millis).unwrap_or(0);

        if meta.is_dir() {
            return FileEntry::directory(path, modified);
        }

        let size = if meta.file_type().is_symlink() {
            // Report the target size for links to files, 0 otherwise.
            fs::metadata(&path)
                .ok()
                .filter(|target| target.is_file())
                .map(|target| target.len())
                .unwrap_or(0)
        } else {
            meta.len()
        };
        FileEntry::file(path, size, modified)
    }
}

impl StorageBackend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn list(&self, raw: &str) -> StorageResult<Vec<FileEntry>> {
        let dir = self.resolve(raw)?;
        Self::require_dir(&dir)?;

        let entries = fs::read_dir(&dir).map_err(|e| StorageError::from_io(e, dir.as_str()))?;
        let mut results = Vec::new();

        for entry_result in entries {
            let entry = entry_result.map_err(|e| StorageError::from_io(e, dir.as_str()))?;

            let name = entry.file_name().to_string_lossy().to_string();
            let child = path::join(&dir, &name);
            let meta = match fs::symlink_metadata(entry.path()) {
                Ok(m) => m,
                // Removed between read_dir and the metadata lookup.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(dir = %dir, name = %name, "Entry vanished while listing");
                    continue;
                }
                Err(e) => return Err(StorageError::from_io(e, child.as_str())),
            };

            results.push(Self::to_entry(child, &meta));
        }

        Ok(results)
    }

    fn stat(&self, raw: &str) -> StorageResult<Option<FileEntry>> {
        let target = self.resolve(raw)?;
        Ok(Self::lookup(&target)?.map(|meta| Self::to_entry(target, &meta)))
    }

    fn mkdir(&self, parent: &str, name: &str) -> StorageResult<FileEntry> {
        path::validate_name(name)?;
        let parent = self.resolve(parent)?;
        Self::require_dir(&parent)?;

        let target = self.resolve(&path::join(&parent, name))?;
        fs::create_dir(&target).map_err(|e| StorageError::from_io(e, target.as_str()))?;
        tracing::debug!(path = %target, "Created local directory");

        let meta = Self::require(&target)?;
        Ok(Self::to_entry(target, &meta))
    }

    fn rename(&self, raw: &str, new_name: &str) -> StorageResult<FileEntry> {
        path::validate_name(new_name)?;
        let source = self.resolve(raw)?;
        Self::require(&source)?;

        let (parent, _) = path::split(&source)?;
        let target = self.resolve(&path::join(&parent, new_name))?;
        Self::ensure_absent(&target)?;

        fs::rename(&source, &target).map_err(|e| StorageError::from_io(e, source.as_str()))?;
        tracing::debug!(from = %source, to = %target, "Renamed local entry");

        let meta = Self::require(&target)?;
        Ok(Self::to_entry(target, &meta))
    }

    fn remove_file(&self, raw: &str) -> StorageResult<()> {
        let target = self.resolve(raw)?;
        fs::remove_file(&target).map_err(|e| StorageError::from_io(e, target.as_str()))
    }

    fn remove_empty_dir(&self, raw: &str) -> StorageResult<()> {
        let target = self.resolve(raw)?;
        fs::remove_dir(&target).map_err(|e| StorageError::from_io(e, target.as_str()))
    }

    fn copy_file(&self, src: &str, dst: &str) -> StorageResult<()> {
        let source = self.resolve(src)?;
        let target = self.resolve(dst)?;

        if Self::require(&source)?.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "expected a file, found a directory: {source}"
            )));
        }

        let mut reader =
            File::open(&source).map_err(|e| StorageError::from_io(e, source.as_str()))?;
        let mut writer = create_new(&target)?;

        if let Err(e) = io::copy(&mut reader, &mut writer) {
            drop(writer);
            if let Err(cleanup) = fs::remove_file(&target) {
                tracing::warn!(path = %target, error = %cleanup, "Failed to remove partial copy");
            }
            return Err(StorageError::from_io(e, target.as_str()));
        }
        Ok(())
    }

    fn try_atomic_move(&self, src: &str, dst: &str) -> StorageResult<bool> {
        let source = self.resolve(src)?;
        let target = self.resolve(dst)?;
        Self::require(&source)?;
        Self::ensure_absent(&target)?;

        match fs::rename(&source, &target) {
            Ok(()) => {
                tracing::debug!(from = %source, to = %target, "Moved local entry by rename");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                tracing::debug!(from = %source, to = %target, "Rename crosses devices");
                Ok(false)
            }
            Err(e) => Err(StorageError::from_io(e, source.as_str())),
        }
    }

    fn open_read(&self, raw: &str) -> StorageResult<ReadHandle> {
        let source = self.resolve(raw)?;
        if Self::require(&source)?.is_dir() {
            return Err(StorageError::InvalidPath(format!(
                "cannot read a directory: {source}"
            )));
        }
        let file = File::open(&source).map_err(|e| StorageError::from_io(e, source.as_str()))?;
        Ok(Box::new(file))
    }

    fn open_write(&self, raw: &str) -> StorageResult<WriteHandle> {
        let target = self.resolve(raw)?;
        Ok(Box::new(create_new(&target)?))
    }
}

/// Create a file that must not exist yet.
fn create_new(target: &str) -> StorageResult<File> {
    if let Some(parent) = path::parent(target) {
        LocalBackend::require_dir(&parent)?;
    }
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(Path::new(target))
        .map_err(|e| StorageError::from_io(e, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn root(dir: &TempDir) -> String {
        dir.path().to_string_lossy().to_string()
    }

    fn create_test_structure(dir: &Path) {
        fs::create_dir_all(dir.join("subdir")).unwrap();
        fs::write(dir.join("file.txt"), "Hello").unwrap();
        fs::write(dir.join("subdir/nested.txt"), "Nested").unwrap();
    }

    #[test]
    fn test_list_directory() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let backend = LocalBackend::new();

        let mut entries = backend.list(&root(&temp_dir)).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "file.txt");
        assert_eq!(entries[0].size, 5);
        assert!(!entries[0].is_directory);
        assert_eq!(entries[1].name, "subdir");
        assert!(entries[1].is_directory);
        assert_eq!(entries[1].size, 0);

        for entry in &entries {
            assert_eq!(backend.parent_path(&entry.path), Some(root(&temp_dir)));
            assert_eq!(entry.id, entry.path);
        }
    }

    #[test]
    fn test_list_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        let entries = LocalBackend::new().list(&root(&temp_dir)).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_list_errors() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let backend = LocalBackend::new();

        let missing = format!("{}/missing", root(&temp_dir));
        assert!(matches!(backend.list(&missing), Err(StorageError::NotFound(_))));

        let file = format!("{}/file.txt", root(&temp_dir));
        assert!(matches!(backend.list(&file), Err(StorageError::NotADirectory(_))));
    }

    #[test]
    fn test_stat() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let backend = LocalBackend::new();

        let entry = backend
            .stat(&format!("{}/subdir/nested.txt", root(&temp_dir)))
            .unwrap()
            .unwrap();
        assert_eq!(entry.name, "nested.txt");
        assert_eq!(entry.size, 6);
        assert!(entry.last_modified > 0);

        let missing = backend.stat(&format!("{}/nope", root(&temp_dir))).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_mkdir_twice_fails() {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new();

        let created = backend.mkdir(&root(&temp_dir), "new").unwrap();
        assert!(created.is_directory);
        assert_eq!(created.name, "new");

        let second = backend.mkdir(&root(&temp_dir), "new");
        assert!(matches!(second, Err(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn test_mkdir_validation() {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new();

        assert!(matches!(
            backend.mkdir(&root(&temp_dir), "a/b"),
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            backend.mkdir(&root(&temp_dir), " "),
            Err(StorageError::InvalidName(_))
        ));
        assert!(matches!(
            backend.mkdir(&format!("{}/missing", root(&temp_dir)), "x"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_rename() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let backend = LocalBackend::new();
        let base = root(&temp_dir);

        let renamed = backend.rename(&format!("{base}/file.txt"), "renamed.txt").unwrap();
        assert_eq!(renamed.name, "renamed.txt");
        assert!(!backend.exists(&format!("{base}/file.txt")));
        assert!(backend.exists(&format!("{base}/renamed.txt")));

        let clash = backend.rename(&format!("{base}/renamed.txt"), "subdir");
        assert!(matches!(clash, Err(StorageError::AlreadyExists(_))));

        let missing = backend.rename(&format!("{base}/ghost.txt"), "x.txt");
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_copy_file_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let backend = LocalBackend::new();
        let base = root(&temp_dir);

        backend
            .copy_file(&format!("{base}/file.txt"), &format!("{base}/copy.txt"))
            .unwrap();
        assert_eq!(fs::read_to_string(temp_dir.path().join("copy.txt")).unwrap(), "Hello");

        let again = backend.copy_file(&format!("{base}/file.txt"), &format!("{base}/copy.txt"));
        assert!(matches!(again, Err(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn test_atomic_move_same_volume() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let backend = LocalBackend::new();
        let base = root(&temp_dir);

        let moved = backend
            .try_atomic_move(&format!("{base}/subdir"), &format!("{base}/moved"))
            .unwrap();
        assert!(moved);
        assert!(temp_dir.path().join("moved/nested.txt").exists());
        assert!(!temp_dir.path().join("subdir").exists());
    }

    #[test]
    fn test_streams() {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let target = format!("{}/stream.bin", root(&temp_dir));

        backend
            .write_stream(&target, |w| {
                w.write_all(b"streamed bytes")
                    .map_err(|e| StorageError::from_io(e, "stream.bin"))
            })
            .unwrap();

        let contents = backend
            .read_stream(&target, |r| {
                let mut buf = String::new();
                r.read_to_string(&mut buf)
                    .map_err(|e| StorageError::from_io(e, "stream.bin"))?;
                Ok(buf)
            })
            .unwrap();
        assert_eq!(contents, "streamed bytes");

        let exists = backend.write_stream(&target, |_| Ok(()));
        assert!(matches!(exists, Err(StorageError::AlreadyExists(_))));
    }

    #[test]
    fn test_failed_write_stream_removes_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let backend = LocalBackend::new();
        let target = format!("{}/partial.bin", root(&temp_dir));

        let result: StorageResult<()> = backend.write_stream(&target, |w| {
            w.write_all(b"half").unwrap();
            Err(StorageError::Io("interrupted".to_string()))
        });
        assert!(result.is_err());
        assert!(!backend.exists(&target));
    }

    #[test]
    fn test_allowed_paths() {
        let allowed = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        fs::write(other.path().join("secret.txt"), "Secret").unwrap();

        let backend = LocalBackend::with_allowed_paths(vec![allowed.path().to_path_buf()]);
        assert!(backend.list(&root(&allowed)).is_ok());

        let outside = backend.stat(&format!("{}/secret.txt", root(&other)));
        assert!(matches!(outside, Err(StorageError::PermissionDenied(_))));

        let traversal = backend.stat(&format!("{}/../x", root(&allowed)));
        assert!(matches!(traversal, Err(StorageError::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_backslash_names_resolve_back() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("d")).unwrap();
        fs::write(temp_dir.path().join("d/we\\ird.txt"), "odd").unwrap();
        let backend = LocalBackend::new();
        let base = root(&temp_dir);
        let dir = format!("{base}/d");

        let listed = backend.list(&dir).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "we\\ird.txt");
        assert!(backend.exists(&listed[0].path));
        assert_eq!(backend.stat(&listed[0].path).unwrap().unwrap().size, 3);
        assert_eq!(backend.parent_path(&listed[0].path), Some(dir.clone()));

        backend.copy(&dir, &format!("{base}/e")).unwrap();
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("e/we\\ird.txt")).unwrap(),
            "odd"
        );

        backend.delete(&dir).unwrap();
        assert!(!temp_dir.path().join("d").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_list_fails_on_unreadable_entry_metadata() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("inner.txt"), "x").unwrap();
        // Names stay readable but lookups below the directory are refused.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o444)).unwrap();

        let lookups_denied = fs::symlink_metadata(locked.join("inner.txt")).is_err();
        let result = LocalBackend::new().list(&locked.to_string_lossy());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Running as root bypasses permission checks.
        if lookups_denied {
            assert!(matches!(result, Err(StorageError::PermissionDenied(_))));
        } else {
            assert_eq!(result.unwrap().len(), 1);
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_reported_as_file() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        std::os::unix::fs::symlink(temp_dir.path().join("subdir"), temp_dir.path().join("link"))
            .unwrap();

        let entry = LocalBackend::new()
            .stat(&format!("{}/link", root(&temp_dir)))
            .unwrap()
            .unwrap();
        assert!(!entry.is_directory);
        assert_eq!(entry.size, 0);
    }
}
