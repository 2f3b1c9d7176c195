//! SMB share backend.
//!
//! Paths take the form `/share/dir/file`; `/` lists the server's shares.
//! Every call goes through the session's live connection and fails with
//! `NotConnected` before touching the network when there is none.

use std::io::{self, Write};

use crate::entry::{epoch_millis, FileEntry};
use crate::error::{StorageError, StorageResult};
use crate::path;
use crate::session::address::{is_share_root, share_of};
use crate::session::smb::ActiveConnection;
use crate::session::{RemoteStat, SmbSession};
use crate::tree;

use super::{BackendKind, ReadHandle, StorageBackend, WriteHandle};

/// Storage on a remote SMB server, bound to an explicit session.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    session: SmbSession,
}

impl RemoteBackend {
    pub fn new(session: SmbSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SmbSession {
        &self.session
    }

    /// Run `op` against the live connection.
    ///
    /// Connection failures reported by the transport mark the session failed.
    fn call<T>(&self, op: impl FnOnce(&ActiveConnection) -> StorageResult<T>) -> StorageResult<T> {
        let connection = self.session.active()?;
        let result = op(&connection);
        if let Err(StorageError::ConnectionError(msg)) = &result {
            self.session.mark_failed(msg.clone());
        }
        result
    }

    /// Normalize a path, failing first when there is no live connection.
    fn resolve(&self, raw: &str) -> StorageResult<String> {
        self.session.active()?;
        path::normalize(raw)
    }

    fn to_entry(uniform: String, stat: &RemoteStat) -> FileEntry {
        let modified = epoch_millis(stat.modified);
        if stat.is_directory {
            FileEntry::directory(uniform, modified)
        } else {
            FileEntry::file(uniform, stat.size, modified)
        }
    }

    fn lookup(connection: &ActiveConnection, uniform: &str) -> StorageResult<Option<FileEntry>> {
        if uniform == path::ROOT {
            return Ok(Some(FileEntry::directory(path::ROOT, 0)));
        }
        match connection.transport.stat(&connection.url(uniform)) {
            Ok(stat) => Ok(Some(Self::to_entry(uniform.to_string(), &stat))),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn require(connection: &ActiveConnection, uniform: &str) -> StorageResult<FileEntry> {
        Self::lookup(connection, uniform)?.ok_or_else(|| StorageError::NotFound(uniform.to_string()))
    }

    fn ensure_absent(connection: &ActiveConnection, uniform: &str) -> StorageResult<()> {
        match Self::lookup(connection, uniform)? {
            Some(_) => Err(StorageError::AlreadyExists(uniform.to_string())),
            None => Ok(()),
        }
    }

    /// Shares and the server root are not ordinary entries.
    fn ensure_below_share(uniform: &str, action: &str) -> StorageResult<()> {
        if uniform == path::ROOT || is_share_root(uniform) {
            return Err(StorageError::PermissionDenied(format!(
                "cannot {action} a share or the server root: {uniform}"
            )));
        }
        Ok(())
    }
}

impl StorageBackend for RemoteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn list(&self, raw: &str) -> StorageResult<Vec<FileEntry>> {
        let dir = self.resolve(raw)?;
        self.call(|c| {
            let stats = c.transport.list(&c.url(&dir))?;
            Ok(stats
                .iter()
                .filter(|s| !s.name.is_empty() && s.name != "." && s.name != "..")
                .map(|s| Self::to_entry(path::join(&dir, &s.name), s))
                .collect())
        })
    }

    fn stat(&self, raw: &str) -> StorageResult<Option<FileEntry>> {
        let target = self.resolve(raw)?;
        self.call(|c| Self::lookup(c, &target))
    }

    fn mkdir(&self, parent: &str, name: &str) -> StorageResult<FileEntry> {
        let parent = self.resolve(parent)?;

        self.call(|c| {
            path::validate_name(name)?;
            if parent == path::ROOT {
                return Err(StorageError::PermissionDenied(format!(
                    "cannot create shares: {name}"
                )));
            }
            let target = path::join(&parent, name);

            if !Self::require(c, &parent)?.is_directory {
                return Err(StorageError::NotADirectory(parent.clone()));
            }
            Self::ensure_absent(c, &target)?;
            c.transport.mkdir(&c.url(&target))?;
            tracing::debug!(path = %target, "Created remote directory");
            Self::require(c, &target)
        })
    }

    fn rename(&self, raw: &str, new_name: &str) -> StorageResult<FileEntry> {
        let source = self.resolve(raw)?;

        self.call(|c| {
            path::validate_name(new_name)?;
            Self::ensure_below_share(&source, "rename")?;
            let (parent, _) = path::split(&source)?;
            let target = path::join(&parent, new_name);

            Self::require(c, &source)?;
            Self::ensure_absent(c, &target)?;
            c.transport.rename(&c.url(&source), &c.url(&target))?;
            tracing::debug!(from = %source, to = %target, "Renamed remote entry");
            Self::require(c, &target)
        })
    }

    fn remove_file(&self, raw: &str) -> StorageResult<()> {
        let target = self.resolve(raw)?;
        self.call(|c| {
            Self::ensure_below_share(&target, "delete")?;
            c.transport.remove_file(&c.url(&target))
        })
    }

    fn remove_empty_dir(&self, raw: &str) -> StorageResult<()> {
        let target = self.resolve(raw)?;
        self.call(|c| {
            Self::ensure_below_share(&target, "delete")?;
            c.transport.remove_dir(&c.url(&target))
        })
    }

    fn copy_file(&self, src: &str, dst: &str) -> StorageResult<()> {
        let source = self.resolve(src)?;
        let target = self.resolve(dst)?;

        self.call(|c| {
            if Self::require(c, &source)?.is_directory {
                return Err(StorageError::InvalidPath(format!(
                    "expected a file, found a directory: {source}"
                )));
            }
            Self::ensure_absent(c, &target)?;

            let mut reader = c.transport.open_read(&c.url(&source))?;
            let mut writer = c.transport.open_write(&c.url(&target))?;
            let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.flush());
            drop(writer);

            if let Err(e) = copied {
                if let Err(cleanup) = c.transport.remove_file(&c.url(&target)) {
                    tracing::warn!(path = %target, error = %cleanup, "Failed to remove partial copy");
                }
                return Err(StorageError::from_io(e, target.as_str()));
            }
            Ok(())
        })
    }

    fn try_atomic_move(&self, src: &str, dst: &str) -> StorageResult<bool> {
        let source = self.resolve(src)?;
        let target = self.resolve(dst)?;

        self.call(|c| {
            Self::ensure_below_share(&source, "move")?;
            Self::ensure_below_share(&target, "replace")?;
            if share_of(&source) != share_of(&target) {
                tracing::debug!(from = %source, to = %target, "Move crosses shares");
                return Ok(false);
            }

            Self::require(c, &source)?;
            Self::ensure_absent(c, &target)?;
            c.transport.rename(&c.url(&source), &c.url(&target))?;
            tracing::debug!(from = %source, to = %target, "Moved remote entry by rename");
            Ok(true)
        })
    }

    fn open_read(&self, raw: &str) -> StorageResult<ReadHandle> {
        let source = self.resolve(raw)?;
        self.call(|c| {
            if Self::require(c, &source)?.is_directory {
                return Err(StorageError::InvalidPath(format!(
                    "cannot read a directory: {source}"
                )));
            }
            c.transport.open_read(&c.url(&source))
        })
    }

    fn open_write(&self, raw: &str) -> StorageResult<WriteHandle> {
        let target = self.resolve(raw)?;
        self.call(|c| {
            Self::ensure_below_share(&target, "write")?;
            Self::ensure_absent(c, &target)?;
            c.transport.open_write(&c.url(&target))
        })
    }

    fn delete(&self, raw: &str) -> StorageResult<()> {
        let target = self.resolve(raw)?;
        Self::ensure_below_share(&target, "delete")?;
        tree::delete_tree(self, &target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::sync::Arc;

    use crate::connections::ConnectionProfile;
    use crate::session::{ConnectionStatus, MemoryConnector, MemoryShare};

    fn create_test_share() -> MemoryShare {
        let share = MemoryShare::new();
        share.add_share("public");
        share.add_share("media");
        share.add_file("/media/movies/a.mkv", vec![1u8; 100]);
        share.add_file("/media/movies/b.mkv", vec![2u8; 50]);
        share.add_file("/media/readme.txt", "read me");
        share
    }

    async fn connected_backend() -> (RemoteBackend, MemoryShare) {
        let share = create_test_share();
        let session = SmbSession::new(Arc::new(MemoryConnector::new(share.clone())));
        session
            .connect(ConnectionProfile::new("Home NAS", "10.0.0.5").with_anonymous(true))
            .await
            .unwrap();
        (RemoteBackend::new(session), share)
    }

    #[test]
    fn test_disconnected_backend_makes_no_transport_calls() {
        let share = create_test_share();
        let session = SmbSession::new(Arc::new(MemoryConnector::new(share.clone())));
        let backend = RemoteBackend::new(session);

        assert!(matches!(backend.list("/media"), Err(StorageError::NotConnected)));
        assert!(matches!(backend.stat("/media"), Err(StorageError::NotConnected)));
        assert!(matches!(
            backend.mkdir("/media", "x"),
            Err(StorageError::NotConnected)
        ));
        assert!(matches!(
            backend.copy("/media/readme.txt", "/media/copy.txt"),
            Err(StorageError::NotConnected)
        ));
        assert!(matches!(backend.delete("/media/movies"), Err(StorageError::NotConnected)));
        assert!(matches!(
            backend.open_read("/media/readme.txt"),
            Err(StorageError::NotConnected)
        ));
        assert!(matches!(backend.delete("/media"), Err(StorageError::NotConnected)));
        assert!(matches!(backend.mkdir("/", "x"), Err(StorageError::NotConnected)));
        assert!(matches!(
            backend.mkdir("/media", "a/b"),
            Err(StorageError::NotConnected)
        ));
        assert!(matches!(backend.rename("/media", "y"), Err(StorageError::NotConnected)));
        assert!(matches!(
            backend.rename("/media/readme.txt", ""),
            Err(StorageError::NotConnected)
        ));
        assert!(matches!(
            backend.move_to("/media/readme.txt", "/public/readme.txt"),
            Err(StorageError::NotConnected)
        ));
        assert!(matches!(
            backend.try_atomic_move("/media", "/public/x"),
            Err(StorageError::NotConnected)
        ));
        assert!(matches!(backend.open_write("/media"), Err(StorageError::NotConnected)));
        assert!(matches!(backend.remove_file("/media"), Err(StorageError::NotConnected)));
        assert!(matches!(backend.list("/media/../etc"), Err(StorageError::NotConnected)));
        assert!(!backend.exists("/media"));
        assert_eq!(share.call_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_list_disconnect() {
        let (backend, _share) = connected_backend().await;
        let session = backend.session().clone();
        assert_eq!(session.status(), ConnectionStatus::Connected);

        let mut shares: Vec<_> = backend.list("/").unwrap().into_iter().map(|e| e.name).collect();
        shares.sort();
        assert_eq!(shares, vec!["media", "public"]);

        let entries = backend.list("/media").unwrap();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(backend.parent_path(&entry.path).as_deref(), Some("/media"));
        }

        session.disconnect();
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(matches!(backend.list("/media"), Err(StorageError::NotConnected)));
    }

    #[tokio::test]
    async fn test_stat_and_size() {
        let (backend, _share) = connected_backend().await;

        let movie = backend.stat("/media/movies/a.mkv").unwrap().unwrap();
        assert_eq!(movie.size, 100);
        assert_eq!(movie.id, "/media/movies/a.mkv");
        assert!(backend.stat("/media/ghost").unwrap().is_none());
        assert!(backend.stat("/").unwrap().unwrap().is_directory);

        assert_eq!(backend.size("/media/movies").unwrap(), 150);
        assert_eq!(backend.size("/media").unwrap(), 157);
    }

    #[tokio::test]
    async fn test_mkdir_rules() {
        let (backend, _share) = connected_backend().await;

        let created = backend.mkdir("/public", "docs").unwrap();
        assert!(created.is_directory);
        assert!(matches!(
            backend.mkdir("/public", "docs"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(matches!(
            backend.mkdir("/public/missing", "x"),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.mkdir("/media/readme.txt", "x"),
            Err(StorageError::NotADirectory(_))
        ));
        assert!(matches!(
            backend.mkdir("/", "newshare"),
            Err(StorageError::PermissionDenied(_))
        ));

        backend.delete("/public/docs").unwrap();
        assert!(!backend.exists("/public/docs"));
    }

    #[tokio::test]
    async fn test_rename() {
        let (backend, _share) = connected_backend().await;

        let renamed = backend.rename("/media/readme.txt", "README.md").unwrap();
        assert_eq!(renamed.path, "/media/README.md");
        assert!(matches!(
            backend.rename("/media/README.md", "movies"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert!(matches!(
            backend.rename("/media", "films"),
            Err(StorageError::PermissionDenied(_))
        ));
        assert!(matches!(
            backend.rename("/media/README.md", "a/b"),
            Err(StorageError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_and_move() {
        let (backend, share) = connected_backend().await;

        backend.copy("/media/movies", "/public/movies").unwrap();
        assert_eq!(share.read_file("/public/movies/a.mkv").unwrap().len(), 100);
        assert_eq!(backend.size("/public/movies").unwrap(), 150);

        // same share: atomic rename
        backend.move_to("/media/movies", "/media/films").unwrap();
        assert!(share.contains("/media/films/b.mkv"));
        assert!(!share.contains("/media/movies"));

        // across shares: copy then delete
        backend.move_to("/media/films", "/public/films").unwrap();
        assert!(share.contains("/public/films/a.mkv"));
        assert!(!share.contains("/media/films"));
    }

    #[tokio::test]
    async fn test_cannot_delete_share() {
        let (backend, share) = connected_backend().await;
        assert!(matches!(
            backend.delete("/media"),
            Err(StorageError::PermissionDenied(_))
        ));
        assert!(share.contains("/media/readme.txt"));
    }

    #[tokio::test]
    async fn test_streams() {
        let (backend, share) = connected_backend().await;

        backend
            .write_stream("/public/upload.bin", |w| {
                w.write_all(b"remote bytes")
                    .map_err(|e| StorageError::from_io(e, "upload.bin"))
            })
            .unwrap();
        assert_eq!(share.read_file("/public/upload.bin").unwrap(), b"remote bytes");

        let text = backend
            .read_stream("/media/readme.txt", |r| {
                let mut buf = String::new();
                r.read_to_string(&mut buf)
                    .map_err(|e| StorageError::from_io(e, "readme.txt"))?;
                Ok(buf)
            })
            .unwrap();
        assert_eq!(text, "read me");
    }

    #[tokio::test]
    async fn test_connection_loss_marks_session_failed() {
        let (backend, share) = connected_backend().await;
        share.set_offline(true);

        assert!(matches!(
            backend.list("/media"),
            Err(StorageError::ConnectionError(_))
        ));
        assert!(matches!(
            backend.session().status(),
            ConnectionStatus::Error(_)
        ));

        let calls = share.call_count();
        assert!(matches!(backend.list("/media"), Err(StorageError::NotConnected)));
        assert_eq!(share.call_count(), calls);
    }
}
