//! SMB transport backed by libsmbclient through `pavao`.
//!
//! libsmbclient contexts are not safe for concurrent use, so every request
//! takes the client lock. File handles borrow the client, so streams reopen
//! the file for each chunk and seek to their offset; the lock is released
//! between chunks.

use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use pavao::{SmbClient, SmbCredentials, SmbDirentType, SmbMode, SmbOpenOptions, SmbOptions};

use crate::backend::{ReadHandle, WriteHandle};
use crate::error::{StorageError, StorageResult};
use crate::path;
use crate::tree::TRANSFER_CHUNK_SIZE;

use super::address::SmbEndpoint;
use super::chunked::{ChunkedReader, ChunkedWriter, PositionedFile};
use super::transport::{RemoteStat, SmbConnector, SmbTarget, SmbTransport};

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// Connector that opens libsmbclient contexts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibSmbConnector;

impl LibSmbConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SmbConnector for LibSmbConnector {
    fn connect(&self, target: &SmbTarget) -> StorageResult<Arc<dyn SmbTransport>> {
        let workgroup = if target.domain.is_empty() {
            target.workgroup.clone()
        } else {
            target.domain.clone()
        };

        let mut credentials = SmbCredentials::default()
            .server(target.endpoint.server_url())
            .share("")
            .workgroup(workgroup);
        if !target.anonymous {
            credentials = credentials
                .username(target.username.clone())
                .password(target.password.clone());
        }

        let client = SmbClient::new(credentials, SmbOptions::default().one_share_per_server(true))
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let transport = LibSmbTransport {
            endpoint: target.endpoint.clone(),
            client: Arc::new(Mutex::new(client)),
        };

        // libsmbclient authenticates lazily; force a round trip.
        let probe = if target.share.is_empty() {
            path::ROOT.to_string()
        } else {
            path::join(path::ROOT, &target.share)
        };
        transport
            .client()
            .list_dir(&probe)
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        tracing::debug!(endpoint = %target.endpoint, "libsmbclient context ready");
        Ok(Arc::new(transport))
    }
}

struct LibSmbTransport {
    endpoint: SmbEndpoint,
    client: Arc<Mutex<SmbClient>>,
}

impl LibSmbTransport {
    fn client(&self) -> MutexGuard<'_, SmbClient> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, url: &str) -> StorageResult<String> {
        let (endpoint, uniform) = SmbEndpoint::parse_url(url)?;
        if endpoint != self.endpoint {
            return Err(StorageError::InvalidPath(format!(
                "{url} does not belong to {}",
                self.endpoint
            )));
        }
        Ok(uniform)
    }

    fn stat_path(&self, client: &SmbClient, uniform: &str) -> StorageResult<RemoteStat> {
        let stat = client.stat(uniform).map_err(|e| map_error(e, uniform))?;
        let mode: u32 = stat.mode.into();
        Ok(RemoteStat {
            name: path::file_name(uniform).unwrap_or_default().to_string(),
            is_directory: mode & S_IFMT == S_IFDIR,
            size: stat.size,
            modified: stat.modified,
        })
    }
}

impl SmbTransport for LibSmbTransport {
    fn list(&self, url: &str) -> StorageResult<Vec<RemoteStat>> {
        let uniform = self.resolve(url)?;
        let client = self.client();
        let dirents = client.list_dir(&uniform).map_err(|e| map_error(e, &uniform))?;

        let mut entries = Vec::with_capacity(dirents.len());
        for dirent in dirents {
            let name = dirent.name().to_string();
            if name == "." || name == ".." {
                continue;
            }
            match dirent.get_type() {
                SmbDirentType::FileShare => entries.push(RemoteStat {
                    name,
                    is_directory: true,
                    size: 0,
                    modified: SystemTime::UNIX_EPOCH,
                }),
                SmbDirentType::Dir | SmbDirentType::File => {
                    let child = path::join(&uniform, &name);
                    entries.push(self.stat_path(&client, &child)?);
                }
                _ => {}
            }
        }
        Ok(entries)
    }

    fn stat(&self, url: &str) -> StorageResult<RemoteStat> {
        let uniform = self.resolve(url)?;
        let client = self.client();
        self.stat_path(&client, &uniform)
    }

    fn mkdir(&self, url: &str) -> StorageResult<()> {
        let uniform = self.resolve(url)?;
        self.client()
            .mkdir(&uniform, SmbMode::from(0o755))
            .map_err(|e| map_error(e, &uniform))
    }

    fn remove_file(&self, url: &str) -> StorageResult<()> {
        let uniform = self.resolve(url)?;
        self.client()
            .unlink(&uniform)
            .map_err(|e| map_error(e, &uniform))
    }

    fn remove_dir(&self, url: &str) -> StorageResult<()> {
        let uniform = self.resolve(url)?;
        self.client()
            .rmdir(&uniform)
            .map_err(|e| map_error(e, &uniform))
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.client()
            .rename(&from, &to)
            .map_err(|e| map_error(e, &from))
    }

    fn open_read(&self, url: &str) -> StorageResult<ReadHandle> {
        let uniform = self.resolve(url)?;
        self.client()
            .open_with(&uniform, SmbOpenOptions::default().read(true))
            .map_err(|e| map_error(e, &uniform))?;
        let file = RemoteFile {
            client: Arc::clone(&self.client),
            path: uniform,
        };
        Ok(Box::new(BufReader::with_capacity(
            TRANSFER_CHUNK_SIZE,
            ChunkedReader::new(file),
        )))
    }

    fn open_write(&self, url: &str) -> StorageResult<WriteHandle> {
        let uniform = self.resolve(url)?;
        {
            let client = self.client();
            // Create the file now so existence checks and AlreadyExists
            // behave like a local create_new.
            client
                .open_with(
                    &uniform,
                    SmbOpenOptions::default()
                        .write(true)
                        .create(true)
                        .exclusive(true),
                )
                .map_err(|e| map_error(e, &uniform))?;
        }
        let label = uniform.clone();
        let file = RemoteFile {
            client: Arc::clone(&self.client),
            path: uniform,
        };
        Ok(Box::new(ChunkedWriter::new(file, label)))
    }
}

/// One remote file, reopened under the client lock for every chunk.
struct RemoteFile {
    client: Arc<Mutex<SmbClient>>,
    path: String,
}

impl RemoteFile {
    fn open<'c>(
        &self,
        client: &'c SmbClient,
        options: SmbOpenOptions,
    ) -> io::Result<pavao::SmbFile<'c>> {
        client
            .open_with(&self.path, options)
            .map_err(|e| io::Error::other(format!("{}: {e}", self.path)))
    }
}

impl PositionedFile for RemoteFile {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.open(&client, SmbOpenOptions::default().read(true))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let client = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = self.open(&client, SmbOpenOptions::default().write(true))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        file.flush()
    }
}

/// libsmbclient reports errno text; map the common cases.
fn map_error(err: pavao::SmbError, uniform: &str) -> StorageError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("no such file") || lower.contains("not found") {
        StorageError::NotFound(uniform.to_string())
    } else if lower.contains("file exists") || lower.contains("already exists") {
        StorageError::AlreadyExists(uniform.to_string())
    } else if lower.contains("permission denied") || lower.contains("access denied") {
        StorageError::PermissionDenied(uniform.to_string())
    } else if lower.contains("not a directory") {
        StorageError::NotADirectory(uniform.to_string())
    } else if lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("broken pipe")
        || lower.contains("unreachable")
    {
        StorageError::ConnectionError(format!("{uniform}: {message}"))
    } else {
        StorageError::Io(format!("{uniform}: {message}"))
    }
}
