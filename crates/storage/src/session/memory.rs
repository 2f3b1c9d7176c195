//! In-process SMB server.
//!
//! [`MemoryShare`] keeps a whole server namespace in memory: top-level
//! directories are shares, everything below them is ordinary files and
//! directories. It speaks the same URL-based [`SmbTransport`] contract as a
//! real client library and supports fault injection, so remote behaviour can
//! be exercised without a network.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use crate::backend::{ReadHandle, WriteHandle};
use crate::error::{StorageError, StorageResult};
use crate::path;

use super::address::SmbEndpoint;
use super::transport::{RemoteStat, SmbConnector, SmbTarget, SmbTransport};

#[derive(Debug, Clone)]
enum Node {
    Dir { modified: SystemTime },
    File { data: Vec<u8>, modified: SystemTime },
}

impl Node {
    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }

    fn stat(&self, name: &str) -> RemoteStat {
        match self {
            Node::Dir { modified } => RemoteStat {
                name: name.to_string(),
                is_directory: true,
                size: 0,
                modified: *modified,
            },
            Node::File { data, modified } => RemoteStat {
                name: name.to_string(),
                is_directory: false,
                size: data.len() as u64,
                modified: *modified,
            },
        }
    }
}

#[derive(Default)]
struct ShareState {
    /// Keyed by uniform path; the root is implicit.
    nodes: RwLock<BTreeMap<String, Node>>,
    denied: RwLock<HashSet<String>>,
    read_only: RwLock<HashSet<String>>,
    offline: AtomicBool,
    calls: AtomicUsize,
}

/// Shared handle to an in-memory SMB namespace.
#[derive(Clone, Default)]
pub struct MemoryShare {
    state: Arc<ShareState>,
}

impl MemoryShare {
    pub fn new() -> Self {
        Self::default()
    }

    fn nodes(&self) -> RwLockReadGuard<'_, BTreeMap<String, Node>> {
        self.state
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn nodes_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Node>> {
        self.state
            .nodes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a share (top-level directory).
    pub fn add_share(&self, name: &str) {
        self.add_dir(&path::join(path::ROOT, name));
    }

    /// Create a directory and any missing ancestors.
    pub fn add_dir(&self, uniform: &str) {
        let mut nodes = self.nodes_mut();
        let mut current = String::new();
        for segment in uniform.split('/').filter(|s| !s.is_empty()) {
            let parent = if current.is_empty() {
                path::ROOT
            } else {
                current.as_str()
            };
            current = path::join(parent, segment);
            nodes.entry(current.clone()).or_insert(Node::Dir {
                modified: SystemTime::now(),
            });
        }
    }

    /// Create or replace a file, creating missing ancestors.
    pub fn add_file(&self, uniform: &str, contents: impl Into<Vec<u8>>) {
        if let Some(parent) = path::parent(uniform) {
            self.add_dir(&parent);
        }
        self.nodes_mut().insert(
            uniform.to_string(),
            Node::File {
                data: contents.into(),
                modified: SystemTime::now(),
            },
        );
    }

    /// Contents of a file, if present.
    pub fn read_file(&self, uniform: &str) -> Option<Vec<u8>> {
        match self.nodes().get(uniform) {
            Some(Node::File { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    pub fn contains(&self, uniform: &str) -> bool {
        uniform == path::ROOT || self.nodes().contains_key(uniform)
    }

    /// Make every operation on exactly this path except `stat` fail with
    /// `PermissionDenied`.
    pub fn deny(&self, uniform: &str) {
        self.state
            .denied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uniform.to_string());
    }

    pub fn allow(&self, uniform: &str) {
        self.state
            .denied
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uniform);
    }

    /// Let this exact path be read but not removed, renamed or created.
    pub fn set_read_only(&self, uniform: &str) {
        self.state
            .read_only
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uniform.to_string());
    }

    /// Simulate a network outage: every call fails with `ConnectionError`.
    pub fn set_offline(&self, offline: bool) {
        self.state.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.state.offline.load(Ordering::SeqCst)
    }

    /// Number of transport calls served so far.
    pub fn call_count(&self) -> usize {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Names of the shares.
    pub fn shares(&self) -> Vec<String> {
        self.nodes()
            .keys()
            .filter(|key| path::parent(key).as_deref() == Some(path::ROOT))
            .filter_map(|key| path::file_name(key).map(str::to_string))
            .collect()
    }

    /// Count the call, check for outages, and resolve a URL to a path.
    fn enter(&self, url: &str) -> StorageResult<String> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        if self.is_offline() {
            return Err(StorageError::ConnectionError(
                "connection reset by peer".to_string(),
            ));
        }
        let (_, uniform) = SmbEndpoint::parse_url(url)?;
        Ok(uniform)
    }

    fn check_allowed(&self, uniform: &str) -> StorageResult<()> {
        let denied = self
            .state
            .denied
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if denied.contains(uniform) {
            return Err(StorageError::PermissionDenied(uniform.to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, uniform: &str) -> StorageResult<()> {
        self.check_allowed(uniform)?;
        let read_only = self
            .state
            .read_only
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if read_only.contains(uniform) {
            return Err(StorageError::PermissionDenied(format!("read-only: {uniform}")));
        }
        Ok(())
    }

    fn require_parent_dir(nodes: &BTreeMap<String, Node>, uniform: &str) -> StorageResult<()> {
        let parent = path::parent(uniform)
            .ok_or_else(|| StorageError::InvalidPath(format!("no parent: {uniform}")))?;
        if parent == path::ROOT {
            return Ok(());
        }
        match nodes.get(&parent) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(StorageError::NotADirectory(parent)),
            None => Err(StorageError::NotFound(parent)),
        }
    }

    fn has_children(nodes: &BTreeMap<String, Node>, uniform: &str) -> bool {
        nodes
            .keys()
            .any(|key| path::parent(key).as_deref() == Some(uniform))
    }

    fn commit(&self, uniform: &str, data: Vec<u8>) {
        self.nodes_mut().insert(
            uniform.to_string(),
            Node::File {
                data,
                modified: SystemTime::now(),
            },
        );
    }
}

impl SmbTransport for MemoryShare {
    fn list(&self, url: &str) -> StorageResult<Vec<RemoteStat>> {
        let dir = self.enter(url)?;
        self.check_allowed(&dir)?;
        let nodes = self.nodes();

        if dir != path::ROOT {
            match nodes.get(&dir) {
                Some(node) if node.is_dir() => {}
                Some(_) => return Err(StorageError::NotADirectory(dir)),
                None => return Err(StorageError::NotFound(dir)),
            }
        }

        Ok(nodes
            .iter()
            .filter(|(key, _)| path::parent(key).as_deref() == Some(dir.as_str()))
            .map(|(key, node)| node.stat(path::file_name(key).unwrap_or_default()))
            .collect())
    }

    fn stat(&self, url: &str) -> StorageResult<RemoteStat> {
        let target = self.enter(url)?;
        if target == path::ROOT {
            return Ok(RemoteStat {
                name: String::new(),
                is_directory: true,
                size: 0,
                modified: SystemTime::UNIX_EPOCH,
            });
        }
        let nodes = self.nodes();
        let node = nodes
            .get(&target)
            .ok_or_else(|| StorageError::NotFound(target.clone()))?;
        Ok(node.stat(path::file_name(&target).unwrap_or_default()))
    }

    fn mkdir(&self, url: &str) -> StorageResult<()> {
        let target = self.enter(url)?;
        self.check_writable(&target)?;
        let mut nodes = self.nodes_mut();
        Self::require_parent_dir(&nodes, &target)?;
        if nodes.contains_key(&target) {
            return Err(StorageError::AlreadyExists(target));
        }
        nodes.insert(
            target,
            Node::Dir {
                modified: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn remove_file(&self, url: &str) -> StorageResult<()> {
        let target = self.enter(url)?;
        self.check_writable(&target)?;
        let mut nodes = self.nodes_mut();
        match nodes.get(&target).map(Node::is_dir) {
            None => Err(StorageError::NotFound(target)),
            Some(true) => Err(StorageError::InvalidPath(format!(
                "is a directory: {target}"
            ))),
            Some(false) => {
                nodes.remove(&target);
                Ok(())
            }
        }
    }

    fn remove_dir(&self, url: &str) -> StorageResult<()> {
        let target = self.enter(url)?;
        self.check_writable(&target)?;
        let mut nodes = self.nodes_mut();
        match nodes.get(&target).map(Node::is_dir) {
            None => Err(StorageError::NotFound(target)),
            Some(false) => Err(StorageError::NotADirectory(target)),
            Some(true) if Self::has_children(&nodes, &target) => {
                Err(StorageError::Io(format!("directory not empty: {target}")))
            }
            Some(true) => {
                nodes.remove(&target);
                Ok(())
            }
        }
    }

    fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let source = self.enter(from)?;
        let (_, target) = SmbEndpoint::parse_url(to)?;
        self.check_writable(&source)?;
        self.check_writable(&target)?;

        if super::address::share_of(&source) != super::address::share_of(&target) {
            return Err(StorageError::InvalidPath(format!(
                "cannot rename across shares: {source} -> {target}"
            )));
        }

        let mut nodes = self.nodes_mut();
        if !nodes.contains_key(&source) {
            return Err(StorageError::NotFound(source));
        }
        if nodes.contains_key(&target) {
            return Err(StorageError::AlreadyExists(target));
        }
        Self::require_parent_dir(&nodes, &target)?;

        let moved: Vec<String> = nodes
            .keys()
            .filter(|key| path::is_within(key, &source))
            .cloned()
            .collect();
        for key in moved {
            if let Some(node) = nodes.remove(&key) {
                let renamed = format!("{target}{}", &key[source.len()..]);
                nodes.insert(renamed, node);
            }
        }
        Ok(())
    }

    fn open_read(&self, url: &str) -> StorageResult<ReadHandle> {
        let target = self.enter(url)?;
        self.check_allowed(&target)?;
        match self.nodes().get(&target) {
            Some(Node::File { data, .. }) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(Node::Dir { .. }) => Err(StorageError::InvalidPath(format!(
                "cannot read a directory: {target}"
            ))),
            None => Err(StorageError::NotFound(target)),
        }
    }

    fn open_write(&self, url: &str) -> StorageResult<WriteHandle> {
        let target = self.enter(url)?;
        self.check_writable(&target)?;
        {
            let mut nodes = self.nodes_mut();
            Self::require_parent_dir(&nodes, &target)?;
            if nodes.contains_key(&target) {
                return Err(StorageError::AlreadyExists(target));
            }
            nodes.insert(
                target.clone(),
                Node::File {
                    data: Vec::new(),
                    modified: SystemTime::now(),
                },
            );
        }
        Ok(Box::new(MemoryWriter {
            share: self.clone(),
            path: target,
            buffer: Vec::new(),
        }))
    }
}

/// Buffers writes and publishes them on flush and on drop.
struct MemoryWriter {
    share: MemoryShare,
    path: String,
    buffer: Vec<u8>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.share.is_offline() {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.share.is_offline() {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }
        // A concurrent remove wins over buffered data.
        if self.share.contains(&self.path) {
            self.share.commit(&self.path, self.buffer.clone());
        }
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if !self.share.is_offline() && self.share.contains(&self.path) {
            self.share
                .commit(&self.path, std::mem::take(&mut self.buffer));
        }
    }
}

/// Connector that hands out a [`MemoryShare`].
pub struct MemoryConnector {
    share: MemoryShare,
    allow_anonymous: bool,
    credentials: Option<(String, String)>,
    reachable_hosts: Option<Vec<String>>,
    connect_delay: Option<Duration>,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    /// Accept any host, anonymous logins and any credentials.
    pub fn new(share: MemoryShare) -> Self {
        Self {
            share,
            allow_anonymous: true,
            credentials: None,
            reachable_hosts: None,
            connect_delay: None,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Require exactly these credentials for non-anonymous logins.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn deny_anonymous(mut self) -> Self {
        self.allow_anonymous = false;
        self
    }

    /// Only these hosts answer; others fail as unreachable.
    pub fn with_reachable_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reachable_hosts = Some(hosts.into_iter().map(Into::into).collect());
        self
    }

    /// Block for this long before answering.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    pub fn share(&self) -> &MemoryShare {
        &self.share
    }

    /// Number of connect attempts seen.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SmbConnector for MemoryConnector {
    fn connect(&self, target: &SmbTarget) -> StorageResult<Arc<dyn SmbTransport>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.connect_delay {
            std::thread::sleep(delay);
        }

        let host = &target.endpoint.host;
        if let Some(hosts) = &self.reachable_hosts {
            if !hosts.iter().any(|h| h == host) {
                return Err(StorageError::ConnectionError(format!(
                    "host unreachable: {}",
                    target.endpoint
                )));
            }
        }
        if self.share.is_offline() {
            return Err(StorageError::ConnectionError(format!(
                "connection refused: {}",
                target.endpoint
            )));
        }

        if target.anonymous {
            if !self.allow_anonymous {
                return Err(StorageError::ConnectionError(
                    "anonymous access denied".to_string(),
                ));
            }
        } else if let Some((username, password)) = &self.credentials {
            if &target.username != username || &target.password != password {
                return Err(StorageError::ConnectionError(
                    "authentication failed".to_string(),
                ));
            }
        }

        Ok(Arc::new(self.share.clone()))
    }
}
