//! The seam between sessions and an SMB client library.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::backend::{ReadHandle, WriteHandle};
use crate::connections::ConnectionProfile;
use crate::error::StorageResult;

use super::address::SmbEndpoint;

/// Metadata for one remote entry as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStat {
    pub name: String,
    pub is_directory: bool,
    pub size: u64,
    pub modified: SystemTime,
}

/// Primitive remote file operations on an authenticated connection.
///
/// Every method takes a full `smb://host:port/share/...` URL. Implementations
/// report absence as `NotFound` and network or authentication trouble as
/// `ConnectionError`.
pub trait SmbTransport: Send + Sync {
    /// Children of a directory; at the server root, the shares.
    fn list(&self, url: &str) -> StorageResult<Vec<RemoteStat>>;

    fn stat(&self, url: &str) -> StorageResult<RemoteStat>;

    fn mkdir(&self, url: &str) -> StorageResult<()>;

    fn remove_file(&self, url: &str) -> StorageResult<()>;

    /// Remove an empty directory.
    fn remove_dir(&self, url: &str) -> StorageResult<()>;

    /// Rename within one share.
    fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    fn open_read(&self, url: &str) -> StorageResult<ReadHandle>;

    /// Create a new file; fails with `AlreadyExists` if present.
    fn open_write(&self, url: &str) -> StorageResult<WriteHandle>;

    /// Best-effort teardown of the remote context.
    fn shutdown(&self) {}
}

/// Establishes authenticated transports.
pub trait SmbConnector: Send + Sync {
    /// Negotiate and authenticate. This call blocks; sessions run it on a
    /// blocking worker under the connect timeout.
    fn connect(&self, target: &SmbTarget) -> StorageResult<Arc<dyn SmbTransport>>;
}

/// Everything a connector needs to reach and authenticate to a server.
#[derive(Clone)]
pub struct SmbTarget {
    pub endpoint: SmbEndpoint,
    pub username: String,
    pub password: String,
    pub domain: String,
    pub workgroup: String,
    /// Preferred share; may be empty.
    pub share: String,
    pub anonymous: bool,
    /// Per-request timeout the transport should apply.
    pub request_timeout: Duration,
}

impl SmbTarget {
    pub fn from_profile(profile: &ConnectionProfile, request_timeout: Duration) -> Self {
        Self {
            endpoint: SmbEndpoint::new(profile.host.trim(), profile.port),
            username: profile.username.clone(),
            password: profile.password.clone(),
            domain: profile.domain.clone(),
            workgroup: profile.workgroup.clone(),
            share: profile.share.trim_matches('/').to_string(),
            anonymous: profile.is_anonymous,
            request_timeout,
        }
    }
}

impl std::fmt::Debug for SmbTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbTarget")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("workgroup", &self.workgroup)
            .field("share", &self.share)
            .field("anonymous", &self.anonymous)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
