//! SMB session management.
//!
//! A [`SmbSession`] owns at most one authenticated connection to a remote
//! server. The SMB client library sits behind the [`SmbConnector`] and
//! [`SmbTransport`] traits so real and in-process transports are
//! interchangeable.

pub mod address;
mod chunked;
#[cfg(feature = "libsmbclient")]
pub mod libsmb;
pub mod memory;
pub mod smb;
pub mod transport;

pub use address::{SmbEndpoint, DEFAULT_SMB_PORT};
#[cfg(feature = "libsmbclient")]
pub use libsmb::LibSmbConnector;
pub use memory::{MemoryConnector, MemoryShare};
pub use smb::{ConnectionStatus, SessionOptions, SmbSession};
pub use transport::{RemoteStat, SmbConnector, SmbTarget, SmbTransport};

/// Connector for real servers, when this build links libsmbclient.
pub fn system_connector() -> Option<std::sync::Arc<dyn SmbConnector>> {
    #[cfg(feature = "libsmbclient")]
    {
        Some(std::sync::Arc::new(LibSmbConnector::new()))
    }
    #[cfg(not(feature = "libsmbclient"))]
    {
        None
    }
}
