//! NasBridge storage core.
//!
//! One storage abstraction over local device storage and remote SMB/CIFS
//! shares:
//!
//! - [`backend`]: the [`StorageBackend`] contract with [`LocalBackend`] and
//!   [`RemoteBackend`], selected explicitly through [`Backend`]
//! - [`tree`]: recursive copy, delete, size, search, move and cross-backend
//!   transfer, written once against the contract
//! - [`session`]: the SMB session state machine and the client-library seam
//! - [`connections`]: saved connection profiles and the secret stores that
//!   persist them
//! - [`discovery`]: best-effort scanning for SMB servers on the local subnet
//! - [`batch`]: multi-item operations that continue past failures
//! - [`hub`]: wiring of all of the above from a [`Config`]

pub mod backend;
pub mod batch;
pub mod config;
pub mod connections;
pub mod discovery;
pub mod entry;
pub mod error;
pub mod hub;
pub mod path;
pub mod query;
pub mod session;
pub mod tree;

pub use backend::{Backend, BackendKind, LocalBackend, RemoteBackend, StorageBackend};
pub use batch::{BatchFailure, BatchOutcome};
pub use config::{Config, ConfigError};
pub use connections::{ConnectionProfile, ConnectionRegistry, SecretStore};
pub use discovery::{NasDiscovery, NasHint};
pub use entry::{FileCategory, FileEntry, FileType};
pub use error::{StorageError, StorageResult};
pub use hub::{HubError, StorageHub};
pub use query::{FilterOptions, SortField, SortOption};
pub use session::{ConnectionStatus, SmbSession};
pub use tree::{SearchOutcome, TransferReport, TRANSFER_CHUNK_SIZE};
