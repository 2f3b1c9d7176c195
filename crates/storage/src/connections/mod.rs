//! Saved connection profiles and the secret storage behind them.

pub mod profile;
pub mod registry;
pub mod secret_store;

pub use profile::ConnectionProfile;
pub use registry::{ConnectionRegistry, RegistryError, RegistryResult, CONNECTIONS_KEY};
pub use secret_store::{
    FileSecretStore, KeyringSecretStore, MemorySecretStore, SecretResult, SecretStore,
    SecretStoreError, DEFAULT_SERVICE_NAME,
};
