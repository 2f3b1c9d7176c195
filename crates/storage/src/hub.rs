//! Top-level wiring of configuration, saved connections and backends.
//!
//! `StorageHub` owns the default [`SmbSession`]. Backends handed out by the
//! hub are explicit values; a [`RemoteBackend`] always carries the session it
//! talks through.

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{Backend, BackendKind, LocalBackend, RemoteBackend};
use crate::config::{Config, SecretBackend};
use crate::connections::{
    ConnectionProfile, ConnectionRegistry, FileSecretStore, KeyringSecretStore, RegistryError,
    SecretStore,
};
use crate::discovery::{DiscoveryOptions, NasDiscovery};
use crate::error::StorageError;
use crate::session::{SmbConnector, SmbSession};

/// Errors raised while connecting through the hub.
#[derive(Debug, Error)]
pub enum HubError {
    /// No saved profile matches the given id or name.
    #[error("no saved connection named {0}")]
    UnknownProfile(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Owner of the registry, the default session and the local backend.
pub struct StorageHub {
    config: Config,
    registry: Arc<ConnectionRegistry>,
    connector: Arc<dyn SmbConnector>,
    session: SmbSession,
    local: LocalBackend,
}

impl StorageHub {
    /// Wire a hub from explicit parts.
    pub fn new(
        config: Config,
        store: Arc<dyn SecretStore>,
        connector: Arc<dyn SmbConnector>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(store));
        let session = SmbSession::with_options(Arc::clone(&connector), config.smb.session_options());
        let local = LocalBackend::with_allowed_paths(config.local.allowed_paths.clone());

        debug!(
            allowed_paths = local.allowed_paths().len(),
            secret_backend = ?config.secrets.backend,
            "Storage hub ready"
        );

        Self {
            config,
            registry,
            connector,
            session,
            local,
        }
    }

    /// Wire a hub using the secret store selected by `config`.
    pub fn from_config(config: Config, connector: Arc<dyn SmbConnector>) -> Result<Self> {
        config.validate().context("Invalid configuration")?;
        let store = open_secret_store(&config)?;
        Ok(Self::new(config, store, connector))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// The default session.
    pub fn session(&self) -> &SmbSession {
        &self.session
    }

    /// A fresh, independent session using the hub's connector and timeouts.
    pub fn new_session(&self) -> SmbSession {
        SmbSession::with_options(Arc::clone(&self.connector), self.config.smb.session_options())
    }

    /// Connect the default session to a saved profile.
    pub async fn connect(&self, profile_id: Uuid) -> Result<ConnectionProfile, HubError> {
        let profile = self
            .registry
            .get(profile_id)?
            .ok_or_else(|| HubError::UnknownProfile(profile_id.to_string()))?;
        self.connect_profile(profile).await
    }

    /// Connect to a saved profile looked up by name, or by id when `key`
    /// parses as one.
    pub async fn connect_named(&self, key: &str) -> Result<ConnectionProfile, HubError> {
        let profile = self.resolve_profile(key)?;
        self.connect_profile(profile).await
    }

    /// Connect the default session to `profile`.
    ///
    /// Saved profiles get their `last_connected_at` updated; unsaved ones are
    /// connected without touching the registry.
    pub async fn connect_profile(
        &self,
        profile: ConnectionProfile,
    ) -> Result<ConnectionProfile, HubError> {
        let connected = self.session.connect(profile).await?;

        let at = connected.last_connected_at.unwrap_or_default();
        match self.registry.mark_connected(connected.id, at) {
            Ok(_) => {}
            Err(RegistryError::NotFound(_)) => debug!(id = %connected.id, "Connected unsaved profile"),
            Err(e) => return Err(e.into()),
        }

        info!(name = %connected.name, server = %connected.display_target(), "Hub connected");
        Ok(connected)
    }

    /// Disconnect the default session.
    pub fn disconnect(&self) {
        self.session.disconnect();
    }

    /// Find a saved profile by id or case-insensitive name.
    pub fn resolve_profile(&self, key: &str) -> Result<ConnectionProfile, HubError> {
        if let Ok(id) = Uuid::parse_str(key) {
            if let Some(profile) = self.registry.get(id)? {
                return Ok(profile);
            }
        }
        self.registry
            .find_by_name(key)?
            .ok_or_else(|| HubError::UnknownProfile(key.to_string()))
    }

    pub fn local(&self) -> LocalBackend {
        self.local.clone()
    }

    /// Remote backend bound to the default session.
    pub fn remote(&self) -> RemoteBackend {
        RemoteBackend::new(self.session.clone())
    }

    pub fn backend(&self, kind: BackendKind) -> Backend {
        match kind {
            BackendKind::Local => Backend::Local(self.local()),
            BackendKind::Remote => Backend::Remote(self.remote()),
        }
    }

    /// Network scanner configured from the hub's settings.
    pub fn discovery(&self) -> NasDiscovery {
        NasDiscovery::new(DiscoveryOptions::from(&self.config.discovery))
            .with_connector(Arc::clone(&self.connector))
    }
}

/// Open the secret store selected by `config`.
pub fn open_secret_store(config: &Config) -> Result<Arc<dyn SecretStore>> {
    match config.secrets.backend {
        SecretBackend::Keyring => {
            debug!(service = %config.secrets.service, "Using keychain secret store");
            Ok(Arc::new(KeyringSecretStore::new(config.secrets.service.clone())))
        }
        SecretBackend::File => {
            let path = config.secrets_file();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create secrets directory: {}", parent.display())
                })?;
            }
            debug!(path = %path.display(), "Using file secret store");
            Ok(Arc::new(FileSecretStore::new(path)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::MemorySecretStore;
    use crate::session::{ConnectionStatus, MemoryConnector, MemoryShare};
    use crate::StorageBackend;
    use tempfile::TempDir;

    fn hub_with_share() -> (StorageHub, MemoryShare) {
        let share = MemoryShare::new();
        share.add_share("media");
        share.add_file("/media/song.mp3", vec![0u8; 42]);
        let connector = Arc::new(MemoryConnector::new(share.clone()));
        let hub = StorageHub::new(
            Config::default(),
            Arc::new(MemorySecretStore::new()),
            connector,
        );
        (hub, share)
    }

    #[tokio::test]
    async fn test_connect_saved_profile_records_timestamp() {
        let (hub, _share) = hub_with_share();
        let profile = ConnectionProfile::new("Home NAS", "10.0.0.5").with_anonymous(true);
        let id = profile.id;
        hub.registry().save(profile).unwrap();

        let connected = hub.connect(id).await.unwrap();

        assert!(connected.last_connected_at.is_some());
        let stored = hub.registry().get(id).unwrap().unwrap();
        assert_eq!(stored.last_connected_at, connected.last_connected_at);
        assert_eq!(hub.session().status(), ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_connect_unknown_profile() {
        let (hub, _share) = hub_with_share();
        let result = hub.connect(Uuid::new_v4()).await;
        assert!(matches!(result, Err(HubError::UnknownProfile(_))));
    }

    #[tokio::test]
    async fn test_connect_named_and_browse() {
        let (hub, _share) = hub_with_share();
        let profile = ConnectionProfile::new("Office", "10.0.0.7").with_anonymous(true);
        hub.registry().save(profile).unwrap();

        hub.connect_named("office").await.unwrap();

        let remote = hub.backend(BackendKind::Remote);
        let shares = remote.list("/").unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(remote.size("/media/song.mp3").unwrap(), 42);

        hub.disconnect();
        assert!(matches!(remote.list("/"), Err(StorageError::NotConnected)));
    }

    #[tokio::test]
    async fn test_unsaved_profile_leaves_registry_alone() {
        let (hub, _share) = hub_with_share();
        let profile = ConnectionProfile::new("Ad hoc", "10.0.0.9").with_anonymous(true);

        hub.connect_profile(profile).await.unwrap();

        assert!(hub.registry().get_all().unwrap().is_empty());
        assert!(hub.session().is_connected());
    }

    #[test]
    fn test_local_backend_respects_allowed_paths() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.local.allowed_paths = vec![temp.path().to_path_buf()];
        let hub = StorageHub::new(
            config,
            Arc::new(MemorySecretStore::new()),
            Arc::new(MemoryConnector::new(MemoryShare::new())),
        );

        let local = hub.backend(BackendKind::Local);
        assert!(local.list(&temp.path().to_string_lossy()).is_ok());
        assert!(matches!(
            local.list("/etc"),
            Err(StorageError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_file_secret_store_from_config() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.secrets.backend = SecretBackend::File;
        config.secrets.file = Some(temp.path().join("nested/secrets.json"));

        let store = open_secret_store(&config).unwrap();
        store.put("k", "v").unwrap();

        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert!(temp.path().join("nested/secrets.json").exists());
    }
}
