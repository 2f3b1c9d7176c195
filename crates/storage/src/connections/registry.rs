//! Persistent registry of connection profiles.
//!
//! All profiles live as one JSON array under a single secret store key.
//! Every mutation is a read-modify-write of that array, serialized by a
//! process-local lock.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use super::profile::ConnectionProfile;
use super::secret_store::{SecretStore, SecretStoreError};

/// Secret store key holding the serialized profile list.
pub const CONNECTIONS_KEY: &str = "nas_connections";

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The profile failed validation and was not saved.
    #[error("invalid connection profile: {0}")]
    InvalidProfile(&'static str),

    /// No profile with the given id exists.
    #[error("connection profile not found: {0}")]
    NotFound(Uuid),

    /// The stored list could not be encoded or decoded.
    #[error("connection list serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying secret store failed.
    #[error(transparent)]
    Store(#[from] SecretStoreError),

    /// Lock poisoned during operation.
    #[error("lock poisoned: {context}")]
    LockPoisoned { context: String },
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// CRUD over saved connection profiles.
pub struct ConnectionRegistry {
    store: Arc<dyn SecretStore>,
    key: String,
    write_lock: Mutex<()>,
    updates: watch::Sender<Vec<ConnectionProfile>>,
}

impl ConnectionRegistry {
    /// Create a registry over `store` using the default key.
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self::with_key(store, CONNECTIONS_KEY)
    }

    /// Create a registry over `store` using a custom key.
    pub fn with_key(store: Arc<dyn SecretStore>, key: impl Into<String>) -> Self {
        let (updates, _) = watch::channel(Vec::new());
        let registry = Self {
            store,
            key: key.into(),
            write_lock: Mutex::new(()),
            updates,
        };

        match registry.load() {
            Ok(profiles) => {
                registry.updates.send_replace(profiles);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to load saved connections"),
        }
        registry
    }

    fn lock(&self) -> RegistryResult<MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| RegistryError::LockPoisoned {
            context: "connection registry".to_string(),
        })
    }

    fn load(&self) -> RegistryResult<Vec<ConnectionProfile>> {
        match self.store.get(&self.key)? {
            None => Ok(Vec::new()),
            Some(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Some(raw) => Ok(serde_json::from_str(&raw)?),
        }
    }

    fn persist(&self, profiles: Vec<ConnectionProfile>) -> RegistryResult<()> {
        let encoded = serde_json::to_string(&profiles)?;
        self.store.put(&self.key, &encoded)?;
        tracing::debug!(count = profiles.len(), "Saved connection profiles");
        self.updates.send_replace(profiles);
        Ok(())
    }

    /// All saved profiles in insertion order. A missing key yields an empty list.
    pub fn get_all(&self) -> RegistryResult<Vec<ConnectionProfile>> {
        self.load()
    }

    /// Look up a profile by id.
    pub fn get(&self, id: Uuid) -> RegistryResult<Option<ConnectionProfile>> {
        Ok(self.load()?.into_iter().find(|p| p.id == id))
    }

    /// Look up a profile by case-insensitive name.
    pub fn find_by_name(&self, name: &str) -> RegistryResult<Option<ConnectionProfile>> {
        let needle = name.trim().to_lowercase();
        Ok(self
            .load()?
            .into_iter()
            .find(|p| p.name.trim().to_lowercase() == needle))
    }

    /// The profile flagged as default, if any.
    pub fn default_profile(&self) -> RegistryResult<Option<ConnectionProfile>> {
        Ok(self.load()?.into_iter().find(|p| p.is_default))
    }

    /// Insert or replace a profile by id.
    ///
    /// Saving a default profile clears the flag on every other profile.
    pub fn save(&self, profile: ConnectionProfile) -> RegistryResult<()> {
        if let Some(reason) = profile.validation_error() {
            return Err(RegistryError::InvalidProfile(reason));
        }

        let _guard = self.lock()?;
        let mut profiles = self.load()?;

        if profile.is_default {
            for other in profiles.iter_mut().filter(|p| p.id != profile.id) {
                other.is_default = false;
            }
        }

        match profiles.iter_mut().find(|p| p.id == profile.id) {
            Some(existing) => {
                tracing::info!(id = %profile.id, name = %profile.name, "Updated connection profile");
                *existing = profile;
            }
            None => {
                tracing::info!(id = %profile.id, name = %profile.name, "Added connection profile");
                profiles.push(profile);
            }
        }

        self.persist(profiles)
    }

    /// Remove a profile. Returns `false` if no profile had that id.
    pub fn delete(&self, id: Uuid) -> RegistryResult<bool> {
        let _guard = self.lock()?;
        let mut profiles = self.load()?;
        let before = profiles.len();
        profiles.retain(|p| p.id != id);

        if profiles.len() == before {
            return Ok(false);
        }

        self.persist(profiles)?;
        tracing::info!(id = %id, "Removed connection profile");
        Ok(true)
    }

    /// Apply `change` to the stored profile `id` under the write lock.
    ///
    /// The list is loaded after the lock is taken, so a profile deleted by a
    /// concurrent writer stays deleted and fields saved meanwhile are kept.
    fn update(
        &self,
        id: Uuid,
        change: impl FnOnce(&mut ConnectionProfile),
    ) -> RegistryResult<ConnectionProfile> {
        let _guard = self.lock()?;
        let mut profiles = self.load()?;

        let index = profiles
            .iter()
            .position(|p| p.id == id)
            .ok_or(RegistryError::NotFound(id))?;
        change(&mut profiles[index]);
        let updated = profiles[index].clone();

        if let Some(reason) = updated.validation_error() {
            return Err(RegistryError::InvalidProfile(reason));
        }
        if updated.is_default {
            for other in profiles.iter_mut().filter(|p| p.id != id) {
                other.is_default = false;
            }
        }

        self.persist(profiles)?;
        Ok(updated)
    }

    /// Flag one profile as the default.
    pub fn set_default(&self, id: Uuid) -> RegistryResult<ConnectionProfile> {
        let updated = self.update(id, |p| p.is_default = true)?;
        tracing::info!(id = %id, name = %updated.name, "Set default connection profile");
        Ok(updated)
    }

    /// Record a successful connection time.
    pub fn mark_connected(&self, id: Uuid, at: i64) -> RegistryResult<ConnectionProfile> {
        self.update(id, |p| p.last_connected_at = Some(at))
    }

    /// Live view of the profile list, updated after every successful write.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ConnectionProfile>> {
        self.updates.subscribe()
    }
}
