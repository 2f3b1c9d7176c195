//! Key/value storage for connection secrets.
//!
//! The registry only relies on the key/value contract; how values are
//! protected is up to the implementation:
//! - [`KeyringSecretStore`]: the platform keychain via the `keyring` crate
//! - [`FileSecretStore`]: a JSON map in a file readable only by the owner
//! - [`MemorySecretStore`]: process memory, for tests and ephemeral use

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;
use thiserror::Error;

/// Default service name for keychain entries.
pub const DEFAULT_SERVICE_NAME: &str = "nasbridge";

/// Errors that can occur during secret store operations.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// Access to the store was denied.
    #[error("secret store access denied: {0}")]
    AccessDenied(String),

    /// The backing service is unavailable.
    #[error("secret store unavailable: {0}")]
    ServiceUnavailable(String),

    /// The value could not be stored or read back in its encoding.
    #[error("secret encoding error: {0}")]
    EncodingError(String),

    /// A platform-specific error occurred.
    #[error("secret store error: {0}")]
    PlatformError(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for secret store operations.
pub type SecretResult<T> = Result<T, SecretStoreError>;

/// Opaque key/value storage.
pub trait SecretStore: Send + Sync {
    /// Read a value; `None` if the key is absent.
    fn get(&self, key: &str) -> SecretResult<Option<String>>;

    /// Store or replace a value.
    fn put(&self, key: &str, value: &str) -> SecretResult<()>;

    /// Remove a key. Removing an absent key succeeds.
    fn remove(&self, key: &str) -> SecretResult<()>;

    /// Whether a key is present.
    fn contains(&self, key: &str) -> SecretResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Secret store backed by the system keychain.
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> SecretResult<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| SecretStoreError::PlatformError(e.to_string()))
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

fn map_keyring_error(e: keyring::Error) -> SecretStoreError {
    match e {
        keyring::Error::NoStorageAccess(_) => {
            SecretStoreError::AccessDenied("No storage access".to_string())
        }
        keyring::Error::PlatformFailure(_) => {
            SecretStoreError::ServiceUnavailable("Platform failure".to_string())
        }
        keyring::Error::TooLong(_, _) => SecretStoreError::EncodingError("Value too long".to_string()),
        keyring::Error::BadEncoding(_) => {
            SecretStoreError::EncodingError("Value is not valid UTF-8".to_string())
        }
        keyring::Error::Ambiguous(_) => {
            SecretStoreError::PlatformError("Ambiguous keychain entry".to_string())
        }
        _ => SecretStoreError::PlatformError(e.to_string()),
    }
}

impl SecretStore for KeyringSecretStore {
    fn get(&self, key: &str) -> SecretResult<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn put(&self, key: &str, value: &str) -> SecretResult<()> {
        self.entry(key)?
            .set_password(value)
            .map_err(map_keyring_error)
    }

    fn remove(&self, key: &str) -> SecretResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}

/// Secret store persisted as a JSON map in a single file.
///
/// Writes go to a temporary sibling first and are renamed into place. On Unix
/// the file is created with mode `0600`.
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> SecretResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&contents).map_err(|e| SecretStoreError::EncodingError(e.to_string()))
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> SecretResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(map)
            .map_err(|e| SecretStoreError::EncodingError(e.to_string()))?;

        let mut temp_name = self.path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn guard(&self) -> SecretResult<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| SecretStoreError::PlatformError("secret file lock poisoned".to_string()))
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> SecretResult<Option<String>> {
        let _guard = self.guard()?;
        Ok(self.read_map()?.remove(key))
    }

    fn put(&self, key: &str, value: &str) -> SecretResult<()> {
        let _guard = self.guard()?;
        let mut map = self.read_map()?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> SecretResult<()> {
        let _guard = self.guard()?;
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

/// In-process secret store.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: DashMap<String, String>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> SecretResult<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: &str) -> SecretResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SecretResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}
