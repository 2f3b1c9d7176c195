//! Configuration management for NasBridge.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/nasbridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{SessionOptions, DEFAULT_SMB_PORT};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("{field} must be between 1 and 3600 seconds, got {value}")]
    InvalidTimeout { field: &'static str, value: u64 },

    #[error("{field} must be between 1 and 65535, got {value}")]
    InvalidPort { field: &'static str, value: u16 },

    #[error("probe_timeout_ms must be between 10 and 60000, got {0}")]
    InvalidProbeTimeout(u64),

    #[error("concurrency must be between 1 and 1024, got {0}")]
    InvalidConcurrency(usize),

    #[error("secret backend must be one of: keyring, file; got {0}")]
    InvalidSecretBackend(String),

    #[error("secret service name must not be blank")]
    BlankServiceName,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    /// Local storage settings.
    pub local: LocalConfig,

    /// SMB session settings.
    pub smb: SmbConfig,

    /// Network discovery settings.
    pub discovery: DiscoveryConfig,

    /// Where connection secrets are kept.
    pub secrets: SecretsConfig,
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory for storing application data.
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Optional log file; logs go to stderr only when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Local storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LocalConfig {
    /// Roots the local backend may touch. Empty means all paths allowed.
    pub allowed_paths: Vec<PathBuf>,

    /// Show dot-files in listings.
    pub show_hidden: bool,
}

/// SMB session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SmbConfig {
    /// Time allowed for negotiation and authentication.
    pub connect_timeout_secs: u64,

    /// Time allowed for a single request.
    pub request_timeout_secs: u64,

    /// Port used for new connection profiles.
    pub default_port: u16,
}

/// Network discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// TCP port probed on each host.
    pub port: u16,

    /// Per-host probe timeout in milliseconds.
    pub probe_timeout_ms: u64,

    /// Maximum probes in flight.
    pub concurrency: usize,

    /// Try an anonymous login to list shares on responding hosts.
    pub enumerate_shares: bool,
}

/// Which secret store backs the connection registry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecretBackend {
    /// Platform keychain.
    #[default]
    Keyring,
    /// Owner-only JSON file.
    File,
}

impl FromStr for SecretBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keyring" => Ok(SecretBackend::Keyring),
            "file" => Ok(SecretBackend::File),
            _ => Err(ConfigError::InvalidSecretBackend(s.to_string())),
        }
    }
}

/// Secret storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecretsConfig {
    pub backend: SecretBackend,

    /// Keychain service name.
    pub service: String,

    /// File used by the `file` backend; defaults to `<data_dir>/secrets.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl Default for SmbConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 60,
            request_timeout_secs: 60,
            default_port: DEFAULT_SMB_PORT,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SMB_PORT,
            probe_timeout_ms: 500,
            concurrency: 64,
            enumerate_shares: true,
        }
    }
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            backend: SecretBackend::default(),
            service: crate::connections::DEFAULT_SERVICE_NAME.to_string(),
            file: None,
        }
    }
}

impl SmbConfig {
    /// Timeouts for new sessions.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nasbridge")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("nasbridge")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - NASBRIDGE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - NASBRIDGE_SECRET_BACKEND: Override secret backend (keyring, file)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("NASBRIDGE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.general.log_level = level;
            }
        }

        if let Ok(backend) = std::env::var("NASBRIDGE_SECRET_BACKEND") {
            if !backend.is_empty() {
                match backend.parse::<SecretBackend>() {
                    Ok(parsed) => {
                        tracing::info!("Overriding secret backend from environment: {}", backend);
                        self.secrets.backend = parsed;
                    }
                    Err(e) => tracing::warn!("Ignoring NASBRIDGE_SECRET_BACKEND: {}", e),
                }
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.general.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(
                self.general.log_level.clone(),
            ));
        }

        for (field, value) in [
            ("connect_timeout_secs", self.smb.connect_timeout_secs),
            ("request_timeout_secs", self.smb.request_timeout_secs),
        ] {
            if !(1..=3600).contains(&value) {
                return Err(ConfigError::InvalidTimeout { field, value });
            }
        }

        if self.smb.default_port == 0 {
            return Err(ConfigError::InvalidPort {
                field: "smb.default_port",
                value: 0,
            });
        }
        if self.discovery.port == 0 {
            return Err(ConfigError::InvalidPort {
                field: "discovery.port",
                value: 0,
            });
        }

        if !(10..=60_000).contains(&self.discovery.probe_timeout_ms) {
            return Err(ConfigError::InvalidProbeTimeout(
                self.discovery.probe_timeout_ms,
            ));
        }

        if !(1..=1024).contains(&self.discovery.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.discovery.concurrency));
        }

        if self.secrets.service.trim().is_empty() {
            return Err(ConfigError::BlankServiceName);
        }

        Ok(())
    }

    /// File used by the `file` secret backend.
    pub fn secrets_file(&self) -> PathBuf {
        self.secrets
            .file
            .clone()
            .unwrap_or_else(|| self.general.data_dir.join("secrets.json"))
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
