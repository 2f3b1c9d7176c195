//! Connection lifecycle for one SMB server.
//!
//! ```text
//! Disconnected --connect--> Connecting --ok--> Connected
//!                                 |                |
//!                                 +--fail--> Error |
//!                                                  +--disconnect--> Disconnected
//! ```
//!
//! Session handles are cheap clones sharing one state, so a backend and the
//! code that drives `connect`/`disconnect` always observe the same connection.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::connections::ConnectionProfile;
use crate::entry::now_millis;
use crate::error::{StorageError, StorageResult};

use super::address::SmbEndpoint;
use super::transport::{SmbConnector, SmbTarget, SmbTransport};

/// Default time allowed for negotiation and authentication.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time allowed for a single remote request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

/// Session timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// A live, authenticated connection.
#[derive(Clone)]
pub struct ActiveConnection {
    /// Profile the connection was made with.
    pub profile: ConnectionProfile,
    pub endpoint: SmbEndpoint,
    pub transport: Arc<dyn SmbTransport>,
}

impl ActiveConnection {
    /// URL of a uniform path on this connection's server.
    pub fn url(&self, uniform: &str) -> String {
        self.endpoint.url_for(uniform)
    }
}

struct SessionInner {
    connector: Arc<dyn SmbConnector>,
    options: SessionOptions,
    active: RwLock<Option<ActiveConnection>>,
    status: watch::Sender<ConnectionStatus>,
}

/// Owner of at most one authenticated SMB connection.
#[derive(Clone)]
pub struct SmbSession {
    inner: Arc<SessionInner>,
}

impl SmbSession {
    /// Create a disconnected session with default timeouts.
    pub fn new(connector: Arc<dyn SmbConnector>) -> Self {
        Self::with_options(connector, SessionOptions::default())
    }

    /// Create a disconnected session with explicit timeouts.
    pub fn with_options(connector: Arc<dyn SmbConnector>, options: SessionOptions) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(SessionInner {
                connector,
                options,
                active: RwLock::new(None),
                status,
            }),
        }
    }

    pub fn options(&self) -> SessionOptions {
        self.inner.options
    }

    fn read_active(&self) -> RwLockReadGuard<'_, Option<ActiveConnection>> {
        self.inner
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_active(&self) -> RwLockWriteGuard<'_, Option<ActiveConnection>> {
        self.inner
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: ConnectionStatus) {
        tracing::debug!(status = %status, "SMB session status changed");
        self.inner.status.send_replace(status);
    }

    /// Connect to the server described by `profile`.
    ///
    /// An existing connection is torn down first. On success the profile is
    /// returned with `last_connected_at` set to now.
    pub async fn connect(&self, profile: ConnectionProfile) -> StorageResult<ConnectionProfile> {
        if let Some(reason) = profile.validation_error() {
            return Err(StorageError::ConnectionError(format!(
                "invalid connection profile: {reason}"
            )));
        }

        if self.read_active().is_some() {
            self.disconnect();
        }

        self.set_status(ConnectionStatus::Connecting);
        tracing::info!(server = %profile.display_target(), "Connecting to SMB server");

        let target = SmbTarget::from_profile(&profile, self.inner.options.request_timeout);
        let endpoint = target.endpoint.clone();
        let connector = Arc::clone(&self.inner.connector);
        let timeout = self.inner.options.connect_timeout;

        let attempt = tokio::time::timeout(
            timeout,
            tokio::task::spawn_blocking(move || connector.connect(&target)),
        )
        .await;

        let outcome = match attempt {
            Err(_) => Err(StorageError::ConnectionError(format!(
                "timed out after {}s connecting to {endpoint}",
                timeout.as_secs_f32()
            ))),
            Ok(Err(join_error)) => Err(StorageError::ConnectionError(format!(
                "connect task failed: {join_error}"
            ))),
            Ok(Ok(Err(StorageError::ConnectionError(msg)))) => {
                Err(StorageError::ConnectionError(msg))
            }
            Ok(Ok(Err(other))) => Err(StorageError::ConnectionError(other.to_string())),
            Ok(Ok(Ok(transport))) => Ok(transport),
        };

        match outcome {
            Ok(transport) => {
                let connected = profile.with_last_connected_at(now_millis());
                *self.write_active() = Some(ActiveConnection {
                    profile: connected.clone(),
                    endpoint: endpoint.clone(),
                    transport,
                });
                self.set_status(ConnectionStatus::Connected);
                tracing::info!(endpoint = %endpoint, name = %connected.name, "Connected to SMB server");
                Ok(connected)
            }
            Err(e) => {
                let message = match &e {
                    StorageError::ConnectionError(msg) => msg.clone(),
                    other => other.to_string(),
                };
                tracing::warn!(endpoint = %endpoint, error = %message, "SMB connect failed");
                self.set_status(ConnectionStatus::Error(message));
                Err(e)
            }
        }
    }

    /// Drop the current connection. Always succeeds locally.
    pub fn disconnect(&self) {
        let previous = self.write_active().take();
        if let Some(connection) = previous {
            connection.transport.shutdown();
            tracing::info!(endpoint = %connection.endpoint, "Disconnected from SMB server");
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Record that a remote call found the connection broken.
    pub fn mark_failed(&self, message: impl Into<String>) {
        let message = message.into();
        let previous = self.write_active().take();
        if let Some(connection) = previous {
            tracing::warn!(endpoint = %connection.endpoint, error = %message, "SMB connection lost");
            connection.transport.shutdown();
            self.set_status(ConnectionStatus::Error(message));
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.read_active().is_some() && self.status() == ConnectionStatus::Connected
    }

    /// Profile of the current connection.
    pub fn profile(&self) -> Option<ConnectionProfile> {
        self.read_active().as_ref().map(|c| c.profile.clone())
    }

    /// The live connection, or `NotConnected`.
    pub fn active(&self) -> StorageResult<ActiveConnection> {
        if self.status() != ConnectionStatus::Connected {
            return Err(StorageError::NotConnected);
        }
        self.read_active().clone().ok_or(StorageError::NotConnected)
    }
}

impl std::fmt::Debug for SmbSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmbSession")
            .field("status", &self.status())
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::memory::{MemoryConnector, MemoryShare};

    fn anonymous_profile() -> ConnectionProfile {
        ConnectionProfile::new("Home NAS", "10.0.0.5").with_anonymous(true)
    }

    fn create_test_session() -> (SmbSession, MemoryShare) {
        let share = MemoryShare::new();
        share.add_share("public");
        let session = SmbSession::new(Arc::new(MemoryConnector::new(share.clone())));
        (session, share)
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let (session, _share) = create_test_session();
        let mut updates = session.subscribe();
        assert_eq!(session.status(), ConnectionStatus::Disconnected);

        let connected = session.connect(anonymous_profile()).await.unwrap();
        assert!(connected.last_connected_at.is_some());
        assert!(session.is_connected());
        assert_eq!(session.status(), ConnectionStatus::Connected);
        assert!(updates.has_changed().unwrap());
        assert_eq!(*updates.borrow_and_update(), ConnectionStatus::Connected);

        let active = session.active().unwrap();
        assert_eq!(active.endpoint, SmbEndpoint::new("10.0.0.5", 445));
        assert_eq!(session.profile().unwrap().id, connected.id);

        session.disconnect();
        assert!(!session.is_connected());
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(matches!(session.active(), Err(StorageError::NotConnected)));

        // idempotent
        session.disconnect();
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_invalid_profile_is_rejected() {
        let (session, _share) = create_test_session();
        let result = session.connect(ConnectionProfile::new("n", "h")).await;
        assert!(matches!(result, Err(StorageError::ConnectionError(_))));
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_rejected_credentials_set_error_status() {
        let share = MemoryShare::new();
        let connector = MemoryConnector::new(share).with_credentials("alice", "s3cret");
        let session = SmbSession::new(Arc::new(connector));

        let profile = ConnectionProfile::new("n", "10.0.0.5").with_credentials("alice", "wrong");
        let result = session.connect(profile).await;

        assert!(matches!(result, Err(StorageError::ConnectionError(_))));
        assert!(matches!(session.status(), ConnectionStatus::Error(_)));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let connector = MemoryConnector::new(MemoryShare::new())
            .with_connect_delay(Duration::from_millis(300));
        let session = SmbSession::with_options(
            Arc::new(connector),
            SessionOptions {
                connect_timeout: Duration::from_millis(20),
                request_timeout: Duration::from_secs(1),
            },
        );

        let result = session.connect(anonymous_profile()).await;
        match result {
            Err(StorageError::ConnectionError(msg)) => assert!(msg.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(matches!(session.status(), ConnectionStatus::Error(_)));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_connection() {
        let (session, _share) = create_test_session();
        session.connect(anonymous_profile()).await.unwrap();

        let other = ConnectionProfile::new("Office", "10.0.0.9").with_anonymous(true);
        session.connect(other.clone()).await.unwrap();

        assert_eq!(session.profile().unwrap().id, other.id);
        assert_eq!(session.active().unwrap().endpoint.host, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_mark_failed() {
        let (session, _share) = create_test_session();
        session.connect(anonymous_profile()).await.unwrap();

        session.mark_failed("connection reset");
        assert!(!session.is_connected());
        assert_eq!(
            session.status(),
            ConnectionStatus::Error("connection reset".to_string())
        );

        // nothing to fail when already disconnected
        session.disconnect();
        session.mark_failed("late");
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let (session, _share) = create_test_session();
        let handle = session.clone();
        session.connect(anonymous_profile()).await.unwrap();
        assert!(handle.is_connected());
        handle.disconnect();
        assert!(!session.is_connected());
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ConnectionStatus::Error("boom".into())).unwrap();
        assert_eq!(json, r#"{"state":"error","message":"boom"}"#);
        let json = serde_json::to_string(&ConnectionStatus::Connected).unwrap();
        assert_eq!(json, r#"{"state":"connected"}"#);
    }
}
