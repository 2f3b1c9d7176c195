//! Saved remote connection profiles.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entry::now_millis;
use crate::session::DEFAULT_SMB_PORT;

/// How to reach and authenticate to one SMB server.
///
/// Profiles are values: the `with_*` methods return modified copies. The
/// password is only ever persisted through a secret store and is redacted
/// from `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionProfile {
    pub id: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub domain: String,
    pub share: String,
    pub workgroup: String,
    pub is_anonymous: bool,
    pub is_default: bool,
    /// Creation time (Unix epoch milliseconds).
    pub created_at: i64,
    /// Last successful connect (Unix epoch milliseconds).
    pub last_connected_at: Option<i64>,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            name: String::new(),
            host: String::new(),
            port: DEFAULT_SMB_PORT,
            username: String::new(),
            password: String::new(),
            domain: String::new(),
            share: String::new(),
            workgroup: String::new(),
            is_anonymous: false,
            is_default: false,
            created_at: 0,
            last_connected_at: None,
        }
    }
}

impl ConnectionProfile {
    /// Create a profile with a fresh id and the default port.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            host: host.into(),
            created_at: now_millis(),
            ..Self::default()
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_share(mut self, share: impl Into<String>) -> Self {
        self.share = share.into();
        self
    }

    pub fn with_workgroup(mut self, workgroup: impl Into<String>) -> Self {
        self.workgroup = workgroup.into();
        self
    }

    pub fn with_anonymous(mut self, anonymous: bool) -> Self {
        self.is_anonymous = anonymous;
        self
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn with_last_connected_at(mut self, at: i64) -> Self {
        self.last_connected_at = Some(at);
        self
    }

    /// The first reason this profile cannot be used, if any.
    pub fn validation_error(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            return Some("name is blank");
        }
        if self.host.trim().is_empty() {
            return Some("host is blank");
        }
        if self.port == 0 {
            return Some("port must be between 1 and 65535");
        }
        if !self.is_anonymous
            && (self.username.trim().is_empty() || self.password.trim().is_empty())
        {
            return Some("username and password are required unless anonymous");
        }
        None
    }

    /// Name and host present, port in range, credentials or anonymous.
    pub fn is_valid(&self) -> bool {
        self.validation_error().is_none()
    }

    /// `user@host:port` style label for logs.
    pub fn display_target(&self) -> String {
        let user = if self.is_anonymous {
            "guest"
        } else {
            self.username.as_str()
        };
        format!("{}@{}:{}", user, self.host, self.port)
    }
}

impl std::fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .field("share", &self.share)
            .field("workgroup", &self.workgroup)
            .field("is_anonymous", &self.is_anonymous)
            .field("is_default", &self.is_default)
            .field("created_at", &self.created_at)
            .field("last_connected_at", &self.last_connected_at)
            .finish()
    }
}
