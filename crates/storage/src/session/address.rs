//! Translation between uniform paths and `smb://` URLs.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::Url;

use crate::error::{StorageError, StorageResult};
use crate::path;

/// Default SMB port.
pub const DEFAULT_SMB_PORT: u16 = 445;

/// URL scheme for SMB/CIFS.
pub const SMB_SCHEME: &str = "smb";

/// Characters escaped inside a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Host and port of an SMB server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SmbEndpoint {
    pub host: String,
    pub port: u16,
}

impl SmbEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Server URL without a path, e.g. `smb://nas.local:445`.
    pub fn server_url(&self) -> String {
        if self.host.contains(':') {
            format!("{SMB_SCHEME}://[{}]:{}", self.host, self.port)
        } else {
            format!("{SMB_SCHEME}://{}:{}", self.host, self.port)
        }
    }

    /// Full URL for a uniform path, percent-encoding each segment.
    pub fn url_for(&self, uniform: &str) -> String {
        let encoded: Vec<String> = uniform
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();
        format!("{}/{}", self.server_url(), encoded.join("/"))
    }

    /// Parse an `smb://` URL into its endpoint and uniform path.
    pub fn parse_url(raw: &str) -> StorageResult<(SmbEndpoint, String)> {
        let url = Url::parse(raw)
            .map_err(|e| StorageError::InvalidPath(format!("invalid SMB URL {raw}: {e}")))?;

        if url.scheme() != SMB_SCHEME {
            return Err(StorageError::InvalidPath(format!(
                "expected {SMB_SCHEME}:// URL, got {raw}"
            )));
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| StorageError::InvalidPath(format!("SMB URL has no host: {raw}")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url.port().unwrap_or(DEFAULT_SMB_PORT);

        let mut segments = Vec::new();
        for segment in url.path().split('/').filter(|s| !s.is_empty()) {
            let decoded = percent_decode_str(segment).decode_utf8().map_err(|e| {
                StorageError::InvalidPath(format!("invalid encoding in {raw}: {e}"))
            })?;
            segments.push(decoded.into_owned());
        }

        let uniform = path::normalize(&format!("/{}", segments.join("/")))?;
        Ok((SmbEndpoint::new(host, port), uniform))
    }
}

impl std::fmt::Display for SmbEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.server_url())
    }
}

/// Share component of a uniform remote path, or `None` for the root.
pub fn share_of(uniform: &str) -> Option<&str> {
    uniform.split('/').find(|segment| !segment.is_empty())
}

/// Whether a uniform path names a share itself (`/media`).
pub fn is_share_root(uniform: &str) -> bool {
    share_of(uniform).is_some() && path::parent(uniform).as_deref() == Some(path::ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for() {
        let endpoint = SmbEndpoint::new("10.0.0.5", 445);
        assert_eq!(endpoint.url_for("/"), "smb://10.0.0.5:445/");
        assert_eq!(endpoint.url_for("/share/docs"), "smb://10.0.0.5:445/share/docs");
        assert_eq!(
            endpoint.url_for("/share/My Files/50%#1.txt"),
            "smb://10.0.0.5:445/share/My%20Files/50%25%231.txt"
        );
    }

    #[test]
    fn test_parse_url_roundtrip() {
        let endpoint = SmbEndpoint::new("nas.local", 1445);
        let path = "/media/Movies, \"Best\"/a?b.mkv";
        let (parsed, uniform) = SmbEndpoint::parse_url(&endpoint.url_for(path)).unwrap();
        assert_eq!(parsed, endpoint);
        assert_eq!(uniform, path);
    }

    #[test]
    fn test_parse_url_defaults_port() {
        let (endpoint, uniform) = SmbEndpoint::parse_url("smb://server/share").unwrap();
        assert_eq!(endpoint.port, DEFAULT_SMB_PORT);
        assert_eq!(endpoint.host, "server");
        assert_eq!(uniform, "/share");
    }

    #[test]
    fn test_parse_url_ipv6() {
        let endpoint = SmbEndpoint::new("fe80::1", 445);
        let (parsed, _) = SmbEndpoint::parse_url(&endpoint.url_for("/s")).unwrap();
        assert_eq!(parsed.host, "fe80::1");
    }

    #[test]
    fn test_parse_url_rejects_other_schemes() {
        assert!(SmbEndpoint::parse_url("ftp://server/share").is_err());
        assert!(SmbEndpoint::parse_url("not a url").is_err());
    }

    #[test]
    fn test_share_helpers() {
        assert_eq!(share_of("/media/movies"), Some("media"));
        assert_eq!(share_of("/"), None);
        assert!(is_share_root("/media"));
        assert!(!is_share_root("/media/movies"));
        assert!(!is_share_root("/"));
    }
}
