//! Best-effort discovery of SMB servers on the local network.
//!
//! Every host of a private /24 subnet is probed on the SMB port. Responding
//! hosts can optionally be asked for their share list with an anonymous
//! login. Results are hints only; failures for individual hosts are
//! swallowed.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::config::DiscoveryConfig;
use crate::path;
use crate::session::{SmbConnector, SmbEndpoint, SmbTarget, DEFAULT_SMB_PORT};

/// Errors that can occur before a scan starts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Scanning is limited to private address ranges.
    #[error("refusing to scan non-private subnet {0}/24")]
    NotPrivate(Ipv4Addr),

    /// No local IPv4 address could be determined.
    #[error("could not determine a local IPv4 address")]
    NoLocalAddress,
}

/// A server that answered on the SMB port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NasHint {
    pub host: String,
    /// Display name; the address when nothing better is known.
    pub name: String,
    /// Shares visible to an anonymous login, if enumeration succeeded.
    pub shares: Vec<String>,
}

/// Scan tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOptions {
    pub port: u16,
    pub probe_timeout: Duration,
    pub concurrency: usize,
    pub enumerate_shares: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from(&DiscoveryConfig::default())
    }
}

impl From<&DiscoveryConfig> for DiscoveryOptions {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            port: config.port,
            probe_timeout: config.probe_timeout(),
            concurrency: config.concurrency.max(1),
            enumerate_shares: config.enumerate_shares,
        }
    }
}

/// Subnet scanner.
pub struct NasDiscovery {
    options: DiscoveryOptions,
    connector: Option<Arc<dyn SmbConnector>>,
}

impl NasDiscovery {
    pub fn new(options: DiscoveryOptions) -> Self {
        Self {
            options,
            connector: None,
        }
    }

    /// Use `connector` to list shares on responding hosts.
    pub fn with_connector(mut self, connector: Arc<dyn SmbConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Scan the /24 subnet of this machine's primary IPv4 address.
    pub async fn scan(&self) -> Result<Vec<NasHint>, DiscoveryError> {
        let local = local_ipv4().ok_or(DiscoveryError::NoLocalAddress)?;
        self.scan_subnet(local).await
    }

    /// Scan the /24 subnet containing `address`.
    pub async fn scan_subnet(&self, address: Ipv4Addr) -> Result<Vec<NasHint>, DiscoveryError> {
        if !address.is_private() {
            return Err(DiscoveryError::NotPrivate(subnet_base(address)));
        }
        tracing::info!(subnet = %subnet_base(address), port = self.options.port, "Scanning for SMB servers");
        Ok(self.scan_hosts(subnet_hosts(address)).await)
    }

    /// Probe an explicit host list. Results keep the input order.
    pub async fn scan_hosts<I>(&self, hosts: I) -> Vec<NasHint>
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let concurrency = self.options.concurrency.max(1);
        let mut found: Vec<(usize, NasHint)> = stream::iter(hosts.into_iter().enumerate())
            .map(|(index, host)| async move {
                if self.probe(host).await {
                    Some((index, self.describe(host).await))
                } else {
                    None
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;

        found.sort_by_key(|(index, _)| *index);
        tracing::info!(found = found.len(), "SMB scan finished");
        found.into_iter().map(|(_, hint)| hint).collect()
    }

    /// Whether `host` accepts TCP connections on the SMB port.
    pub async fn probe(&self, host: Ipv4Addr) -> bool {
        let address = SocketAddr::new(IpAddr::V4(host), self.options.port);
        match tokio::time::timeout(self.options.probe_timeout, TcpStream::connect(address)).await {
            Ok(Ok(_)) => {
                tracing::debug!(host = %host, "SMB port open");
                true
            }
            Ok(Err(e)) => {
                tracing::trace!(host = %host, error = %e, "Probe refused");
                false
            }
            Err(_) => false,
        }
    }

    async fn describe(&self, host: Ipv4Addr) -> NasHint {
        let shares = if self.options.enumerate_shares {
            self.enumerate_shares(host).await
        } else {
            Vec::new()
        };
        NasHint {
            host: host.to_string(),
            name: host.to_string(),
            shares,
        }
    }

    async fn enumerate_shares(&self, host: Ipv4Addr) -> Vec<String> {
        let Some(connector) = self.connector.clone() else {
            return Vec::new();
        };

        let endpoint = SmbEndpoint::new(host.to_string(), self.options.port);
        let target = SmbTarget {
            endpoint: endpoint.clone(),
            username: String::new(),
            password: String::new(),
            domain: String::new(),
            workgroup: String::new(),
            share: String::new(),
            anonymous: true,
            request_timeout: self.options.probe_timeout,
        };

        let listing = tokio::task::spawn_blocking(move || {
            let transport = connector.connect(&target)?;
            let shares = transport.list(&endpoint.url_for(path::ROOT));
            transport.shutdown();
            shares
        });

        match tokio::time::timeout(self.options.probe_timeout * 4, listing).await {
            Ok(Ok(Ok(stats))) => stats
                .into_iter()
                .filter(|s| s.is_directory && !s.name.ends_with('$'))
                .map(|s| s.name)
                .collect(),
            Ok(Ok(Err(e))) => {
                tracing::debug!(host = %host, error = %e, "Share enumeration failed");
                Vec::new()
            }
            Ok(Err(e)) => {
                tracing::debug!(host = %host, error = %e, "Share enumeration task failed");
                Vec::new()
            }
            Err(_) => {
                tracing::debug!(host = %host, "Share enumeration timed out");
                Vec::new()
            }
        }
    }
}

impl Default for NasDiscovery {
    fn default() -> Self {
        Self::new(DiscoveryOptions::default())
    }
}

/// Primary local IPv4 address.
///
/// Connecting a UDP socket picks the outbound interface without sending any
/// packet.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(192, 0, 2, 1), DEFAULT_SMB_PORT)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() && !ip.is_loopback() => Some(ip),
        _ => None,
    }
}

/// Network address of the /24 containing `address`.
pub fn subnet_base(address: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = address.octets();
    Ipv4Addr::new(a, b, c, 0)
}

/// Host addresses `.1` through `.254` of the /24 containing `address`.
pub fn subnet_hosts(address: Ipv4Addr) -> impl Iterator<Item = Ipv4Addr> {
    let [a, b, c, _] = address.octets();
    (1..=254u8).map(move |d| Ipv4Addr::new(a, b, c, d))
}
