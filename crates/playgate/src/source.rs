//! # Source Management
//!
//! Playable sources and the ordered server list a host walks through when
//! a session fails.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// How a source is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum DeliveryKind {
    /// Adaptive manifest (`application/vnd.apple.mpegurl`)
    Hls,
    /// Direct progressive file
    Progressive,
}

impl From<String> for DeliveryKind {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("hls") {
            Self::Hls
        } else {
            Self::Progressive
        }
    }
}

impl From<DeliveryKind> for String {
    fn from(kind: DeliveryKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryKind::Hls => f.write_str("hls"),
            DeliveryKind::Progressive => f.write_str("progressive"),
        }
    }
}

/// One playable stream. Immutable once selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub link: String,
    #[serde(rename = "type")]
    pub kind: DeliveryKind,
    /// Logical server this source belongs to
    #[serde(default)]
    pub server_index: usize,
}

impl Source {
    pub fn new(link: impl Into<String>, kind: DeliveryKind, server_index: usize) -> Self {
        Self {
            link: link.into(),
            kind,
            server_index,
        }
    }

    pub fn hls(link: impl Into<String>, server_index: usize) -> Self {
        Self::new(link, DeliveryKind::Hls, server_index)
    }

    pub fn progressive(link: impl Into<String>, server_index: usize) -> Self {
        Self::new(link, DeliveryKind::Progressive, server_index)
    }

    pub fn is_adaptive(&self) -> bool {
        self.kind == DeliveryKind::Hls
    }

    /// Same source, link replaced (used when routing through a delivery endpoint)
    pub fn with_link(&self, link: impl Into<String>) -> Self {
        Self {
            link: link.into(),
            ..self.clone()
        }
    }
}

/// Status a host tracks per server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Not tried yet
    #[default]
    Pending,
    /// A session reached a healthy state on it
    Working,
    /// A session failed terminally on it
    Failed,
}

/// A candidate server: its source and whether it must be reached through a delivery endpoint
#[derive(Debug, Clone)]
pub struct Server {
    pub name: String,
    pub source: Source,
    pub proxied: bool,
    pub status: ServerStatus,
}

/// Ordered server list with per-server status.
///
/// Servers are tried in insertion order; a failed server is skipped until
/// [`ServerManager::reset`] is called.
#[derive(Debug, Default)]
pub struct ServerManager {
    servers: Vec<Server>,
}

impl ServerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a server and return its index. The source's `server_index` is overwritten.
    pub fn add_server(&mut self, name: impl Into<String>, source: Source, proxied: bool) -> usize {
        let index = self.servers.len();
        self.servers.push(Server {
            name: name.into(),
            source: Source {
                server_index: index,
                ..source
            },
            proxied,
            status: ServerStatus::Pending,
        });
        index
    }

    pub fn has_servers(&self) -> bool {
        !self.servers.is_empty()
    }

    pub fn count(&self) -> usize {
        self.servers.len()
    }

    pub fn get(&self, index: usize) -> Option<&Server> {
        self.servers.get(index)
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn status(&self, index: usize) -> Option<ServerStatus> {
        self.servers.get(index).map(|s| s.status)
    }

    /// Record a status reported for a server. Unknown indices are ignored.
    pub fn update_status(&mut self, index: usize, status: ServerStatus) {
        if let Some(server) = self.servers.get_mut(index) {
            debug!(
                server_index = index,
                server = %server.name,
                from = ?server.status,
                to = ?status,
                "Server status updated"
            );
            server.status = status;
        }
    }

    /// First server, in order, that has not failed
    pub fn next_candidate(&self) -> Option<&Server> {
        self.servers
            .iter()
            .find(|s| s.status != ServerStatus::Failed)
    }

    pub fn failed_count(&self) -> usize {
        self.servers
            .iter()
            .filter(|s| s.status == ServerStatus::Failed)
            .count()
    }

    pub fn all_failed(&self) -> bool {
        self.has_servers() && self.failed_count() == self.servers.len()
    }

    /// Forget every recorded status
    pub fn reset(&mut self) {
        for server in &mut self.servers {
            server.status = ServerStatus::Pending;
        }
    }
}
