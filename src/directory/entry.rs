use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::net::IpAddr;

pub const DEFAULT_PORT: u16 = 80;

/// Sentinel target: keep the connection where it is but capture its traffic.
pub const ALPHA: &str = "alpha";

/// One host in the directory.
///
/// The local allow list and `alpha_only` are only ever set from this host's own
/// configuration; the remote allow list is learned from the open platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEntry {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Identities that may be captured on this host
    #[serde(default, rename = "alphaList", skip_serializing_if = "BTreeSet::is_empty")]
    pub allow_list: BTreeSet<String>,

    /// Identities the open platform routes to this host
    #[serde(
        default,
        rename = "remoteAlphaList",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub remote_allow_list: BTreeSet<String>,

    /// Never advertise this host as a proxy target
    #[serde(default)]
    pub alpha_only: bool,

    #[serde(flatten)]
    pub metadata: EntryMetadata,
}

/// Descriptive fields shown on the open platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Anything else the operator attached
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for ProxyEntry {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            allow_list: BTreeSet::new(),
            remote_allow_list: BTreeSet::new(),
            alpha_only: false,
            metadata: EntryMetadata::default(),
        }
    }
}

impl ProxyEntry {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    pub fn allow(mut self, identity: impl Into<String>) -> Self {
        self.allow_list.insert(identity.into());
        self
    }
}

/// Where a request should go, as decided at request start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// Forward to another host
    Proxy { host: String, port: u16 },
    /// Serve locally, capture traffic
    Alpha,
}

impl RouteTarget {
    /// The host as it appears in the request context: an address or `"alpha"`.
    pub fn host(&self) -> &str {
        match self {
            Self::Proxy { host, .. } => host,
            Self::Alpha => ALPHA,
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Proxy { port, .. } => Some(*port),
            Self::Alpha => None,
        }
    }

    /// True when the target is a literal IP address.
    pub fn is_ip(&self) -> bool {
        matches!(self, Self::Proxy { host, .. } if host.parse::<IpAddr>().is_ok())
    }
}
