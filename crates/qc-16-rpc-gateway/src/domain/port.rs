//! Listening port description.
//!
//! A [`Port`] is built once from configuration at startup (see
//! [`crate::domain::setup`]) and is shared read-only for the lifetime of the
//! process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Wire protocol a port may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
    Ws,
    Wss,
    Peer,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Ws => "ws",
            Protocol::Wss => "wss",
            Protocol::Peer => "peer",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of the TLS context a port needs.
///
/// Building the actual context (loading keys, certificates) belongs to the
/// transport layer; the gateway only decides which kind is required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsContext {
    /// Port carries no secure protocol.
    Plain,
    /// Secure port without configured material: self-signed anonymous context.
    Anonymous,
    /// Secure port with key/certificate/chain files.
    Authed {
        key: String,
        cert: String,
        chain: String,
    },
}

/// A configured listening endpoint.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub ip: IpAddr,
    pub port: u16,
    pub protocols: BTreeSet<Protocol>,
    /// Basic-auth user for general clients (empty = not configured)
    pub user: String,
    pub password: String,
    pub admin_user: String,
    pub admin_password: String,
    /// Addresses allowed admin access. An unspecified address matches any caller.
    pub admin_ip: Vec<IpAddr>,
    /// Addresses of trusted gateways allowed to forward identities.
    pub secure_gateway_ip: Vec<IpAddr>,
    /// Maximum live connections (0 = unlimited)
    pub limit: usize,
    pub ssl_key: String,
    pub ssl_cert: String,
    pub ssl_chain: String,
    pub context: TlsContext,
}

impl Port {
    /// Create a port with no credentials, allow-lists or limit.
    pub fn new(
        name: impl Into<String>,
        ip: IpAddr,
        port: u16,
        protocols: impl IntoIterator<Item = Protocol>,
    ) -> Self {
        Self {
            name: name.into(),
            ip,
            port,
            protocols: protocols.into_iter().collect(),
            user: String::new(),
            password: String::new(),
            admin_user: String::new(),
            admin_password: String::new(),
            admin_ip: Vec::new(),
            secure_gateway_ip: Vec::new(),
            limit: 0,
            ssl_key: String::new(),
            ssl_cert: String::new(),
            ssl_chain: String::new(),
            context: TlsContext::Plain,
        }
    }

    pub fn has(&self, protocol: Protocol) -> bool {
        self.protocols.contains(&protocol)
    }

    /// True if the port offers `ws` or `wss`.
    pub fn websockets(&self) -> bool {
        self.has(Protocol::Ws) || self.has(Protocol::Wss)
    }

    /// True if any offered protocol runs over TLS.
    pub fn secure(&self) -> bool {
        self.has(Protocol::Https) || self.has(Protocol::Wss) || self.has(Protocol::Peer)
    }

    /// True if legacy JSON-RPC requests may be served here.
    pub fn serves_rpc(&self) -> bool {
        self.has(Protocol::Http) || self.has(Protocol::Https)
    }

    /// True if both Basic-auth user and password are configured.
    pub fn requires_basic_auth(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }

    /// True if admin credentials are configured.
    pub fn requires_admin_credentials(&self) -> bool {
        !self.admin_user.is_empty() || !self.admin_password.is_empty()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// Comma-separated protocol list, for logging.
    pub fn protocol_list(&self) -> String {
        self.protocols
            .iter()
            .map(Protocol::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}:{} ({})", self.name, self.ip, self.port, self.protocol_list())
    }
}

/// Check `remote` against an allow-list.
pub fn ip_allowed(remote: IpAddr, allowed: &[IpAddr]) -> bool {
    allowed
        .iter()
        .any(|ip| ip.is_unspecified() || *ip == remote)
}
