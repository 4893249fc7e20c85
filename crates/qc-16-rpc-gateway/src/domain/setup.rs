//! Port list construction.
//!
//! Turns the `[server]` configuration surface (a common section plus one
//! section per named port) into validated [`Port`]s, then derives the client
//! and overlay endpoints from the result. Any error here aborts startup.

use crate::domain::error::ConfigError;
use crate::domain::port::{Port, Protocol, TlsContext};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, warn};

/// One port section as it appears in configuration. Every field is optional
/// so the common section can supply defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSection {
    pub name: Option<String>,
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub protocol: Option<BTreeSet<Protocol>>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub admin_user: Option<String>,
    pub admin_password: Option<String>,
    pub admin_ip: Option<Vec<IpAddr>>,
    pub secure_gateway_ip: Option<Vec<IpAddr>>,
    pub limit: Option<usize>,
    pub ssl_key: Option<String>,
    pub ssl_cert: Option<String>,
    pub ssl_chain: Option<String>,
}

impl PortSection {
    /// Fill every unset field from `common`.
    pub fn merged_over(self, common: &PortSection) -> PortSection {
        PortSection {
            name: self.name.or_else(|| common.name.clone()),
            ip: self.ip.or(common.ip),
            port: self.port.or(common.port),
            protocol: self.protocol.or_else(|| common.protocol.clone()),
            user: self.user.or_else(|| common.user.clone()),
            password: self.password.or_else(|| common.password.clone()),
            admin_user: self.admin_user.or_else(|| common.admin_user.clone()),
            admin_password: self.admin_password.or_else(|| common.admin_password.clone()),
            admin_ip: self.admin_ip.or_else(|| common.admin_ip.clone()),
            secure_gateway_ip: self
                .secure_gateway_ip
                .or_else(|| common.secure_gateway_ip.clone()),
            limit: self.limit.or(common.limit),
            ssl_key: self.ssl_key.or_else(|| common.ssl_key.clone()),
            ssl_cert: self.ssl_cert.or_else(|| common.ssl_cert.clone()),
            ssl_chain: self.ssl_chain.or_else(|| common.ssl_chain.clone()),
        }
    }
}

/// The `[server]` configuration surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Defaults applied to every port section
    pub common: PortSection,
    /// Port sections in declaration order
    pub ports: Vec<PortSection>,
}

/// Endpoint local clients use to reach the RPC server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSetup {
    pub secure: bool,
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub admin_user: String,
    pub admin_password: String,
}

/// Endpoint the peer overlay listens on. Port 0 means no peer port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlaySetup {
    pub ip: IpAddr,
    pub port: u16,
}

impl Default for OverlaySetup {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
        }
    }
}

/// Validated server setup.
#[derive(Debug, Clone)]
pub struct Setup {
    pub ports: Vec<Arc<Port>>,
    pub client: Option<ClientSetup>,
    pub overlay: OverlaySetup,
}

impl Setup {
    /// Build the setup from configuration.
    ///
    /// In standalone mode the `peer` protocol is stripped from every port (and
    /// ports left without protocols are dropped); otherwise at most one port
    /// may offer `peer`.
    pub fn from_config(server: &ServerSection, standalone: bool) -> Result<Self, ConfigError> {
        let mut ports = parse_ports(server, standalone)?;
        for port in &mut ports {
            port.context = tls_context(port);
        }

        let client = setup_client(&ports);
        let overlay = setup_overlay(&ports);

        Ok(Self {
            ports: ports.into_iter().map(Arc::new).collect(),
            client,
            overlay,
        })
    }

    /// Look up a port by name.
    pub fn port(&self, name: &str) -> Option<&Arc<Port>> {
        self.ports.iter().find(|p| p.name == name)
    }
}

/// Convert one merged section into a port.
pub fn to_port(parsed: PortSection) -> Result<Port, ConfigError> {
    let name = parsed.name.unwrap_or_default();

    let ip = parsed.ip.ok_or_else(|| ConfigError::MissingField {
        port: name.clone(),
        field: "ip",
    })?;

    let number = parsed.port.ok_or_else(|| ConfigError::MissingField {
        port: name.clone(),
        field: "port",
    })?;
    if number == 0 {
        return Err(ConfigError::InvalidPort {
            port: name,
            value: number,
        });
    }

    let protocols = parsed.protocol.unwrap_or_default();
    if protocols.is_empty() {
        return Err(ConfigError::MissingField {
            port: name,
            field: "protocol",
        });
    }

    let websockets = protocols.contains(&Protocol::Ws) || protocols.contains(&Protocol::Wss);
    let others = protocols.contains(&Protocol::Peer)
        || protocols.contains(&Protocol::Http)
        || protocols.contains(&Protocol::Https);
    if websockets && others {
        return Err(ConfigError::InvalidProtocolCombination(name));
    }
    // Peer connections are always TLS; a plain-text listener cannot share the socket.
    if protocols.contains(&Protocol::Peer) && protocols.contains(&Protocol::Http) {
        return Err(ConfigError::InvalidProtocolCombination(name));
    }

    let mut port = Port::new(name, ip, number, protocols);
    port.user = parsed.user.unwrap_or_default();
    port.password = parsed.password.unwrap_or_default();
    port.admin_user = parsed.admin_user.unwrap_or_default();
    port.admin_password = parsed.admin_password.unwrap_or_default();
    port.admin_ip = parsed.admin_ip.unwrap_or_default();
    port.secure_gateway_ip = parsed.secure_gateway_ip.unwrap_or_default();
    port.limit = parsed.limit.unwrap_or(0);
    port.ssl_key = parsed.ssl_key.unwrap_or_default();
    port.ssl_cert = parsed.ssl_cert.unwrap_or_default();
    port.ssl_chain = parsed.ssl_chain.unwrap_or_default();
    Ok(port)
}

fn parse_ports(server: &ServerSection, standalone: bool) -> Result<Vec<Port>, ConfigError> {
    if server.ports.is_empty() {
        return Err(ConfigError::MissingServerSection);
    }

    let mut seen = HashSet::new();
    let mut result = Vec::with_capacity(server.ports.len());
    for section in &server.ports {
        let name = section.name.clone().ok_or_else(|| ConfigError::MissingField {
            port: String::new(),
            field: "name",
        })?;
        if !seen.insert(name.clone()) {
            return Err(ConfigError::DuplicatePort(name));
        }
        let port = to_port(section.clone().merged_over(&server.common))?;
        debug!(port = %port, "Configured port");
        result.push(port);
    }

    if standalone {
        result.retain_mut(|port| {
            if port.protocols.remove(&Protocol::Peer) && port.protocols.is_empty() {
                debug!(port = %port.name, "Dropping peer-only port in standalone mode");
                false
            } else {
                true
            }
        });
    } else {
        let peers = result.iter().filter(|p| p.has(Protocol::Peer)).count();
        if peers > 1 {
            return Err(ConfigError::MultiplePeerPorts);
        }
        if peers == 0 {
            warn!("No peer protocol configured");
        }
    }

    Ok(result)
}

fn tls_context(port: &Port) -> TlsContext {
    if !port.secure() {
        TlsContext::Plain
    } else if port.ssl_key.is_empty() && port.ssl_cert.is_empty() && port.ssl_chain.is_empty() {
        TlsContext::Anonymous
    } else {
        TlsContext::Authed {
            key: port.ssl_key.clone(),
            cert: port.ssl_cert.clone(),
            chain: port.ssl_chain.clone(),
        }
    }
}

fn setup_client(ports: &[Port]) -> Option<ClientSetup> {
    let port = ports.iter().find(|p| p.serves_rpc())?;
    let ip = if port.ip.is_unspecified() && port.ip.is_ipv4() {
        Ipv4Addr::LOCALHOST.to_string()
    } else {
        port.ip.to_string()
    };
    Some(ClientSetup {
        secure: port.has(Protocol::Https),
        ip,
        port: port.port,
        user: port.user.clone(),
        password: port.password.clone(),
        admin_user: port.admin_user.clone(),
        admin_password: port.admin_password.clone(),
    })
}

fn setup_overlay(ports: &[Port]) -> OverlaySetup {
    ports
        .iter()
        .find(|p| p.has(Protocol::Peer))
        .map(|p| OverlaySetup {
            ip: p.ip,
            port: p.port,
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, port: u16, protocols: &[Protocol]) -> PortSection {
        PortSection {
            name: Some(name.to_string()),
            port: Some(port),
            protocol: Some(protocols.iter().copied().collect()),
            ..Default::default()
        }
    }

    fn server(ports: Vec<PortSection>) -> ServerSection {
        ServerSection {
            common: PortSection {
                ip: Some("0.0.0.0".parse().unwrap()),
                ..Default::default()
            },
            ports,
        }
    }

    #[test]
    fn test_common_section_supplies_defaults() {
        let setup = Setup::from_config(
            &server(vec![
                section("port_rpc", 5005, &[Protocol::Http]),
                section("port_peer", 51235, &[Protocol::Peer]),
            ]),
            false,
        )
        .unwrap();
        assert_eq!(setup.ports.len(), 2);
        assert!(setup.ports.iter().all(|p| p.ip.is_unspecified()));
    }

    #[test]
    fn test_explicit_values_override_common() {
        let mut rpc = section("port_rpc", 5005, &[Protocol::Http]);
        rpc.ip = Some("127.0.0.1".parse().unwrap());
        let mut cfg = server(vec![rpc]);
        cfg.common.limit = Some(8);
        let setup = Setup::from_config(&cfg, true).unwrap();
        let port = setup.port("port_rpc").unwrap();
        assert_eq!(port.ip.to_string(), "127.0.0.1");
        assert_eq!(port.limit, 8);
    }

    #[test]
    fn test_protocol_combinations() {
        let ok = Setup::from_config(
            &server(vec![section("p", 51235, &[Protocol::Peer, Protocol::Https])]),
            false,
        );
        assert!(ok.is_ok());

        let err = Setup::from_config(
            &server(vec![section("p", 51235, &[Protocol::Peer, Protocol::Http])]),
            false,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidProtocolCombination("p".into()));

        let err = Setup::from_config(
            &server(vec![section("w", 6006, &[Protocol::Ws, Protocol::Http])]),
            false,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::InvalidProtocolCombination("w".into()));
    }

    #[test]
    fn test_ws_with_peer_rejected() {
        let err = Setup::from_config(
            &server(vec![section("w", 6006, &[Protocol::Wss, Protocol::Peer])]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProtocolCombination(_)));
    }

    #[test]
    fn test_missing_fields() {
        let mut no_ip = server(vec![section("a", 1, &[Protocol::Http])]);
        no_ip.common.ip = None;
        assert_eq!(
            Setup::from_config(&no_ip, false).unwrap_err(),
            ConfigError::MissingField {
                port: "a".into(),
                field: "ip"
            }
        );

        let mut no_port = section("b", 1, &[Protocol::Http]);
        no_port.port = None;
        assert!(matches!(
            Setup::from_config(&server(vec![no_port]), false),
            Err(ConfigError::MissingField { field: "port", .. })
        ));

        let no_proto = section("c", 1, &[]);
        assert!(matches!(
            Setup::from_config(&server(vec![no_proto]), false),
            Err(ConfigError::MissingField {
                field: "protocol",
                ..
            })
        ));
    }

    #[test]
    fn test_zero_port_rejected() {
        assert!(matches!(
            Setup::from_config(&server(vec![section("z", 0, &[Protocol::Http])]), false),
            Err(ConfigError::InvalidPort { value: 0, .. })
        ));
    }

    #[test]
    fn test_empty_server_section() {
        assert_eq!(
            Setup::from_config(&ServerSection::default(), false).unwrap_err(),
            ConfigError::MissingServerSection
        );
    }

    #[test]
    fn test_duplicate_names() {
        let cfg = server(vec![
            section("a", 1, &[Protocol::Http]),
            section("a", 2, &[Protocol::Http]),
        ]);
        assert_eq!(
            Setup::from_config(&cfg, false).unwrap_err(),
            ConfigError::DuplicatePort("a".into())
        );
    }

    #[test]
    fn test_multiple_peer_ports_rejected() {
        let cfg = server(vec![
            section("a", 1, &[Protocol::Peer]),
            section("b", 2, &[Protocol::Peer]),
        ]);
        assert_eq!(
            Setup::from_config(&cfg, false).unwrap_err(),
            ConfigError::MultiplePeerPorts
        );
    }

    #[test]
    fn test_standalone_strips_peer() {
        let cfg = server(vec![
            section("peer_only", 1, &[Protocol::Peer]),
            section("mixed", 2, &[Protocol::Peer, Protocol::Https]),
            section("other_peer", 3, &[Protocol::Peer]),
        ]);
        let setup = Setup::from_config(&cfg, true).unwrap();
        assert_eq!(setup.ports.len(), 1);
        let mixed = setup.port("mixed").unwrap();
        assert!(!mixed.has(Protocol::Peer));
        assert!(mixed.has(Protocol::Https));
        assert_eq!(setup.overlay.port, 0);
    }

    #[test]
    fn test_client_and_overlay_derivation() {
        let mut rpc = section("rpc", 5005, &[Protocol::Https]);
        rpc.user = Some("u".into());
        rpc.password = Some("p".into());
        let cfg = server(vec![
            section("ws", 6006, &[Protocol::Ws]),
            rpc,
            section("peer", 51235, &[Protocol::Peer]),
        ]);
        let setup = Setup::from_config(&cfg, false).unwrap();

        let client = setup.client.unwrap();
        assert!(client.secure);
        assert_eq!(client.ip, "127.0.0.1");
        assert_eq!(client.port, 5005);
        assert_eq!(client.user, "u");

        assert_eq!(setup.overlay.port, 51235);
    }

    #[test]
    fn test_no_client_port() {
        let cfg = server(vec![section("peer", 51235, &[Protocol::Peer])]);
        let setup = Setup::from_config(&cfg, false).unwrap();
        assert!(setup.client.is_none());
    }

    #[test]
    fn test_tls_contexts() {
        let mut authed = section("authed", 2, &[Protocol::Https]);
        authed.ssl_cert = Some("/etc/cert.pem".into());
        let cfg = server(vec![
            section("plain", 1, &[Protocol::Http]),
            authed,
            section("anon", 3, &[Protocol::Wss]),
        ]);
        let setup = Setup::from_config(&cfg, true).unwrap();
        assert_eq!(setup.port("plain").unwrap().context, TlsContext::Plain);
        assert_eq!(setup.port("anon").unwrap().context, TlsContext::Anonymous);
        assert!(matches!(
            setup.port("authed").unwrap().context,
            TlsContext::Authed { .. }
        ));
    }

    #[test]
    fn test_section_deserializes_from_json() {
        let json = serde_json::json!({
            "common": { "ip": "0.0.0.0" },
            "ports": [
                { "name": "port_rpc", "port": 5005, "protocol": ["http"], "limit": 100 }
            ]
        });
        let server: ServerSection = serde_json::from_value(json).unwrap();
        let setup = Setup::from_config(&server, true).unwrap();
        assert_eq!(setup.ports[0].limit, 100);
    }
}
