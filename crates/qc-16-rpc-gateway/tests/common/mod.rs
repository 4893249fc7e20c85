//! Shared fakes for the gateway integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use qc_16_rpc_gateway::domain::fees::FEE_HIGH_BURDEN_RPC;
use qc_16_rpc_gateway::domain::setup::{PortSection, ServerSection};
use qc_16_rpc_gateway::{
    BufferedSession, Charge, CommandDispatcher, Consumer, Disposition, GatewayConfig, Handoff,
    HttpRequest, Overlay, Protocol, RequestContext, ResourceManager, Role, ServerHandler,
};
use qc_16_rpc_gateway::ports::outbound::Transport;
use qc_16_rpc_gateway::rpc::ForwardedIdentity;
use serde_json::{json, Map, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// =============================================================================
// RESOURCE LEDGER
// =============================================================================

#[derive(Default)]
struct LedgerState {
    charges: Mutex<Vec<(String, Charge)>>,
    inbound: Mutex<Vec<IpAddr>>,
    unlimited: Mutex<Vec<String>>,
    over_limit: AtomicBool,
}

/// Resource manager that records every lookup and charge.
#[derive(Clone, Default)]
pub struct Ledger {
    state: Arc<LedgerState>,
}

impl Ledger {
    pub fn set_over_limit(&self, over: bool) {
        self.state.over_limit.store(over, Ordering::SeqCst);
    }

    pub fn charges(&self) -> Vec<(String, Charge)> {
        self.state.charges.lock().clone()
    }

    pub fn inbound(&self) -> Vec<IpAddr> {
        self.state.inbound.lock().clone()
    }

    pub fn unlimited(&self) -> Vec<String> {
        self.state.unlimited.lock().clone()
    }
}

struct LedgerConsumer {
    label: String,
    unlimited: bool,
    state: Arc<LedgerState>,
}

impl Consumer for LedgerConsumer {
    fn disconnect(&self) -> bool {
        !self.unlimited && self.state.over_limit.load(Ordering::SeqCst)
    }

    fn charge(&self, fee: Charge) -> Disposition {
        self.state.charges.lock().push((self.label.clone(), fee));
        Disposition::Ok
    }

    fn is_unlimited(&self) -> bool {
        self.unlimited
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

impl ResourceManager for Ledger {
    fn new_inbound_endpoint(&self, address: IpAddr) -> Arc<dyn Consumer> {
        self.state.inbound.lock().push(address);
        Arc::new(LedgerConsumer {
            label: address.to_string(),
            unlimited: false,
            state: Arc::clone(&self.state),
        })
    }

    fn new_unlimited_endpoint(&self, label: &str) -> Arc<dyn Consumer> {
        self.state.unlimited.lock().push(label.to_string());
        Arc::new(LedgerConsumer {
            label: label.to_string(),
            unlimited: true,
            state: Arc::clone(&self.state),
        })
    }
}

// =============================================================================
// COMMAND DISPATCHER
// =============================================================================

/// What a command observed when it ran.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub params: Map<String, Value>,
    pub role: Role,
    pub identity: ForwardedIdentity,
}

/// Dispatcher with a few canned commands:
/// - `ping` → `{"pong": true}`
/// - `fail` → an `error` object
/// - `heavy` → success, charged at the high-burden fee
/// - `scalar` → a non-object result
#[derive(Clone, Default)]
pub struct Commands {
    seen: Arc<Mutex<Vec<Dispatched>>>,
}

impl Commands {
    pub fn seen(&self) -> Vec<Dispatched> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl CommandDispatcher for Commands {
    fn required_role(&self, command: &str) -> Option<Role> {
        match command {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    async fn do_command(&self, context: &mut RequestContext) -> Value {
        self.seen.lock().push(Dispatched {
            params: context.params.clone(),
            role: context.role,
            identity: context.identity.clone(),
        });

        match context.command() {
            "fail" => json!({
                "error": "invalidParams",
                "error_code": 31,
                "error_message": "Invalid parameters."
            }),
            "heavy" => {
                context.load_type = FEE_HIGH_BURDEN_RPC;
                json!({ "rows": 1000 })
            }
            "scalar" => json!(42),
            "explode" => panic!("command blew up"),
            _ => json!({ "pong": true }),
        }
    }
}

// =============================================================================
// OVERLAY
// =============================================================================

/// Overlay that takes every connection offered to it.
#[derive(Clone, Default)]
pub struct Peers {
    taken: Arc<Mutex<Vec<(bool, SocketAddr)>>>,
}

impl Peers {
    pub fn taken(&self) -> Vec<(bool, SocketAddr)> {
        self.taken.lock().clone()
    }
}

impl Overlay for Peers {
    fn on_handoff(&self, transport: Transport, _: HttpRequest, remote: SocketAddr) -> Handoff {
        self.taken.lock().push((transport.is_tls(), remote));
        Handoff::moved()
    }
}

// =============================================================================
// HANDLER CONSTRUCTION
// =============================================================================

pub struct Harness {
    pub handler: Arc<ServerHandler>,
    pub ledger: Ledger,
    pub commands: Commands,
    pub peers: Peers,
}

pub fn port_section(name: &str, number: u16, protocols: &[Protocol]) -> PortSection {
    PortSection {
        name: Some(name.to_string()),
        ip: Some("127.0.0.1".parse().unwrap()),
        port: Some(number),
        protocol: Some(protocols.iter().copied().collect()),
        ..PortSection::default()
    }
}

pub fn config(ports: Vec<PortSection>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.server = ServerSection {
        common: PortSection::default(),
        ports,
    };
    config.standalone = true;
    config
}

pub fn harness(config: GatewayConfig) -> Harness {
    let ledger = Ledger::default();
    let commands = Commands::default();
    let peers = Peers::default();
    let handler = ServerHandler::new(
        config,
        Arc::new(peers.clone()),
        Arc::new(ledger.clone()),
        Arc::new(commands.clone()),
    )
    .expect("valid config");
    Harness {
        handler: Arc::new(handler),
        ledger,
        commands,
        peers,
    }
}

/// One plain `http` port named `rpc`.
pub fn rpc_harness() -> Harness {
    harness(config(vec![port_section("rpc", 5005, &[Protocol::Http])]))
}

pub fn remote() -> SocketAddr {
    "198.51.100.7:51234".parse().unwrap()
}

pub fn session(harness: &Harness, port: &str, request: HttpRequest) -> Arc<BufferedSession> {
    let port = Arc::clone(harness.handler.setup().port(port).expect("configured port"));
    BufferedSession::new(port, remote(), request)
}
