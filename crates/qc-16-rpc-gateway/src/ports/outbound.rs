//! Outbound ports for the RPC gateway.
//!
//! Collaborators the gateway drives but does not own: the peer overlay, the
//! resource manager and the command dispatcher.

use crate::domain::fees::Charge;
use crate::domain::http::HttpRequest;
use crate::domain::role::Role;
use crate::handoff::Handoff;
use crate::rpc::context::RequestContext;
use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// A connection's transport, opaque to the gateway.
///
/// Handed whole to whichever engine takes ownership of the connection.
pub enum Transport {
    /// TLS already negotiated
    Tls(Box<dyn Any + Send>),
    /// Raw TCP
    Plain(Box<dyn Any + Send>),
}

impl Transport {
    pub fn is_tls(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tls(_) => f.write_str("Transport::Tls"),
            Transport::Plain(_) => f.write_str("Transport::Plain"),
        }
    }
}

/// Peer-to-peer overlay that accepts handed-off connections.
pub trait Overlay: Send + Sync {
    fn on_handoff(&self, transport: Transport, request: HttpRequest, remote: SocketAddr)
        -> Handoff;
}

/// Outcome of charging a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ok,
    /// Balance crossed the warning threshold
    Warn,
    /// Balance crossed the drop threshold
    Drop,
}

/// Cost-accounting handle for one caller identity.
pub trait Consumer: Send + Sync {
    /// True if the caller is over its limit and must be turned away.
    fn disconnect(&self) -> bool;
    /// Add `fee` to the caller's balance.
    fn charge(&self, fee: Charge) -> Disposition;
    fn is_unlimited(&self) -> bool;
    /// Human-readable identity, for logs.
    fn label(&self) -> String;
}

/// Registry of resource consumers. Internally synchronized.
pub trait ResourceManager: Send + Sync {
    /// Metered consumer keyed by the caller's address.
    fn new_inbound_endpoint(&self, address: IpAddr) -> Arc<dyn Consumer>;
    /// Consumer whose cost is never checked; `label` is for logging only.
    fn new_unlimited_endpoint(&self, label: &str) -> Arc<dyn Consumer>;
}

/// Executes individual RPC commands.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    /// Minimum role a command needs, or `None` if no such command exists.
    fn required_role(&self, command: &str) -> Option<Role>;

    /// Run the command named by `context.params["command"]`.
    ///
    /// The returned object carries an `error` field on failure. The command
    /// may raise `context.load_type` to charge more than the reference fee.
    async fn do_command(&self, context: &mut RequestContext) -> serde_json::Value;
}
