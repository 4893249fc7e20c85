//! Protocol handoff: decides which engine owns a freshly accepted connection.
//!
//! Decision order:
//! 1. websocket upgrade on a port offering the matching websocket protocol
//!    (`wss` over TLS, `ws` over raw TCP) → the websocket engine
//! 2. port offering `peer` → the overlay, which returns its own handoff
//! 3. otherwise → the legacy JSON-RPC pipeline keeps the connection

use crate::domain::http::{HttpReply, HttpRequest};
use crate::domain::port::{Port, Protocol};
use crate::ports::outbound::{Overlay, Transport};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::trace;

/// Result of a handoff decision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handoff {
    /// Ownership of the connection left the gateway.
    pub moved: bool,
    /// Reply the transport should write before continuing.
    pub response: Option<HttpReply>,
    /// Keep the connection open after `response` is written.
    pub keep_alive: bool,
}

impl Handoff {
    /// The legacy pipeline keeps the connection.
    pub fn legacy() -> Self {
        Self::default()
    }

    /// Another engine owns the connection now.
    pub fn moved() -> Self {
        Self {
            moved: true,
            ..Self::default()
        }
    }

    /// The gateway keeps the connection.
    pub fn is_legacy(&self) -> bool {
        !self.moved && self.response.is_none()
    }
}

/// Routes accepted connections to their protocol engine.
#[derive(Clone)]
pub struct HandoffRouter {
    overlay: Arc<dyn Overlay>,
}

impl HandoffRouter {
    pub fn new(overlay: Arc<dyn Overlay>) -> Self {
        Self { overlay }
    }

    /// Decide who owns the connection.
    pub fn route(
        &self,
        port: &Port,
        transport: Transport,
        request: HttpRequest,
        remote: SocketAddr,
    ) -> Handoff {
        let websocket = if transport.is_tls() {
            Protocol::Wss
        } else {
            Protocol::Ws
        };

        if port.has(websocket) && request.is_websocket_upgrade() {
            trace!(port = %port.name, remote = %remote, "Handing off to websocket engine");
            return Handoff::moved();
        }

        if port.has(Protocol::Peer) {
            trace!(port = %port.name, remote = %remote, "Handing off to overlay");
            return self.overlay.on_handoff(transport, request, remote);
        }

        Handoff::legacy()
    }
}
