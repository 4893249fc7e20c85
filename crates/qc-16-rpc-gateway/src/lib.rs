// Allow missing docs for internal items in development
#![allow(missing_docs)]

//! QC-16 RPC Gateway - Front door of the node's client-facing ports.
//!
//! Admits connections per port, decides whether a connection is handed to
//! the peer overlay, upgraded to a WebSocket or kept on the legacy HTTP
//! JSON-RPC path, and runs legacy requests through authorization, resource
//! accounting and command dispatch.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                           RPC GATEWAY (qc-16)                                │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐                         │
//! │  │  http/https │  │   ws/wss    │  │  peer (TLS) │                         │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘                         │
//! │         │                │                │                                 │
//! │  ┌──────┴────────────────┴────────────────┴──────┐                         │
//! │  │      ServerHandler: accept → handoff          │                         │
//! │  │   (connection limit, Overlay delegation)      │                         │
//! │  └────────────────────┬───────────────────────────┘                         │
//! │                       │ legacy HTTP                                         │
//! │  ┌────────────────────┴───────────────────────┐                            │
//! │  │        JobQueue (clientRPC coroutine)      │                            │
//! │  └────────────────────┬───────────────────────┘                            │
//! │                       │                                                     │
//! │  ┌────────────────────┴───────────────────────┐                            │
//! │  │  RpcPipeline: parse → role → admit →       │                            │
//! │  │  dispatch → echo → charge → reply          │                            │
//! │  └────────────────────┬───────────────────────┘                            │
//! └───────────────────────┼─────────────────────────────────────────────────────┘
//!                         │
//!     ┌───────────────────┼───────────────────────┐
//!     ▼                   ▼                       ▼
//! CommandDispatcher  ResourceManager          Overlay
//! ```
//!
//! # Roles
//!
//! - **Admin**: admin IP and matching admin credentials (if configured)
//! - **Identified**: request from a configured secure gateway
//! - **User**: Basic auth passed, or no credentials on an open port
//! - **Guest**: anything else; **Forbid** rejects with 403
//!
//! # Usage
//!
//! ```ignore
//! use qc_16_rpc_gateway::{GatewayConfig, ServerHandler};
//!
//! let handler = Arc::new(ServerHandler::new(config, overlay, resources, dispatcher)?);
//! tokio::spawn(Arc::clone(&handler).serve_port("rpc"));
//! handler.shutdown().await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod handoff;
pub mod middleware;
pub mod ports;
pub mod rpc;
pub mod scheduler;
pub mod service;
pub mod telemetry;

// Re-exports for public API
pub use adapters::{BufferedSession, InMemoryResourceManager, Outcome};
pub use domain::config::GatewayConfig;
pub use domain::error::{GatewayError, GatewayResult, RpcReject};
pub use domain::{Charge, HttpReply, HttpRequest, Port, Protocol, Role, Setup};
pub use handoff::{Handoff, HandoffRouter};
pub use middleware::RpcMetrics;
pub use ports::{CommandDispatcher, Consumer, Disposition, Overlay, ResourceManager, Session};
pub use rpc::{RequestContext, RpcPipeline};
pub use scheduler::{JobCoro, JobQueue, JobType};
pub use service::ServerHandler;
pub use telemetry::{init_tracing, TelemetryError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
