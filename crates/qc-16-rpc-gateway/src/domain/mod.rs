//! Domain types for the RPC gateway.
//!
//! Pure values: ports and their setup, roles, fees, HTTP request/reply
//! shapes, configuration and errors. Nothing here touches sockets or tasks.

pub mod config;
pub mod error;
pub mod fees;
pub mod http;
pub mod job_id;
pub mod port;
pub mod role;
pub mod setup;

// Re-exports for convenience
pub use config::{GatewayConfig, JobQueueConfig, ResourceConfig, RpcConfig, TelemetryConfig};
pub use error::{ConfigError, GatewayError, GatewayResult, RejectKind, RpcReject};
pub use fees::Charge;
pub use http::{HttpReply, HttpRequest};
pub use job_id::JobId;
pub use port::{ip_allowed, Port, Protocol, TlsContext};
pub use role::Role;
pub use setup::{ClientSetup, OverlaySetup, PortSection, ServerSection, Setup};
