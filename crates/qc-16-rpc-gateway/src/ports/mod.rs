//! Ports (hexagonal architecture) for the RPC gateway.

pub mod outbound;
pub mod session;

pub use outbound::{CommandDispatcher, Consumer, Disposition, Overlay, ResourceManager, Transport};
pub use session::Session;
