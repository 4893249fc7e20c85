//! Adapters for the RPC gateway.
//!
//! Infrastructure implementations of the ports: an in-memory resource
//! manager, a buffered session and the axum HTTP transport.

pub mod http;
pub mod resource_manager;
pub mod session;

pub use http::{admin_router, legacy_router};
pub use resource_manager::{cleanup_task, InMemoryConsumer, InMemoryResourceManager};
pub use session::{BufferedSession, Outcome};
