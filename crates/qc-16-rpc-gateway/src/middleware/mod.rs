//! Request gates applied before and around dispatch.
//!
//! Order on the legacy path: connection limit (at accept) → Basic auth and
//! role resolution → resource admission → dispatch → charge.

pub mod auth;
pub mod connection_limit;
pub mod metrics;
pub mod resource;

pub use auth::{authorized, constant_time_compare, request_role, BasicAuth};
pub use connection_limit::ConnectionLimiter;
pub use metrics::{Event, RequestTimer, RpcMetrics};
