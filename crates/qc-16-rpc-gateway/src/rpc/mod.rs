//! Legacy JSON-RPC: request shape, per-request context and the dispatch
//! pipeline.

pub mod context;
pub mod pipeline;
pub mod request;

pub use context::{ForwardedIdentity, RequestContext};
pub use pipeline::{InboundRequest, RpcPipeline};
pub use request::JsonRpcRequest;
