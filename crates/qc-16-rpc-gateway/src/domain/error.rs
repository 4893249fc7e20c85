//! Gateway error types.
//!
//! Three families:
//! - [`ConfigError`]: raised while building the port list; aborts startup.
//! - [`RpcReject`]: a terminal structural, authorization or admission failure
//!   written straight back to the caller as plain text.
//! - [`GatewayError`]: service-level failures (bind, shutdown, internal).

use axum::http::StatusCode;
use std::fmt;

/// Configuration errors detected at setup time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No port sections were configured
    #[error("required section [server] is missing or empty")]
    MissingServerSection,
    /// A port section lacks a required field
    #[error("missing '{field}' in [{port}]")]
    MissingField { port: String, field: &'static str },
    /// Port number is zero
    #[error("port {value} in [{port}] is invalid")]
    InvalidPort { port: String, value: u16 },
    /// Websocket protocols mixed with peer/http/https
    #[error("invalid protocol combination in [{0}]")]
    InvalidProtocolCombination(String),
    /// Two sections share a name
    #[error("duplicate port section [{0}]")]
    DuplicatePort(String),
    /// More than one port offers the peer protocol
    #[error("more than one peer protocol configured in [server]")]
    MultiplePeerPorts,
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout or window
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
}

/// Terminal rejection of a legacy RPC request.
///
/// The reason text is part of the wire contract: clients match on it, so the
/// constructors below are the only way to build one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcReject {
    status: StatusCode,
    reason: &'static str,
}

impl RpcReject {
    pub fn unable_to_parse() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Unable to parse request")
    }

    pub fn null_method() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Null method")
    }

    pub fn method_not_string() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "method is not string")
    }

    pub fn params_unparseable() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "params unparseable")
    }

    pub fn method_empty() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "method is empty")
    }

    /// Deliberately generic: never says which check failed.
    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden")
    }

    pub fn overloaded() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Server is overloaded")
    }

    pub fn shutting_down() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down")
    }

    fn new(status: StatusCode, reason: &'static str) -> Self {
        Self { status, reason }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &'static str {
        self.reason
    }

    pub fn kind(&self) -> RejectKind {
        if self.status == StatusCode::FORBIDDEN {
            RejectKind::Authorization
        } else if self.status == StatusCode::SERVICE_UNAVAILABLE {
            RejectKind::Admission
        } else {
            RejectKind::Structural
        }
    }
}

impl fmt::Display for RpcReject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status.as_u16(), self.reason)
    }
}

impl std::error::Error for RpcReject {}

/// Rejection class, for metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    Structural,
    Authorization,
    Admission,
}

/// Service-level errors (not sent to RPC callers)
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// Port cannot be served by this transport
    #[error("port [{0}] cannot be served: {1}")]
    Unservable(String, &'static str),

    /// Shutdown in progress
    #[error("shutdown in progress")]
    ShuttingDown,

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for service operations
pub type GatewayResult<T> = Result<T, GatewayError>;
