//! Authorization: HTTP Basic credentials and role resolution.
//!
//! Every credential comparison here goes through [`constant_time_compare`].

use crate::domain::http::HttpRequest;
use crate::domain::port::{ip_allowed, Port};
use crate::domain::role::Role;
use axum::http::header;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use std::net::IpAddr;
use tracing::debug;

/// Credentials carried by an `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasicAuth {
    /// No `Authorization` header
    Absent,
    /// Header present but not decodable as `Basic user:password`
    Malformed,
    Credentials { user: String, password: String },
}

impl BasicAuth {
    /// Extract Basic credentials from the request headers.
    pub fn from_request(request: &HttpRequest) -> Self {
        match request.header(header::AUTHORIZATION) {
            None => BasicAuth::Absent,
            Some(value) => Self::parse(value),
        }
    }

    /// Parse an `Authorization` header value.
    pub fn parse(value: &str) -> Self {
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return BasicAuth::Malformed;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return BasicAuth::Malformed;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return BasicAuth::Malformed;
        };
        match decoded.split_once(':') {
            Some((user, password)) => BasicAuth::Credentials {
                user: user.to_string(),
                password: password.to_string(),
            },
            None => BasicAuth::Malformed,
        }
    }

    /// True if these are exactly the port's configured credentials.
    pub fn matches(&self, port: &Port) -> bool {
        match self {
            BasicAuth::Credentials { user, password } => {
                // Evaluate both so timing does not reveal which one differed.
                let user_ok = constant_time_compare(user, &port.user);
                let password_ok = constant_time_compare(password, &port.password);
                user_ok & password_ok
            }
            _ => false,
        }
    }
}

/// Port-level Basic-auth gate.
///
/// Ports without a configured user and password admit everyone; otherwise the
/// request must carry matching `Authorization: Basic` credentials.
pub fn authorized(port: &Port, request: &HttpRequest) -> bool {
    if !port.requires_basic_auth() {
        return true;
    }
    BasicAuth::from_request(request).matches(port)
}

/// Resolve the role for one request.
///
/// - admin IP allowed and admin credentials (if configured) match → `Admin`
/// - admin credentials supplied but rejected → `Forbid`
/// - command requires `Admin` → `Forbid`
/// - secure-gateway IP with a forwarded user → `Identified`
/// - port requires Basic auth: matching credentials → `User`, else `Forbid`
/// - open port: anonymous caller → `User`; unverifiable credentials → `Guest`
pub fn request_role(
    required: Role,
    port: &Port,
    params: &Map<String, Value>,
    remote: IpAddr,
    user: &str,
    basic: &BasicAuth,
) -> Role {
    if is_admin(port, params, remote) {
        return Role::Admin;
    }

    if offers_admin_credentials(params) {
        debug!(port = %port.name, remote = %remote, "Admin credentials rejected");
        return Role::Forbid;
    }

    if required == Role::Admin {
        return Role::Forbid;
    }

    if is_identified(port, remote, user) {
        return Role::Identified;
    }

    if port.requires_basic_auth() {
        return if basic.matches(port) {
            Role::User
        } else {
            Role::Forbid
        };
    }

    match basic {
        BasicAuth::Absent => Role::User,
        _ => Role::Guest,
    }
}

/// True if the caller may act as administrator on this port.
pub fn is_admin(port: &Port, params: &Map<String, Value>, remote: IpAddr) -> bool {
    if !ip_allowed(remote, &port.admin_ip) {
        return false;
    }

    if !port.requires_admin_credentials() {
        return true;
    }

    let (Some(user), Some(password)) = (
        params.get("admin_user").and_then(Value::as_str),
        params.get("admin_password").and_then(Value::as_str),
    ) else {
        return false;
    };

    let user_ok = constant_time_compare(user, &port.admin_user);
    let password_ok = constant_time_compare(password, &port.admin_password);
    user_ok & password_ok
}

/// True if the caller is a secure gateway forwarding an authenticated user.
pub fn is_identified(port: &Port, remote: IpAddr, user: &str) -> bool {
    !user.is_empty() && ip_allowed(remote, &port.secure_gateway_ip)
}

fn offers_admin_credentials(params: &Map<String, Value>) -> bool {
    params.get("admin_user").is_some() || params.get("admin_password").is_some()
}

/// Constant-time string comparison to prevent timing attacks
///
/// SECURITY: This function takes the same amount of time regardless of how
/// many characters match, preventing timing side-channel attacks.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;

    // Pad both to the longer length so the comparison cost does not depend on
    // where the strings diverge.
    let max_len = std::cmp::max(a.len(), b.len());

    // Different pad bytes guarantee a mismatch when lengths differ
    let mut a_padded = vec![0u8; max_len];
    let mut b_padded = vec![0xFFu8; max_len];

    a_padded[..a.len()].copy_from_slice(a.as_bytes());
    b_padded[..b.len()].copy_from_slice(b.as_bytes());

    let lengths_equal = a.len().ct_eq(&b.len());
    let contents_equal = a_padded.ct_eq(&b_padded);

    (lengths_equal & contents_equal).into()
}
