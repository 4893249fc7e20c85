//! HTTP request/reply values seen by the gateway.
//!
//! Socket reading and header parsing happen in the transport; the gateway
//! only inspects the parsed request and produces replies.

use crate::domain::error::RpcReject;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode, Version};
use bytes::Bytes;

/// Server token sent on every reply.
pub const SERVER_NAME: &str = concat!("qc-json-rpc/", env!("CARGO_PKG_VERSION"));

/// A parsed inbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpRequest {
    /// `POST / HTTP/1.1` with the given body and no headers.
    pub fn post(body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::POST,
            target: "/".to_string(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Builder-style header insertion. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Value of a header as text, if present and valid UTF-8.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of a header, or empty when absent.
    pub fn header_or_empty(&self, name: impl header::AsHeaderName) -> String {
        self.header(name).map(str::to_string).unwrap_or_default()
    }

    /// Persistent-connection semantics.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close`; HTTP/1.0
    /// requires an explicit `Connection: keep-alive`.
    pub fn keep_alive(&self) -> bool {
        let has_token = |token: &str| self.connection_has(token);
        if self.version == Version::HTTP_10 || self.version == Version::HTTP_09 {
            has_token("keep-alive")
        } else {
            !has_token("close")
        }
    }

    /// True if the request asks for a protocol upgrade.
    pub fn upgrade(&self) -> bool {
        self.connection_has("upgrade") && self.headers.contains_key(header::UPGRADE)
    }

    /// True if the request is a websocket upgrade.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.upgrade()
            && self
                .header(header::UPGRADE)
                .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
                .unwrap_or(false)
    }

    fn connection_has(&self, token: &str) -> bool {
        self.headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }
}

/// A reply written back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Render as an HTTP/1.1 response for byte-oriented transports.
    pub fn encode(&self, keep_alive: bool) -> Vec<u8> {
        let reason = self.status.canonical_reason().unwrap_or("Unknown");
        let connection = if keep_alive { "Keep-Alive" } else { "close" };
        let mut out = format!(
            "HTTP/1.1 {} {}\r\n\
             Server: {}\r\n\
             Connection: {}\r\n\
             Content-Type: application/json; charset=UTF-8\r\n\
             Content-Length: {}\r\n\r\n",
            self.status.as_u16(),
            reason,
            SERVER_NAME,
            connection,
            self.body.len()
        )
        .into_bytes();
        out.extend_from_slice(self.body.as_bytes());
        out
    }
}

impl From<RpcReject> for HttpReply {
    fn from(reject: RpcReject) -> Self {
        Self::new(reject.status(), reject.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_alive_http11_default() {
        let req = HttpRequest::post("{}");
        assert!(req.keep_alive());
        let req = req.with_header("connection", "close");
        assert!(!req.keep_alive());
    }

    #[test]
    fn test_keep_alive_http10_needs_token() {
        let req = HttpRequest::post("{}").with_version(Version::HTTP_10);
        assert!(!req.keep_alive());
        let req = req.with_header("connection", "Keep-Alive");
        assert!(req.keep_alive());
    }

    #[test]
    fn test_websocket_upgrade_detection() {
        let req = HttpRequest::post("")
            .with_header("connection", "keep-alive, Upgrade")
            .with_header("upgrade", "WebSocket");
        assert!(req.upgrade());
        assert!(req.is_websocket_upgrade());
    }

    #[test]
    fn test_upgrade_to_other_protocol_is_not_websocket() {
        let req = HttpRequest::post("")
            .with_header("connection", "upgrade")
            .with_header("upgrade", "h2c");
        assert!(req.upgrade());
        assert!(!req.is_websocket_upgrade());
    }

    #[test]
    fn test_upgrade_header_without_connection_token() {
        let req = HttpRequest::post("").with_header("upgrade", "websocket");
        assert!(!req.is_websocket_upgrade());
    }

    #[test]
    fn test_encode_reply() {
        let reply = HttpReply::new(StatusCode::FORBIDDEN, "Forbidden");
        let text = String::from_utf8(reply.encode(false)).unwrap();
        assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
        assert!(text.contains("Content-Length: 9\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nForbidden"));
    }
}
