//! Axum transport for plain `http` ports.
//!
//! Each request is treated as one connection: it is admitted through the
//! port's connection limit, wrapped in a [`BufferedSession`], run through
//! [`ServerHandler::on_request`] and released when the reply is built. Only
//! plain `http` ports are served here, so every connection stays on the
//! legacy path and no handoff decision is needed.

use crate::adapters::session::{BufferedSession, Outcome};
use crate::domain::http::{HttpReply, HttpRequest, SERVER_NAME};
use crate::domain::port::Port;
use crate::service::ServerHandler;
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, trace};

#[derive(Clone)]
struct LegacyState {
    handler: Arc<ServerHandler>,
    port: Arc<Port>,
}

/// Router serving the legacy JSON-RPC endpoint for `port`.
///
/// Needs `ConnectInfo<SocketAddr>`; serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn legacy_router(handler: Arc<ServerHandler>, port: Arc<Port>) -> Router {
    Router::new()
        .route("/", post(handle_legacy))
        .layer(TraceLayer::new_for_http())
        .with_state(LegacyState { handler, port })
}

/// Router exposing health and metrics for operators.
pub fn admin_router(handler: Arc<ServerHandler>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/metrics",
            get(move || {
                let handler = Arc::clone(&handler);
                async move {
                    let jobs = handler.jobs().stats();
                    Json(serde_json::json!({
                        "rpc": handler.metrics().to_json(),
                        "jobs": {
                            "outstanding": handler.jobs().outstanding(),
                            "posted": jobs.posted.load(std::sync::atomic::Ordering::Relaxed),
                            "finished": jobs.finished.load(std::sync::atomic::Ordering::Relaxed),
                            "refused": jobs.refused.load(std::sync::atomic::Ordering::Relaxed),
                        },
                    }))
                }
            }),
        )
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Releases the connection slot even if the client goes away mid-request.
struct ConnectionGuard {
    handler: Arc<ServerHandler>,
    port: Arc<Port>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.handler.on_close(&self.port);
    }
}

async fn handle_legacy(
    State(state): State<LegacyState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let LegacyState { handler, port } = state;

    if !handler.on_accept(&port, remote) {
        return (StatusCode::SERVICE_UNAVAILABLE, [(header::CONNECTION, "close")]).into_response();
    }
    let _guard = ConnectionGuard {
        handler: Arc::clone(&handler),
        port: Arc::clone(&port),
    };

    let (parts, body) = request.into_parts();
    // Read one byte past the limit so an oversized body reaches the parser
    // and gets its usual rejection. An unreadable body goes through as empty
    // so the port gates still answer first.
    let limit = handler.max_request_size().saturating_add(1);
    let (body, unread) = match to_bytes(body, limit).await {
        Ok(body) => (body, false),
        Err(e) => {
            debug!(remote = %remote, error = %e, "Request body unreadable or too large");
            (Bytes::new(), true)
        }
    };

    let request = HttpRequest {
        method: parts.method,
        target: parts.uri.to_string(),
        version: parts.version,
        headers: parts.headers,
        body,
    };

    let session = BufferedSession::new(Arc::clone(&port), remote, request);
    handler.on_request(session.clone());
    let mut outcome = session.finished().await;
    trace!(remote = %remote, outcome = ?outcome, "Session finished");
    if unread {
        outcome = Outcome::Closed { graceful: true };
    }

    let reply = session.reply().unwrap_or_else(|| {
        HttpReply::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    });
    to_response(reply, outcome)
}

fn to_response(reply: HttpReply, outcome: Outcome) -> Response {
    let connection = if outcome.keep_alive() {
        "keep-alive"
    } else {
        "close"
    };
    (
        reply.status,
        [
            (header::SERVER, SERVER_NAME),
            (header::CONTENT_TYPE, "application/json; charset=UTF-8"),
            (header::CONNECTION, connection),
        ],
        reply.body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::RpcReject;

    #[test]
    fn test_reply_headers() {
        let response = to_response(HttpReply::ok("{}\n"), Outcome::Completed);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::SERVER], SERVER_NAME);
        assert_eq!(response.headers()[header::CONNECTION], "keep-alive");
    }

    #[test]
    fn test_closed_session_sends_connection_close() {
        let response = to_response(
            RpcReject::forbidden().into(),
            Outcome::Closed { graceful: true },
        );
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()[header::CONNECTION], "close");
    }
}
