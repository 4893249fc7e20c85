//! Session port: the narrow contract the gateway has with a live connection.

use crate::domain::http::{HttpReply, HttpRequest};
use crate::domain::port::Port;
use std::net::SocketAddr;
use std::sync::Arc;

/// A live connection owned by the transport layer.
///
/// The gateway never touches socket state directly; it observes the parsed
/// request and drives the connection through these calls.
pub trait Session: Send + Sync {
    /// Port the connection was accepted on.
    fn port(&self) -> &Arc<Port>;

    fn remote_address(&self) -> SocketAddr;

    /// The current request, fully read.
    fn request(&self) -> &HttpRequest;

    /// Queue a reply for writing.
    fn write(&self, reply: HttpReply);

    /// Close the connection, optionally after flushing pending writes.
    fn close(&self, graceful: bool);

    /// Mark the current request finished; the connection may be reused.
    fn complete(&self);

    /// Release the session from its I/O handler so processing can continue
    /// on another task.
    fn detach(self: Arc<Self>) -> Arc<dyn Session>;
}
