//! Buffered session: a [`Session`] that records what the gateway did.
//!
//! Transports that own the socket elsewhere (the axum adapter, tests) hand
//! the gateway a `BufferedSession`, wait for [`BufferedSession::finished`],
//! then write the captured reply themselves.

use crate::domain::http::{HttpReply, HttpRequest};
use crate::domain::port::Port;
use crate::ports::session::Session;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::warn;

/// How the gateway finished with the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Request done; connection may be reused
    Completed,
    /// Connection closed
    Closed { graceful: bool },
}

impl Outcome {
    pub fn keep_alive(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

#[derive(Debug, Default)]
struct State {
    reply: Option<HttpReply>,
    outcome: Option<Outcome>,
}

pub struct BufferedSession {
    port: Arc<Port>,
    remote: SocketAddr,
    request: HttpRequest,
    state: Mutex<State>,
    detached: AtomicBool,
    done: Notify,
}

impl BufferedSession {
    pub fn new(port: Arc<Port>, remote: SocketAddr, request: HttpRequest) -> Arc<Self> {
        Arc::new(Self {
            port,
            remote,
            request,
            state: Mutex::new(State::default()),
            detached: AtomicBool::new(false),
            done: Notify::new(),
        })
    }

    /// Wait until the gateway completes or closes the session.
    pub async fn finished(&self) -> Outcome {
        loop {
            let done = self.done.notified();
            tokio::pin!(done);
            done.as_mut().enable();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            done.await;
        }
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.state.lock().outcome
    }

    /// The reply written so far, if any.
    pub fn reply(&self) -> Option<HttpReply> {
        self.state.lock().reply.clone()
    }

    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    fn finish(&self, outcome: Outcome) {
        {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return;
            }
            state.outcome = Some(outcome);
        }
        self.done.notify_waiters();
    }
}

impl Session for BufferedSession {
    fn port(&self) -> &Arc<Port> {
        &self.port
    }

    fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    fn request(&self) -> &HttpRequest {
        &self.request
    }

    fn write(&self, reply: HttpReply) {
        let mut state = self.state.lock();
        if state.outcome.is_some() {
            warn!(remote = %self.remote, "Write after session finished; dropped");
            return;
        }
        state.reply = Some(reply);
    }

    fn close(&self, graceful: bool) {
        self.finish(Outcome::Closed { graceful });
    }

    fn complete(&self) {
        self.finish(Outcome::Completed);
    }

    fn detach(self: Arc<Self>) -> Arc<dyn Session> {
        self.detached.store(true, Ordering::Release);
        self
    }
}
