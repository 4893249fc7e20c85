//! Server handler: the transport-facing entry points of the gateway.
//!
//! ```text
//! accept ─► on_accept ─► on_handoff_{tls,plain} ─► on_request ─► job ─► pipeline
//!   │           │                 │                     │
//!   │       port full          ws / peer            not http(s) or
//!   │       → refuse           → moved              bad Basic → 403
//!   └──────────────────────────────────────────────── on_close
//! ```

use crate::adapters::http::legacy_router;
use crate::domain::config::GatewayConfig;
use crate::domain::error::{GatewayError, GatewayResult, RpcReject};
use crate::domain::http::HttpRequest;
use crate::domain::port::{Port, Protocol};
use crate::domain::setup::Setup;
use crate::handoff::{Handoff, HandoffRouter};
use crate::middleware::auth::{self, BasicAuth};
use crate::middleware::connection_limit::ConnectionLimiter;
use crate::middleware::metrics::RpcMetrics;
use crate::ports::outbound::{CommandDispatcher, Overlay, ResourceManager, Transport};
use crate::ports::session::Session;
use crate::rpc::context::ForwardedIdentity;
use crate::rpc::pipeline::{InboundRequest, RpcPipeline};
use crate::scheduler::{JobCoro, JobQueue, JobType};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

const FORWARDED_FOR: &str = "x-forwarded-for";
const FORWARDED_USER: &str = "x-user";

/// Handles connections for every configured port.
pub struct ServerHandler {
    setup: Setup,
    limiter: ConnectionLimiter,
    router: HandoffRouter,
    pipeline: RpcPipeline,
    jobs: JobQueue,
    metrics: Arc<RpcMetrics>,
    shutdown_tx: watch::Sender<bool>,
}

impl ServerHandler {
    /// Validate `config`, build the port setup and wire the collaborators.
    pub fn new(
        config: GatewayConfig,
        overlay: Arc<dyn Overlay>,
        resources: Arc<dyn ResourceManager>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let setup = Setup::from_config(&config.server, config.standalone)?;
        Ok(Self::with_setup(config, setup, overlay, resources, dispatcher))
    }

    /// Wire a handler around an already validated setup.
    pub fn with_setup(
        config: GatewayConfig,
        setup: Setup,
        overlay: Arc<dyn Overlay>,
        resources: Arc<dyn ResourceManager>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Self {
        let metrics = Arc::new(RpcMetrics::new());
        let (shutdown_tx, _) = watch::channel(false);

        for port in &setup.ports {
            info!(port = %port, "Configured port");
        }

        Self {
            limiter: ConnectionLimiter::new(),
            router: HandoffRouter::new(overlay),
            pipeline: RpcPipeline::new(config.rpc, resources, dispatcher, Arc::clone(&metrics)),
            jobs: JobQueue::new(&config.jobs),
            metrics,
            setup,
            shutdown_tx,
        }
    }

    pub fn setup(&self) -> &Setup {
        &self.setup
    }

    pub fn metrics(&self) -> Arc<RpcMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Largest request body the pipeline will parse.
    pub fn max_request_size(&self) -> usize {
        self.pipeline.config().max_request_size
    }

    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    /// Live connections on the named port.
    pub fn connection_count(&self, port_name: &str) -> usize {
        self.limiter.count(port_name)
    }

    /// Admit a new connection. `false` means drop it.
    pub fn on_accept(&self, port: &Port, remote: SocketAddr) -> bool {
        let accepted = self.limiter.on_accept(port, remote);
        if !accepted {
            self.metrics.record_connection_refused();
        }
        accepted
    }

    /// Decide ownership of a TLS connection.
    pub fn on_handoff_tls(
        &self,
        port: &Port,
        stream: Box<dyn Any + Send>,
        request: HttpRequest,
        remote: SocketAddr,
    ) -> Handoff {
        self.router
            .route(port, Transport::Tls(stream), request, remote)
    }

    /// Decide ownership of a raw TCP connection.
    pub fn on_handoff_plain(
        &self,
        port: &Port,
        stream: Box<dyn Any + Send>,
        request: HttpRequest,
        remote: SocketAddr,
    ) -> Handoff {
        self.router
            .route(port, Transport::Plain(stream), request, remote)
    }

    /// Entry point for a legacy request that has been fully read.
    ///
    /// Rejects requests on ports without `http`/`https` and requests failing
    /// the port's Basic credentials, then posts the rest as a client job.
    pub fn on_request(&self, session: Arc<dyn Session>) {
        let port = session.port();
        if !port.serves_rpc() || !auth::authorized(port, session.request()) {
            self.reject(session.as_ref(), RpcReject::forbidden());
            return;
        }

        let detached = Arc::clone(&session).detach();
        let pipeline = self.pipeline.clone();
        let posted = self.jobs.post_coro(JobType::Client, "RPC-Client", move |coro| async move {
            process_session(&pipeline, detached, coro).await;
        });

        if !posted {
            self.reject(session.as_ref(), RpcReject::shutting_down());
        }
    }

    /// Forget a connection accepted by [`on_accept`](Self::on_accept).
    pub fn on_close(&self, port: &Port) {
        self.limiter.on_close(port);
    }

    /// Stop taking new requests; in-flight jobs still finish.
    pub fn stop(&self) {
        info!("Server handler stopping");
        self.jobs.stop();
        self.shutdown_tx.send_replace(true);
    }

    /// Stop and wait for in-flight jobs.
    pub async fn shutdown(&self) {
        self.stop();
        self.jobs.drain().await;
        info!("Server handler stopped");
    }

    /// Serve one plain `http` port with the axum transport until `stop()`.
    pub async fn serve_port(self: Arc<Self>, port_name: &str) -> GatewayResult<()> {
        let port = self
            .setup
            .port(port_name)
            .cloned()
            .ok_or_else(|| GatewayError::Unservable(port_name.to_string(), "no such port"))?;

        if !port.protocols.iter().all(|p| *p == Protocol::Http) {
            return Err(GatewayError::Unservable(
                port.name.clone(),
                "only plain http ports are served by this transport",
            ));
        }

        let addr = port.bind_addr();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))?;
        info!(port = %port.name, addr = %addr, "Serving JSON-RPC");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let router = legacy_router(Arc::clone(&self), port);
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stopping| *stopping).await;
        })
        .await
        .map_err(|e| {
            error!(error = %e, "JSON-RPC server error");
            GatewayError::Internal(e.to_string())
        })
    }

    fn reject(&self, session: &dyn Session, reject: RpcReject) {
        self.metrics.record_reject(&reject);
        debug!(
            port = %session.port().name,
            remote = %session.remote_address(),
            reason = reject.reason(),
            "Request refused"
        );
        session.write(reject.into());
        session.close(true);
    }
}

/// Run a detached session through the pipeline and finalize the connection.
async fn process_session(pipeline: &RpcPipeline, session: Arc<dyn Session>, coro: JobCoro) {
    let request = session.request();
    let inbound = InboundRequest {
        port: session.port().as_ref(),
        body: &request.body,
        // Consumers are keyed by address, never by source port
        remote: SocketAddr::new(session.remote_address().ip(), 0),
        basic: BasicAuth::from_request(request),
        identity: ForwardedIdentity::new(
            request.header_or_empty(FORWARDED_USER),
            request.header_or_empty(FORWARDED_FOR),
        ),
    };

    let reply = pipeline.process_request(inbound, coro).await;
    session.write(reply);

    if request.keep_alive() {
        session.complete();
    } else {
        session.close(true);
    }
}
