//! Legacy JSON-RPC dispatch pipeline.
//!
//! Gates run in a fixed order and the first failure is terminal:
//!
//! ```text
//! parse ─► method ─► params ─► role ─► admission ─► method name ─► dispatch ─► reply
//!  400      400       400       403      503          400            200
//! ```
//!
//! Only a request that passes every gate is dispatched, instrumented and
//! charged. A command that panics is answered as an internal error and
//! charged `FEE_EXCEPTION_RPC`. Rejections are written as plain text with no
//! JSON envelope.

use crate::domain::config::RpcConfig;
use crate::domain::error::RpcReject;
use crate::domain::fees::{Charge, FEE_EXCEPTION_RPC};
use crate::domain::http::HttpReply;
use crate::domain::port::Port;
use crate::domain::role::Role;
use crate::middleware::auth::{self, BasicAuth};
use crate::middleware::metrics::{RequestTimer, RpcMetrics};
use crate::middleware::resource;
use crate::ports::outbound::{CommandDispatcher, ResourceManager};
use crate::rpc::context::{ForwardedIdentity, RequestContext};
use crate::rpc::request::JsonRpcRequest;
use crate::scheduler::JobCoro;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// One request as read off a session.
#[derive(Debug, Clone)]
pub struct InboundRequest<'a> {
    pub port: &'a Port,
    pub body: &'a [u8],
    pub remote: SocketAddr,
    pub basic: BasicAuth,
    /// Forwarded headers as received; trusted only for `Identified` callers
    pub identity: ForwardedIdentity,
}

/// Parses, authorizes, admits and dispatches legacy RPC requests.
#[derive(Clone)]
pub struct RpcPipeline {
    config: RpcConfig,
    resources: Arc<dyn ResourceManager>,
    dispatcher: Arc<dyn CommandDispatcher>,
    metrics: Arc<RpcMetrics>,
}

impl RpcPipeline {
    pub fn new(
        config: RpcConfig,
        resources: Arc<dyn ResourceManager>,
        dispatcher: Arc<dyn CommandDispatcher>,
        metrics: Arc<RpcMetrics>,
    ) -> Self {
        Self {
            config,
            resources,
            dispatcher,
            metrics,
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Run one request to a reply.
    pub async fn process_request(&self, request: InboundRequest<'_>, job: JobCoro) -> HttpReply {
        let port = request.port.name.clone();
        match self.run(request, job).await {
            Ok(reply) => reply,
            Err(reject) => {
                self.metrics.record_reject(&reject);
                debug!(
                    port = %port,
                    status = reject.status().as_u16(),
                    reason = reject.reason(),
                    "RPC request rejected"
                );
                reject.into()
            }
        }
    }

    async fn run(&self, request: InboundRequest<'_>, job: JobCoro) -> Result<HttpReply, RpcReject> {
        let parsed = JsonRpcRequest::parse(request.body, self.config.max_request_size)?;
        let required = self.required_role(&parsed);
        let JsonRpcRequest {
            method, mut params, ..
        } = parsed;

        let role = auth::request_role(
            required,
            request.port,
            &params,
            request.remote.ip(),
            &request.identity.user,
            &request.basic,
        );
        let identity = request.identity.trusted_for(role);

        if role == Role::Forbid {
            return Err(RpcReject::forbidden());
        }

        let consumer = resource::consumer_for(self.resources.as_ref(), role, request.remote);
        resource::admit(consumer.as_ref())?;

        if method.is_empty() {
            return Err(RpcReject::method_empty());
        }

        debug!(command = %method, role = %role, "Query");
        params.insert("command".to_string(), Value::String(method));
        let dispatched = params.clone();
        let logged = serde_json::Value::Object(params.clone());
        trace!(params = %logged, "Dispatching command");

        let timer = RequestTimer::new(Arc::clone(&self.metrics));
        let context = RequestContext::new(params, role, identity, job);
        let (result, params, load_type) = self.dispatch(context).await.unwrap_or_else(|| {
            (
                json!({"error": "internal", "error_message": "Internal error."}),
                dispatched,
                FEE_EXCEPTION_RPC,
            )
        });
        let result = assemble(result, &params);

        let mut response = json!({ "result": result }).to_string();
        timer.finish(response.len());
        response.push('\n');

        resource::charge(consumer.as_ref(), load_type);

        debug!(reply = truncate_for_log(&response, self.config.max_logged_reply), "Reply");
        Ok(HttpReply::ok(response))
    }

    /// Run the command on its own task so a panic cannot unwind through the
    /// session. `None` means the command panicked.
    async fn dispatch(
        &self,
        mut context: RequestContext,
    ) -> Option<(Value, Map<String, Value>, Charge)> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let command = context.command().to_string();
        let task = tokio::spawn(async move {
            let result = dispatcher.do_command(&mut context).await;
            (result, context.params, context.load_type)
        });
        match task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(command = %command, error = %e, "Command aborted");
                None
            }
        }
    }

    /// A request with no `id` needs only `Guest`; otherwise the dispatcher
    /// decides from the id.
    fn required_role(&self, request: &JsonRpcRequest) -> Role {
        request
            .id_key()
            .and_then(|key| self.dispatcher.required_role(&key))
            .unwrap_or(Role::Guest)
    }
}

/// Add `status`, and echo the dispatched params on error.
fn assemble(result: Value, params: &Map<String, Value>) -> Map<String, Value> {
    let mut result = match result {
        Value::Object(result) => result,
        other => {
            warn!(result = %other, "Command returned a non-object result");
            let mut wrapped = Map::new();
            wrapped.insert("error".into(), json!("internal"));
            wrapped.insert("error_message".into(), json!("Internal error."));
            wrapped
        }
    };

    if let Some(error) = result.get("error") {
        let message = result.get("error_message").cloned().unwrap_or_default();
        debug!(error = %error, error_message = %message, "rpcError");
        result.insert("status".into(), json!("error"));
        result.insert("request".into(), Value::Object(params.clone()));
    } else {
        result.insert("status".into(), json!("success"));
    }
    result
}

/// Longest prefix of `text` no longer than `max` bytes.
fn truncate_for_log(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
