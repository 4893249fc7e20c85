//! Resource admission control.
//!
//! Binds each request to a cost-accounting consumer, turns away callers over
//! their limit before any work is done, and charges the final load type once
//! the response is assembled.

use crate::domain::error::RpcReject;
use crate::domain::fees::Charge;
use crate::domain::role::Role;
use crate::ports::outbound::{Consumer, Disposition, ResourceManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Consumer for a request from `remote` resolved to `role`.
///
/// Unlimited roles get a consumer keyed by the full endpoint string (for
/// logging only); everyone else is metered by network address.
pub fn consumer_for(
    resources: &dyn ResourceManager,
    role: Role,
    remote: SocketAddr,
) -> Arc<dyn Consumer> {
    if role.is_unlimited() {
        resources.new_unlimited_endpoint(&remote.to_string())
    } else {
        resources.new_inbound_endpoint(remote.ip())
    }
}

/// Reject with 503 if the consumer is over its limit.
pub fn admit(consumer: &dyn Consumer) -> Result<(), RpcReject> {
    if consumer.disconnect() {
        debug!(consumer = %consumer.label(), "Consumer over limit; request refused");
        return Err(RpcReject::overloaded());
    }
    Ok(())
}

/// Apply the request's final fee.
pub fn charge(consumer: &dyn Consumer, fee: Charge) -> Disposition {
    let disposition = consumer.charge(fee);
    if disposition == Disposition::Drop {
        warn!(
            consumer = %consumer.label(),
            fee = %fee,
            "Consumer crossed drop threshold"
        );
    }
    disposition
}
