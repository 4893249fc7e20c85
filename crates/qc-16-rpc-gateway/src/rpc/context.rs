//! Per-request context handed to the command dispatcher.

use crate::domain::fees::{Charge, FEE_REFERENCE_RPC};
use crate::domain::role::Role;
use crate::scheduler::JobCoro;
use serde_json::{Map, Value};

/// Identity a secure gateway forwarded with the request.
///
/// Only populated for `Identified` callers; empty otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardedIdentity {
    /// `X-User`
    pub user: String,
    /// `X-Forwarded-For`
    pub forwarded_for: String,
}

impl ForwardedIdentity {
    pub fn new(user: impl Into<String>, forwarded_for: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            forwarded_for: forwarded_for.into(),
        }
    }

    /// Drop both values unless `role` vouches for them.
    pub fn trusted_for(self, role: Role) -> Self {
        if role == Role::Identified {
            self
        } else {
            Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.forwarded_for.is_empty()
    }
}

/// Everything a command sees about its request.
#[derive(Debug)]
pub struct RequestContext {
    /// Effective params, with `command` set to the method name
    pub params: Map<String, Value>,
    pub role: Role,
    /// Fee charged once the reply is built; commands may raise it
    pub load_type: Charge,
    pub identity: ForwardedIdentity,
    /// Continuation for suspending onto further jobs
    pub job: JobCoro,
}

impl RequestContext {
    pub fn new(
        params: Map<String, Value>,
        role: Role,
        identity: ForwardedIdentity,
        job: JobCoro,
    ) -> Self {
        Self {
            params,
            role,
            load_type: FEE_REFERENCE_RPC,
            identity,
            job,
        }
    }

    /// Name of the command being run.
    pub fn command(&self) -> &str {
        self.params
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}
