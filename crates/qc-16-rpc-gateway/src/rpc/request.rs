//! Legacy JSON-RPC request shape.
//!
//! `{"method": "...", "params": [{...}], "id": ...}` where `params` is either
//! absent or a one-element array holding an object. Every shape failure maps
//! to a fixed reject reason that clients rely on.

use crate::domain::error::RpcReject;
use serde_json::{Map, Value};

/// A structurally valid legacy RPC request.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// Caller-supplied id, if any (`null` counts as absent)
    pub id: Option<Value>,
    /// Method name; may still be empty
    pub method: String,
    /// Effective params object
    pub params: Map<String, Value>,
}

impl JsonRpcRequest {
    /// Parse and validate a request body.
    ///
    /// Checks, in order: size and JSON object shape, `method`, `params`.
    pub fn parse(body: &[u8], max_size: usize) -> Result<Self, RpcReject> {
        let mut object = parse_object(body, max_size)?;

        let method = match object.remove("method") {
            None | Some(Value::Null) => return Err(RpcReject::null_method()),
            Some(Value::String(method)) => method,
            Some(_) => return Err(RpcReject::method_not_string()),
        };

        let params = effective_params(object.remove("params"))?;

        let id = match object.remove("id") {
            None | Some(Value::Null) => None,
            Some(id) => Some(id),
        };

        Ok(Self { id, method, params })
    }

    /// The id as a lookup key, if present.
    pub fn id_key(&self) -> Option<String> {
        self.id.as_ref().map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

fn parse_object(body: &[u8], max_size: usize) -> Result<Map<String, Value>, RpcReject> {
    if body.len() > max_size {
        return Err(RpcReject::unable_to_parse());
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => Ok(object),
        _ => Err(RpcReject::unable_to_parse()),
    }
}

/// Absent `params` means `{}`; otherwise exactly `[ {..} ]`.
pub fn effective_params(params: Option<Value>) -> Result<Map<String, Value>, RpcReject> {
    match params {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Array(items)) if items.len() == 1 => match items.into_iter().next() {
            Some(Value::Object(object)) => Ok(object),
            _ => Err(RpcReject::params_unparseable()),
        },
        Some(_) => Err(RpcReject::params_unparseable()),
    }
}
