//! The per-call invocation context passed to every handler in a chain.

use crate::proxy::MethodProxy;
use serde_json::Value;
use std::sync::Arc;

/// Mutable, per-call data bundle visible to every element of a routing chain.
///
/// `method` is the *remaining* dotted suffix after the router has consumed a prefix;
/// `original_method` is preserved unchanged across the whole resolution so a handler can
/// still recover the full name it was originally dispatched against.
pub struct InvocationContext {
    pub id: Value,
    pub method: String,
    pub original_method: String,
    pub params: Vec<Value>,
    pub invoke: Arc<MethodProxy>,
}

impl InvocationContext {
    pub fn new(id: Value, method: String, params: Vec<Value>, invoke: Arc<MethodProxy>) -> Self {
        InvocationContext { id, original_method: method.clone(), method, params, invoke }
    }
}
