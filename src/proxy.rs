//! The method proxy: the handle external callers and handlers use to issue outbound calls.
//!
//! The original JS design lets callers write `proxy.some.nested.method(args)` via dynamic
//! property interception; Rust has no equivalent, so per this engine's redesign notes the same
//! ergonomics are expressed as an explicit builder-style path chain: `proxy.path("some").path("nested").call(args)`,
//! or the shorthand `proxy.call_path("some.nested.method", args)`.

use crate::channel::MessageChannel;
use crate::engine::{ConnectionState, Engine};
use crate::error::RpcError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An accumulated dotted method path bound to an engine, with lazily-created, cached children
/// for each segment appended via [`MethodProxy::path`].
pub struct MethodProxy {
    engine: Option<Arc<Engine>>,
    segments: Vec<String>,
    children: Mutex<HashMap<String, Arc<MethodProxy>>>,
    detached_state: ConnectionState,
}

impl MethodProxy {
    pub(crate) fn root(engine: Arc<Engine>) -> Arc<Self> {
        Arc::new(MethodProxy {
            engine: Some(engine),
            segments: Vec::new(),
            children: Mutex::new(HashMap::new()),
            detached_state: ConnectionState::Init,
        })
    }

    /// A proxy bound to no engine: `.call()` always fails with `connection_closed`, and
    /// `.state()` reports a fixed value. Used where a caller needs an `InvocationContext`
    /// without a live engine behind it (tests, or a purely local dispatch).
    pub fn detached(state: ConnectionState) -> Arc<Self> {
        Arc::new(MethodProxy { engine: None, segments: Vec::new(), children: Mutex::new(HashMap::new()), detached_state: state })
    }

    /// Returns (creating and caching, if needed) the child proxy for `segment`.
    pub fn path(self: &Arc<Self>, segment: impl Into<String>) -> Arc<Self> {
        let segment = segment.into();
        let mut children = self.children.lock().unwrap();
        if let Some(existing) = children.get(&segment) {
            return existing.clone();
        }
        let mut segments = self.segments.clone();
        segments.push(segment.clone());
        let child = Arc::new(MethodProxy {
            engine: self.engine.clone(),
            segments,
            children: Mutex::new(HashMap::new()),
            detached_state: self.detached_state,
        });
        children.insert(segment, child.clone());
        child
    }

    /// The dotted method name this proxy's accumulated path represents.
    pub fn method_name(&self) -> String {
        self.segments.join(".")
    }

    /// Issues an outbound call to this proxy's accumulated path.
    pub fn call(&self, params: Vec<Value>) -> Result<Value, RpcError> {
        match &self.engine {
            Some(engine) => engine.call(self.method_name(), params),
            None => Err(RpcError::connection_closed()),
        }
    }

    /// Shorthand for `self.path(a).path(b)....call(params)` without walking the cache for
    /// each segment; `method_path` is appended verbatim to this proxy's own path.
    pub fn call_path(&self, method_path: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let full = if self.segments.is_empty() {
            method_path.to_string()
        } else {
            format!("{}.{}", self.method_name(), method_path)
        };
        match &self.engine {
            Some(engine) => engine.call(full, params),
            None => Err(RpcError::connection_closed()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &self.engine {
            Some(engine) => engine.state(),
            None => self.detached_state,
        }
    }

    pub fn channel(&self) -> Option<Arc<dyn MessageChannel>> {
        self.engine.as_ref().and_then(|e| e.current_channel())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_accumulates_and_caches_children() {
        let proxy = MethodProxy::detached(ConnectionState::Init);
        let a = proxy.path("a");
        let b = a.path("b");
        assert_eq!(b.method_name(), "a.b");
        let a_again = proxy.path("a");
        assert!(Arc::ptr_eq(&a, &a_again));
    }

    #[test]
    fn detached_proxy_call_fails_with_connection_closed() {
        let proxy = MethodProxy::detached(ConnectionState::Init);
        let err = proxy.path("anything").call(vec![]).unwrap_err();
        assert_eq!(err.code, -32000);
    }

    #[test]
    fn call_path_joins_with_accumulated_prefix() {
        let proxy = MethodProxy::detached(ConnectionState::Init);
        let ns = proxy.path("user");
        let err = ns.call_path("profile.get", vec![]).unwrap_err();
        // detached, so it always errors, but method_name composition is exercised via the
        // accumulated prefix on `ns` independent of this call's failure.
        assert_eq!(err.code, -32000);
        assert_eq!(ns.method_name(), "user");
    }
}
