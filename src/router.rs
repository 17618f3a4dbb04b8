//! Method router: resolves a dotted method name against an immutable routing tree and
//! executes the resulting handler or middleware chain.

use crate::context::InvocationContext;
use crate::error::RpcError;
use crate::proxy::MethodProxy;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A handler callable: reads/writes `ctx.params`, returns a value or an error.
pub type HandlerFn = Arc<dyn Fn(&mut InvocationContext) -> Result<Value, RpcError> + Send + Sync>;

/// One node of the routing tree. See the module docs above for the four variants.
pub enum RoutingNode {
    Handler(HandlerFn),
    Chain(Vec<Arc<RoutingNode>>),
    Namespace(HashMap<String, Arc<RoutingNode>>),
    Literal(Value),
}

impl RoutingNode {
    pub fn handler<F>(f: F) -> Arc<RoutingNode>
    where
        F: Fn(&mut InvocationContext) -> Result<Value, RpcError> + Send + Sync + 'static,
    {
        Arc::new(RoutingNode::Handler(Arc::new(f)))
    }

    pub fn literal(value: impl Into<Value>) -> Arc<RoutingNode> {
        Arc::new(RoutingNode::Literal(value.into()))
    }

    pub fn chain(elements: Vec<Arc<RoutingNode>>) -> Arc<RoutingNode> {
        Arc::new(RoutingNode::Chain(elements))
    }

    /// An empty namespace; disables inbound dispatch when used as an engine's root routing tree.
    pub fn empty_namespace() -> Arc<RoutingNode> {
        Arc::new(RoutingNode::Namespace(HashMap::new()))
    }
}

/// Fluent constructor for a `Namespace` node.
#[derive(Default)]
pub struct Namespace {
    entries: HashMap<String, Arc<RoutingNode>>,
}

impl Namespace {
    pub fn builder() -> Self {
        Namespace { entries: HashMap::new() }
    }

    /// Registers `node` under `name`. `name` may itself contain dots (e.g. `"user.special"`),
    /// which is how a full-name key takes precedence over a shorter nested-namespace prefix.
    pub fn route(mut self, name: impl Into<String>, node: Arc<RoutingNode>) -> Self {
        self.entries.insert(name.into(), node);
        self
    }

    pub fn build(self) -> Arc<RoutingNode> {
        Arc::new(RoutingNode::Namespace(self.entries))
    }
}

/// Walks `root`, consuming the longest matching dotted prefix of `method` at each
/// `Namespace` level, until a `Handler`, `Chain`, or `Literal` is reached.
///
/// Returns the terminal node and the unconsumed suffix of `method` (empty if fully
/// consumed). Fails with `-32601` if no namespace key matches at some level — an empty
/// `method` still matches a namespace entry registered under the empty-string key.
pub fn resolve_in_tree(root: &Arc<RoutingNode>, method: &str) -> Result<(Arc<RoutingNode>, String), RpcError> {
    let mut node = root.clone();
    let mut remaining = method.to_string();
    loop {
        let ns = match node.as_ref() {
            RoutingNode::Namespace(ns) => ns,
            _ => return Ok((node.clone(), remaining)),
        };
        let segments: Vec<&str> = remaining.split('.').collect();
        let mut matched = None;
        for prefix_len in (1..=segments.len()).rev() {
            let candidate = segments[0..prefix_len].join(".");
            if let Some(child) = ns.get(candidate.as_str()) {
                matched = Some((child.clone(), segments[prefix_len..].join(".")));
                break;
            }
        }
        match matched {
            Some((child, rest)) => {
                node = child;
                remaining = rest;
            }
            None => return Err(RpcError::method_not_found()),
        }
    }
}

/// Executes a resolved node: invokes a handler, returns a literal, resolves a nested
/// namespace against the context's current `method`, or runs a chain.
pub fn execute_node(node: &Arc<RoutingNode>, ctx: &mut InvocationContext) -> Result<Value, RpcError> {
    match node.as_ref() {
        RoutingNode::Literal(v) => Ok(v.clone()),
        RoutingNode::Handler(f) => f(ctx),
        RoutingNode::Namespace(_) => {
            let (resolved, remaining) = resolve_in_tree(node, &ctx.method)?;
            ctx.method = remaining;
            execute_node(&resolved, ctx)
        }
        RoutingNode::Chain(elements) => execute_chain(elements, ctx),
    }
}

fn execute_chain(elements: &[Arc<RoutingNode>], ctx: &mut InvocationContext) -> Result<Value, RpcError> {
    let last = elements.len().saturating_sub(1);
    if elements.is_empty() {
        return Ok(Value::Null);
    }
    for (i, element) in elements.iter().enumerate() {
        let result = execute_node(element, ctx)?;
        if i == last {
            return Ok(result);
        }
        if result != Value::Null {
            return Err(RpcError::chain_contract_violation());
        }
    }
    unreachable!("loop above always returns on the last element")
}

/// Owns the immutable routing tree and its resolution cache, and runs top-level dispatch.
pub struct Router {
    root: Arc<RoutingNode>,
    cache: RwLock<HashMap<String, (Arc<RoutingNode>, String)>>,
}

impl Router {
    pub fn new(root: Arc<RoutingNode>) -> Self {
        Router { root, cache: RwLock::new(HashMap::new()) }
    }

    pub fn dispatch(
        &self,
        id: Value,
        method: String,
        params: Vec<Value>,
        invoke: Arc<MethodProxy>,
    ) -> Result<Value, RpcError> {
        let (node, remaining) = self.resolve_cached(&method)?;
        let mut ctx = InvocationContext { id, method: remaining, original_method: method, params, invoke };
        execute_node(&node, &mut ctx)
    }

    fn resolve_cached(&self, method: &str) -> Result<(Arc<RoutingNode>, String), RpcError> {
        if let Some(hit) = self.cache.read().unwrap().get(method) {
            return Ok(hit.clone());
        }
        let resolved = resolve_in_tree(&self.root, method)?;
        self.cache.write().unwrap().insert(method.to_string(), resolved.clone());
        Ok(resolved)
    }
}
