//! A transport-agnostic, bi-directional JSON-RPC 2.0 engine.
//!
//! A single [`Engine`](engine::Engine) is simultaneously a client — it issues outbound calls
//! through a [`MethodProxy`](proxy::MethodProxy) and blocks the caller until the matching
//! response arrives — and a server — it dispatches inbound calls against a [`RoutingNode`](router::RoutingNode)
//! tree of handlers, middleware chains, and nested namespaces. Both directions share one
//! [`MessageChannel`](channel::MessageChannel) and one id space.
//!
//! Two entry points cover the two ways to stand one up: [`open`] dials out immediately and
//! hands back a proxy to call through; [`ListenerFactory`] binds a routing tree to channels
//! as they arrive.

pub mod channel;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pending;
pub mod proxy;
pub mod router;
pub mod wire;

use channel::ChannelSource;
use engine::{Engine, EngineConfig};
use proxy::MethodProxy;
use router::RoutingNode;
use std::sync::Arc;

/// Connects to `channel_source` and returns a proxy ready to make outbound calls against it.
/// `routing` governs inbound dispatch over the same connection (pass [`RoutingNode::empty_namespace`]
/// if this peer only ever calls out and never serves).
pub fn open(channel_source: ChannelSource, routing: Arc<RoutingNode>, config: EngineConfig) -> Arc<MethodProxy> {
    let engine = Engine::new(channel_source, routing, config);
    engine.connect();
    engine.proxy()
}

/// Binds a routing tree to channels as they're obtained, one engine per [`bind`](ListenerFactory::bind)
/// call. Mirrors the `handler(routing, config?) -> listener_factory` entry point: build the
/// factory once per routing tree, then `bind` it to as many channel sources as needed.
///
/// Channels handed to `bind` are assumed already open (an accepted server-side connection is
/// live the moment it's handed over, unlike `open`'s dial-out case) — `config.opened` is forced
/// to `true` regardless of what was passed in.
pub struct ListenerFactory {
    routing: Arc<RoutingNode>,
    config: EngineConfig,
}

impl ListenerFactory {
    pub fn new(routing: Arc<RoutingNode>, mut config: EngineConfig) -> Self {
        config.opened = true;
        ListenerFactory { routing, config }
    }

    /// Connects `channel_source` and returns the resulting peer's proxy, just like [`open`],
    /// but drawing the routing tree and config from this factory rather than from fresh
    /// arguments on every call.
    pub fn bind(&self, channel_source: ChannelSource) -> Arc<MethodProxy> {
        let engine = Engine::new(channel_source, self.routing.clone(), self.config.clone());
        engine.connect();
        engine.proxy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_support::InMemoryChannel;
    use crate::engine::ConnectionState;
    use crate::router::Namespace;
    use serde_json::json;

    #[test]
    fn open_dials_out_and_reaches_connected_on_open_event() {
        let (a, _b) = InMemoryChannel::connect();
        let proxy = open(ChannelSource::fixed(a.clone()), RoutingNode::empty_namespace(), EngineConfig::default());
        assert_eq!(proxy.state(), ConnectionState::Connecting);
        a.fire_open();
        assert_eq!(proxy.state(), ConnectionState::Connected);
    }

    #[test]
    fn listener_factory_binds_already_open_without_an_open_event() {
        let (a, b) = InMemoryChannel::connect();
        let routing = Namespace::builder().route("ping", RoutingNode::literal("pong")).build();
        let factory = ListenerFactory::new(routing, EngineConfig::default());
        let server_proxy = factory.bind(ChannelSource::fixed(b));
        assert_eq!(server_proxy.state(), ConnectionState::Connected);

        let client_proxy = open(ChannelSource::fixed(a.clone()), RoutingNode::empty_namespace(), EngineConfig::default());
        a.fire_open();
        assert_eq!(client_proxy.path("ping").call(vec![]).unwrap(), json!("pong"));
    }
}
