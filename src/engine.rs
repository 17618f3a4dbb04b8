//! The peer engine: the object that is simultaneously a JSON-RPC client (it issues outbound
//! calls and tracks their responses) and server (it dispatches inbound calls against a routing
//! tree) over one [`MessageChannel`].

use crate::channel::{ChannelEvent, ChannelSource, MessageChannel};
use crate::error::RpcError;
use crate::logging;
use crate::pending::PendingTable;
use crate::proxy::MethodProxy;
use crate::router::{Router, RoutingNode};
use crate::wire::{self, IncomingFrame, RequestFrame, ResponseFrame};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread;
use std::time::Duration;

/// The engine's connection lifecycle. Transitions: `Init` -> `Connecting` (on
/// [`Engine::connect`]) -> `Connected` (on a channel `Open` event) -> `Reconnecting` (on a
/// `Close`/`Error` event, if the channel source supports reconnection and the retry cap
/// hasn't been reached) -> `Connected` again, or -> `Closed` once the cap is reached or
/// [`Engine::close`] is called explicitly. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// `(old_state, new_state)`.
pub type StateChangeHook = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;
pub type UnmatchedResponseHook = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Clone)]
pub struct EngineConfig {
    pub call_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
    /// Whether the channel handed to [`Engine::connect`] is already open, so the engine should
    /// move straight to `Connected` instead of waiting for an `Open` event that will never come
    /// (e.g. an accepted server-side connection that is live the moment it's handed over).
    pub opened: bool,
    pub on_state_change: Option<StateChangeHook>,
    pub on_unmatched_response: Option<UnmatchedResponseHook>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            call_timeout: Duration::from_millis(10000),
            max_reconnect_attempts: 3,
            reconnect_backoff: Duration::from_millis(1000),
            opened: false,
            on_state_change: None,
            on_unmatched_response: None,
        }
    }
}

/// Fluent constructor for [`EngineConfig`], in the builder style the method router's
/// `Namespace` also uses.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn new() -> Self {
        EngineConfigBuilder { config: EngineConfig::default() }
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.config.reconnect_backoff = backoff;
        self
    }

    /// Marks the channel as pre-opened: [`Engine::connect`] moves straight to `Connected`
    /// rather than waiting for an `Open` event.
    pub fn opened(mut self, opened: bool) -> Self {
        self.config.opened = opened;
        self
    }

    pub fn on_state_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        self.config.on_state_change = Some(Arc::new(hook));
        self
    }

    pub fn on_unmatched_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.config.on_unmatched_response = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

/// A transport-agnostic, bi-directional JSON-RPC peer: issues outbound calls and dispatches
/// inbound ones across a single [`MessageChannel`], sharing one id space and one routing tree.
pub struct Engine {
    channel_source: ChannelSource,
    channel: Mutex<Option<Arc<dyn MessageChannel>>>,
    state: Mutex<ConnectionState>,
    state_cv: Condvar,
    config: EngineConfig,
    router: Router,
    pending: PendingTable,
    next_id: AtomicU64,
    send_queue: Mutex<VecDeque<String>>,
    reconnect_attempts: AtomicU32,
    self_weak: Mutex<Weak<Engine>>,
}

impl Engine {
    pub fn new(channel_source: ChannelSource, routing: Arc<RoutingNode>, config: EngineConfig) -> Arc<Self> {
        let engine = Arc::new(Engine {
            channel_source,
            channel: Mutex::new(None),
            state: Mutex::new(ConnectionState::Init),
            state_cv: Condvar::new(),
            config,
            router: Router::new(routing),
            pending: PendingTable::new(),
            next_id: AtomicU64::new(1),
            send_queue: Mutex::new(VecDeque::new()),
            reconnect_attempts: AtomicU32::new(0),
            self_weak: Mutex::new(Weak::new()),
        });
        *engine.self_weak.lock().unwrap() = Arc::downgrade(&engine);
        engine
    }

    /// The root method proxy bound to this engine, the handle external callers invoke
    /// outbound calls through and handlers receive as `InvocationContext::invoke`.
    pub fn proxy(self: &Arc<Self>) -> Arc<MethodProxy> {
        MethodProxy::root(self.clone())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub fn current_channel(&self) -> Option<Arc<dyn MessageChannel>> {
        self.channel.lock().unwrap().clone()
    }

    /// Obtains a channel from the configured source, subscribes to its events, and moves to
    /// `Connecting`. The channel itself reports readiness (and later, loss) asynchronously via
    /// `ChannelEvent::Open`/`Close`/`Error`; this call does not block on that — unless
    /// `config.opened` says the channel is already live, in which case we move straight to
    /// `Connected` and flush anything already queued.
    pub fn connect(self: &Arc<Self>) {
        if matches!(self.state(), ConnectionState::Closed) {
            return;
        }
        self.set_state(ConnectionState::Connecting);
        let channel = self.channel_source.obtain();
        let weak = self.self_weak.lock().unwrap().clone();
        channel.subscribe(Arc::new(move |event| {
            if let Some(engine) = weak.upgrade() {
                engine.handle_event(event);
            }
        }));
        *self.channel.lock().unwrap() = Some(channel);
        if self.config.opened {
            self.handle_event(ChannelEvent::Open);
        }
    }

    /// Closes the connection permanently: no further reconnection is attempted and every
    /// pending call fails with `-32000`.
    pub fn close(self: &Arc<Self>) {
        if let Some(channel) = self.channel.lock().unwrap().take() {
            channel.close();
        }
        self.set_state(ConnectionState::Closed);
        self.pending.fail_all(RpcError::connection_closed());
    }

    /// Blocks the caller until the engine reaches `Connected`, `Closed`, or `timeout` elapses,
    /// whichever comes first. Returns the state observed when it stopped waiting.
    pub fn wait_for_state(&self, timeout: Duration) -> ConnectionState {
        let state = self.state.lock().unwrap();
        let (state, _) = self
            .state_cv
            .wait_timeout_while(state, timeout, |s| !matches!(s, ConnectionState::Connected | ConnectionState::Closed))
            .unwrap();
        *state
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.lock().unwrap();
            let old = *state;
            *state = new_state;
            old
        };
        self.state_cv.notify_all();
        if let Some(hook) = &self.config.on_state_change {
            hook(old_state, new_state);
        }
    }

    /// Issues an outbound call and blocks the calling thread until a response arrives or
    /// `config.call_timeout` elapses. Steps (per the engine's call contract): allocate an id,
    /// encode the request, register it in the pending table, hand it to the send path (queued
    /// if not yet connected), then wait on the completion handle.
    pub fn call(self: &Arc<Self>, method: impl Into<String>, params: Vec<Value>) -> Result<Value, RpcError> {
        let method = method.into();
        let id = Value::from(self.next_id.fetch_add(1, Ordering::SeqCst));
        let frame = RequestFrame::new(id.clone(), method.clone(), Value::Array(params));
        let payload = wire::encode(&frame);
        let pending = self.pending.register(id.clone(), method);
        self.send(payload);
        match pending.completion.wait(self.config.call_timeout) {
            Some(result) => result,
            None => {
                self.pending.remove(&id);
                Err(RpcError::timeout())
            }
        }
    }

    /// Writes `payload` now if connected, otherwise queues it for the next successful
    /// (re)connection. A write that fails against a channel believed connected is queued too,
    /// rather than dropped, so a reconnect can still deliver it.
    fn send(&self, payload: String) {
        // Held across the write itself, not just the `Arc` clone, so concurrent outbound
        // calls never interleave their writes on the channel.
        let channel_guard = self.channel.lock().unwrap();
        let connected = matches!((channel_guard.as_ref(), self.state()), (Some(_), ConnectionState::Connected));
        if connected {
            let result = channel_guard.as_ref().unwrap().write(&payload);
            drop(channel_guard);
            if result.is_err() {
                self.send_queue.lock().unwrap().push_back(payload);
            }
        } else {
            drop(channel_guard);
            self.send_queue.lock().unwrap().push_back(payload);
        }
    }

    fn flush_queue(&self) {
        let queued: Vec<String> = self.send_queue.lock().unwrap().drain(..).collect();
        let channel_guard = self.channel.lock().unwrap();
        if let Some(channel) = channel_guard.as_ref() {
            for (i, payload) in queued.iter().enumerate() {
                if channel.write(payload).is_err() {
                    let mut send_queue = self.send_queue.lock().unwrap();
                    for remaining in &queued[i..] {
                        send_queue.push_back(remaining.clone());
                    }
                    break;
                }
            }
        }
    }

    fn handle_event(self: &Arc<Self>, event: ChannelEvent) {
        match event {
            ChannelEvent::Open => {
                self.set_state(ConnectionState::Connected);
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                self.flush_queue();
            }
            ChannelEvent::Message(payload) => self.handle_message(payload),
            ChannelEvent::Close | ChannelEvent::Exit => self.handle_disconnect(),
            ChannelEvent::Error(message) => {
                logging::log_error(&format!("channel error: {message}"));
                self.handle_disconnect();
            }
        }
    }

    fn handle_disconnect(self: &Arc<Self>) {
        if matches!(self.state(), ConnectionState::Closed) {
            return;
        }
        self.pending.fail_all(RpcError::connection_closed());
        let attempts = self.reconnect_attempts.load(Ordering::SeqCst);
        let should_reconnect = self.channel_source.supports_reconnect() && attempts < self.config.max_reconnect_attempts;
        if should_reconnect {
            self.set_state(ConnectionState::Reconnecting);
            self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
            let engine = self.clone();
            let backoff = self.config.reconnect_backoff;
            thread::spawn(move || {
                thread::sleep(backoff);
                engine.connect();
            });
        } else {
            self.set_state(ConnectionState::Closed);
        }
    }

    /// Classifies the decoded frame and either completes a pending outbound call (cheap,
    /// handled inline) or runs the inbound request through the router on a dedicated worker
    /// thread, so a slow or blocking handler never holds up the channel's own callback thread.
    fn handle_message(self: &Arc<Self>, payload: String) {
        match wire::decode(&payload) {
            IncomingFrame::Request(request) => {
                let engine = self.clone();
                thread::spawn(move || engine.dispatch_request(request));
            }
            IncomingFrame::Response(response) => self.dispatch_response(response),
            IncomingFrame::Unparseable => {
                self.send(wire::encode(&wire::parse_error_frame()));
            }
        }
    }

    fn dispatch_request(self: &Arc<Self>, request: RequestFrame) {
        let id = request.id.clone();
        let params = match request.params_array() {
            Ok(p) => p,
            Err(e) => {
                self.send(wire::encode(&ResponseFrame::failure(id, &e)));
                return;
            }
        };
        let invoke = self.proxy();
        let method = request.method;
        let id_for_dispatch = id.clone();
        let router = &self.router;
        // A handler panic maps to -32603, the same code a handler-returned error without an
        // explicit code gets, so the caller still gets a response instead of waiting out the
        // full timeout for a reply that was never coming.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            router.dispatch(id_for_dispatch, method, params, invoke)
        }));
        let response = match outcome {
            Ok(Ok(value)) => ResponseFrame::success(id, value),
            Ok(Err(e)) => ResponseFrame::failure(id, &e),
            Err(_) => ResponseFrame::failure(id, &RpcError::internal_error("Internal error.")),
        };
        self.send(wire::encode(&response));
    }

    fn dispatch_response(&self, response: ResponseFrame) {
        let id = response.id.clone();
        let result = response.into_result();
        if !self.pending.resolve(&id, result) {
            match &self.config.on_unmatched_response {
                Some(hook) => hook(id),
                None => logging::log(&format!("unmatched response id={id}")),
            }
        }
    }
}
