//! The transport boundary: a [`MessageChannel`] is anything that can carry frames for the
//! engine without the engine knowing what it actually is (a socket, a pipe, an in-memory
//! test pair). This crate implements the engine side of that contract only — it ships no
//! concrete transport.

use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is not open")]
    NotOpen,
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// One event a [`MessageChannel`] reports to its subscriber.
///
/// Mirrors the four cases the original JS `MessageChannel` duck-type probes for across its
/// several supported event-naming conventions (`message`/`data`, `open`/`connect`,
/// `close`/`disconnect`, `error`) plus a process-level `exit`, folded here into one enum since
/// Rust has no need to guess at a naming convention.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Message(String),
    Open,
    Close,
    Error(String),
    Exit,
}

/// A subscriber callback invoked for every [`ChannelEvent`] the channel produces.
pub type EventListener = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

/// The engine's view of a transport: write a frame out, and subscribe to receive frames
/// and lifecycle events back in.
pub trait MessageChannel: Send + Sync {
    /// Writes one already-encoded frame to the transport.
    fn write(&self, payload: &str) -> Result<(), ChannelError>;

    /// Registers the engine's event sink. Called once, at engine construction.
    fn subscribe(&self, listener: EventListener);

    /// Tears down the transport. Optional: most channels close themselves when dropped, so
    /// the default is a no-op rather than forcing every implementor to write one.
    fn close(&self) {}
}

/// How the engine obtains a channel: a single fixed instance, or a factory invoked again on
/// every reconnect attempt (so each attempt gets a fresh connection rather than retrying a
/// channel that is already known to be dead).
pub enum ChannelSource {
    Fixed(Arc<dyn MessageChannel>),
    Factory(Arc<dyn Fn() -> Arc<dyn MessageChannel> + Send + Sync>),
}

impl ChannelSource {
    pub fn fixed(channel: Arc<dyn MessageChannel>) -> Self {
        ChannelSource::Fixed(channel)
    }

    pub fn factory<F>(f: F) -> Self
    where
        F: Fn() -> Arc<dyn MessageChannel> + Send + Sync + 'static,
    {
        ChannelSource::Factory(Arc::new(f))
    }

    /// Produces a channel instance: the fixed one (reused across calls) or a fresh one
    /// from the factory.
    pub fn obtain(&self) -> Arc<dyn MessageChannel> {
        match self {
            ChannelSource::Fixed(c) => c.clone(),
            ChannelSource::Factory(f) => f(),
        }
    }

    /// Whether reconnection is even meaningful for this source. A fixed channel that drops
    /// cannot be recreated; only a factory-backed source supports retrying.
    pub fn supports_reconnect(&self) -> bool {
        matches!(self, ChannelSource::Factory(_))
    }
}

impl fmt::Debug for ChannelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelSource::Fixed(_) => f.write_str("ChannelSource::Fixed(..)"),
            ChannelSource::Factory(_) => f.write_str("ChannelSource::Factory(..)"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory channel pair for exercising the engine end to end without a real
    /// transport. `connect()` returns two channels; writes to one fire as `Message` events
    /// on the other's subscriber.
    pub struct InMemoryChannel {
        peer: Mutex<Option<Arc<InMemoryChannel>>>,
        listener: Mutex<Option<EventListener>>,
        closed: std::sync::atomic::AtomicBool,
    }

    impl InMemoryChannel {
        pub fn connect() -> (Arc<InMemoryChannel>, Arc<InMemoryChannel>) {
            let a = Arc::new(InMemoryChannel {
                peer: Mutex::new(None),
                listener: Mutex::new(None),
                closed: std::sync::atomic::AtomicBool::new(false),
            });
            let b = Arc::new(InMemoryChannel {
                peer: Mutex::new(None),
                listener: Mutex::new(None),
                closed: std::sync::atomic::AtomicBool::new(false),
            });
            *a.peer.lock().unwrap() = Some(b.clone());
            *b.peer.lock().unwrap() = Some(a.clone());
            (a, b)
        }

        pub fn was_closed(&self) -> bool {
            self.closed.load(std::sync::atomic::Ordering::SeqCst)
        }

        pub fn fire_open(&self) {
            if let Some(listener) = self.listener.lock().unwrap().as_ref() {
                listener(ChannelEvent::Open);
            }
        }

        pub fn fire_close(&self) {
            if let Some(listener) = self.listener.lock().unwrap().as_ref() {
                listener(ChannelEvent::Close);
            }
        }

        /// Severs the link without notifying the peer, so writes start failing as if the
        /// transport died underneath the engine.
        pub fn sever(&self) {
            *self.peer.lock().unwrap() = None;
        }
    }

    impl MessageChannel for InMemoryChannel {
        fn write(&self, payload: &str) -> Result<(), ChannelError> {
            let peer = self.peer.lock().unwrap();
            match peer.as_ref() {
                Some(p) => {
                    if let Some(listener) = p.listener.lock().unwrap().as_ref() {
                        listener(ChannelEvent::Message(payload.to_string()));
                    }
                    Ok(())
                }
                None => Err(ChannelError::NotOpen),
            }
        }

        fn subscribe(&self, listener: EventListener) {
            *self.listener.lock().unwrap() = Some(listener);
        }

        fn close(&self) {
            self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[test]
    fn write_delivers_message_to_peer_subscriber() {
        let (a, b) = InMemoryChannel::connect();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        b.subscribe(Arc::new(move |event| {
            if let ChannelEvent::Message(m) = event {
                received_clone.lock().unwrap().push(m);
            }
        }));
        a.write("hello").unwrap();
        assert_eq!(received.lock().unwrap().as_slice(), ["hello".to_string()]);
    }

    #[test]
    fn write_after_sever_fails() {
        let (a, b) = InMemoryChannel::connect();
        b.sever();
        assert!(matches!(a.write("x"), Err(ChannelError::NotOpen)));
    }
}
