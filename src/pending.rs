//! Bookkeeping for outbound calls awaiting a response: the id-keyed pending table and the
//! one-shot completion primitive each entry resolves through.

use crate::error::RpcError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A small hand-rolled, `Mutex`-guarded one-shot completion primitive: one slot, written once,
/// waited on by any number of readers, rather than pulling in an async channel crate for a
/// need this narrow.
pub struct OneShot<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T: Clone> OneShot<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(OneShot { slot: Mutex::new(None), ready: Condvar::new() })
    }

    /// Fills the slot and wakes any waiter. A second call is a no-op: only the first
    /// completion wins, matching "a request is resolved exactly once".
    pub fn complete(&self, value: T) {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_none() {
            *slot = Some(value);
            self.ready.notify_all();
        }
    }

    /// Blocks until completed, or returns `None` if `timeout` elapses first.
    pub fn wait(&self, timeout: Duration) -> Option<T> {
        let slot = self.slot.lock().unwrap();
        if let Some(v) = slot.as_ref() {
            return Some(v.clone());
        }
        let (slot, result) = self.ready.wait_timeout_while(slot, timeout, |s| s.is_none()).unwrap();
        if result.timed_out() {
            None
        } else {
            slot.clone()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

/// One outbound call's bookkeeping: the completion handle a waiting caller blocks on, and
/// the id it was registered under (kept for diagnostics on timeout/disconnect).
pub struct PendingRequest {
    pub id: Value,
    pub method: String,
    pub completion: Arc<OneShot<Result<Value, RpcError>>>,
}

/// The id-keyed table of in-flight outbound calls. One per engine instance; protected by a
/// single mutex since entries are added/removed relatively rarely compared to how often a
/// response arrives and must be matched against it.
#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<String, Arc<PendingRequest>>>,
}

impl PendingTable {
    pub fn new() -> Self {
        PendingTable { entries: Mutex::new(HashMap::new()) }
    }

    pub fn register(&self, id: Value, method: String) -> Arc<PendingRequest> {
        let request = Arc::new(PendingRequest { id: id.clone(), method, completion: OneShot::new() });
        self.entries.lock().unwrap().insert(id_key(&id), request.clone());
        request
    }

    /// Completes and removes the entry for `id`, if one is still pending. Returns `false`
    /// if no entry matched (e.g. a response for an id we never sent, or one that already
    /// timed out and was reaped) — callers use this to decide whether to fire the
    /// unmatched-response diagnostic hook.
    pub fn resolve(&self, id: &Value, result: Result<Value, RpcError>) -> bool {
        let entry = self.entries.lock().unwrap().remove(&id_key(id));
        match entry {
            Some(request) => {
                request.completion.complete(result);
                true
            }
            None => false,
        }
    }

    /// Removes the entry for `id` without resolving it. Used once a waiter's own timeout
    /// has already completed the `OneShot` locally, so the table doesn't keep a dead entry.
    pub fn remove(&self, id: &Value) {
        self.entries.lock().unwrap().remove(&id_key(id));
    }

    /// Drains every pending entry and resolves each with `error`. Called on disconnect so no
    /// caller blocks forever on a channel that is never coming back.
    pub fn fail_all(&self, error: RpcError) {
        let drained: Vec<_> = self.entries.lock().unwrap().drain().map(|(_, v)| v).collect();
        for request in drained {
            request.completion.complete(Err(error.clone()));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn id_key(id: &Value) -> String {
    serde_json::to_string(id).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn resolve_completes_the_matching_waiter() {
        let table = PendingTable::new();
        let request = table.register(Value::from(1), "test".to_string());
        assert!(table.resolve(&Value::from(1), Ok(Value::from(42))));
        assert_eq!(request.completion.wait(Duration::from_secs(1)).unwrap().unwrap(), Value::from(42));
    }

    #[test]
    fn resolve_unknown_id_returns_false() {
        let table = PendingTable::new();
        assert!(!table.resolve(&Value::from(99), Ok(Value::Null)));
    }

    #[test]
    fn wait_times_out_without_completion() {
        let one_shot: Arc<OneShot<Result<Value, RpcError>>> = OneShot::new();
        let started = Instant::now();
        let result = one_shot.wait(Duration::from_millis(50));
        assert!(result.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn fail_all_resolves_every_pending_entry() {
        let table = PendingTable::new();
        let r1 = table.register(Value::from(1), "a".to_string());
        let r2 = table.register(Value::from(2), "b".to_string());
        table.fail_all(RpcError::connection_closed());
        assert_eq!(r1.completion.wait(Duration::from_secs(1)).unwrap().unwrap_err().code, -32000);
        assert_eq!(r2.completion.wait(Duration::from_secs(1)).unwrap().unwrap_err().code, -32000);
        assert!(table.is_empty());
    }

    #[test]
    fn completion_is_visible_across_threads() {
        let one_shot: Arc<OneShot<Result<Value, RpcError>>> = OneShot::new();
        let clone = one_shot.clone();
        let handle = thread::spawn(move || {
            clone.complete(Ok(Value::from("done")));
        });
        let result = one_shot.wait(Duration::from_secs(2));
        handle.join().unwrap();
        assert_eq!(result.unwrap().unwrap(), Value::from("done"));
    }
}
