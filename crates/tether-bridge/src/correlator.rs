//! Request/reply correlation without wire-level request identifiers.
//!
//! Envelopes carry no request id, so replies are matched to callers by
//! reply kind in FIFO order: the next inbound reply of a kind resolves the
//! oldest still-pending waiter for that kind. This is correct ONLY because
//! the editor's privileged context processes one command at a time in
//! submission order (see [`crate::dispatch`]); replies therefore arrive in
//! issue order. Violating that single-flight assumption on the editor side
//! would resolve replies to the wrong waiters.
//!
//! Every waiter resolves within its declared timeout: with the reply, with
//! a timeout error, or — when the connection drops — with a
//! connection-lost error. No caller is ever left suspended.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::router::{EnvelopeHandler, MessageRouter, Routed};
use tether_core::envelope::{kinds, reply_kind};
use tether_core::{BridgeError, Result};

/// One caller waiting for a reply of a particular kind.
struct Waiter {
    seq: u64,
    created_at: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

/// Matches outbound requests to inbound replies, per reply kind, FIFO.
pub struct RequestCorrelator {
    router: Arc<MessageRouter>,
    pending: Mutex<HashMap<String, VecDeque<Waiter>>>,
    next_seq: AtomicU64,
}

impl RequestCorrelator {
    /// Create a correlator sending through the given router.
    #[must_use]
    pub fn new(router: Arc<MessageRouter>) -> Self {
        Self {
            router,
            pending: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Register reply handlers for every request kind on the router.
    ///
    /// Inbound reply envelopes then resolve waiters automatically; replies
    /// with no waiter are logged and dropped.
    pub fn attach(this: &Arc<Self>, router: &MessageRouter) {
        for request in [
            kinds::EXECUTE_COMMAND,
            kinds::GET_STATE,
            kinds::GET_OBJECT_DETAILS,
            kinds::TAKE_SCREENSHOT,
            kinds::MANIPULATE_SCENE,
            kinds::MANAGE_ASSETS,
        ] {
            if let Some(reply) = reply_kind(request) {
                router.register(
                    reply,
                    ReplyHandler {
                        correlator: Arc::clone(this),
                        reply_kind: reply,
                    },
                );
            }
        }
    }

    /// Issue a request and wait for its reply under `timeout`.
    ///
    /// The waiter is registered before the send, so a reply racing the
    /// caller cannot be lost. On timeout exactly this waiter is withdrawn;
    /// a reply arriving later finds no waiter and is dropped.
    pub async fn issue(&self, kind: &str, payload: Value, timeout: Duration) -> Result<Value> {
        let Some(reply) = reply_kind(kind) else {
            return Err(BridgeError::protocol(format!(
                "kind '{kind}' expects no reply"
            )));
        };

        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.pending
            .lock()
            .entry(reply.to_owned())
            .or_default()
            .push_back(Waiter {
                seq,
                created_at: Instant::now(),
                tx,
            });

        if let Err(e) = self.router.send(kind, payload) {
            self.withdraw(reply, seq);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_closed)) => Err(BridgeError::ConnectionLost),
            Err(_elapsed) => {
                self.withdraw(reply, seq);
                Err(BridgeError::Timeout {
                    context: format!("{reply} reply"),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }

    /// Resolve the oldest waiter for `reply` with this payload.
    ///
    /// A payload carrying an `error` field resolves the waiter with a
    /// failure. Returns `false` when no waiter was pending (late reply).
    pub fn resolve(&self, reply: &str, payload: Value) -> bool {
        let waiter = {
            let mut pending = self.pending.lock();
            pending.get_mut(reply).and_then(VecDeque::pop_front)
        };
        let Some(waiter) = waiter else {
            return false;
        };

        debug!(
            reply,
            waited_ms = u64::try_from(waiter.created_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "resolving pending request"
        );
        let outcome = match payload.get("error").and_then(Value::as_str) {
            Some(message) => Err(BridgeError::handler(message)),
            None => Ok(payload),
        };
        let _ = waiter.tx.send(outcome);
        true
    }

    /// Reject every pending waiter across all kinds.
    ///
    /// Called on connection loss so callers do not hang past a detected
    /// disconnect.
    pub fn fail_all(&self, error: &BridgeError) {
        let drained: Vec<Waiter> = {
            let mut pending = self.pending.lock();
            pending.drain().flat_map(|(_, queue)| queue).collect()
        };
        if !drained.is_empty() {
            warn!(count = drained.len(), %error, "rejecting pending requests");
        }
        for waiter in drained {
            let _ = waiter.tx.send(Err(error.clone()));
        }
    }

    /// Number of waiters currently pending across all kinds.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().values().map(VecDeque::len).sum()
    }

    fn withdraw(&self, reply: &str, seq: u64) {
        let mut pending = self.pending.lock();
        if let Some(queue) = pending.get_mut(reply) {
            queue.retain(|w| w.seq != seq);
        }
    }
}

/// Router handler feeding inbound replies into the correlator.
struct ReplyHandler {
    correlator: Arc<RequestCorrelator>,
    reply_kind: &'static str,
}

#[async_trait]
impl EnvelopeHandler for ReplyHandler {
    async fn handle(&self, payload: Value) -> Result<Routed> {
        if !self.correlator.resolve(self.reply_kind, payload) {
            debug!(kind = self.reply_kind, "dropping reply with no pending waiter");
        }
        Ok(Routed::None)
    }
}
