//! Envelope decode/dispatch and serialized outbound writes.
//!
//! One complete text frame is exactly one envelope (the transport layer
//! stitches partial frames before the router ever sees them). Decode
//! failures and unknown kinds are logged and dropped — a single malformed
//! message must never tear down the socket, and new message kinds must not
//! crash either peer.
//!
//! Outbound frames from all logical sources (heartbeats, log forwarding,
//! command replies) funnel through one bounded channel drained by a single
//! writer task, so a frame is always fully written before the next begins.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tether_core::envelope::reply_kind;
use tether_core::{BridgeError, Envelope, Result};

/// What a handler produced for an inbound envelope.
pub enum Routed {
    /// A reply to send immediately.
    Reply(Envelope),
    /// Nothing to send now; the handler arranged any later reply itself.
    None,
}

/// Handler registered for one message kind.
///
/// `handle` must return quickly: slow work belongs on a queue the handler
/// enqueues to before returning (such as a privileged-context submission),
/// with the eventual reply sent through the router from there. That keeps
/// dispatch in frame-arrival order without ever blocking the receive loop
/// on a pending continuation.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    /// React to the payload of an inbound envelope of this kind.
    async fn handle(&self, payload: Value) -> Result<Routed>;
}

/// Outcome of a fire-and-forget send attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Frame enqueued for the writer task.
    Sent,
    /// No connection instance is bound.
    NotBound,
    /// A connection is bound but the write queue is closed or full.
    Failed,
}

/// Decodes inbound frames, dispatches by kind, serializes outbound frames.
pub struct MessageRouter {
    handlers: RwLock<HashMap<String, Arc<dyn EnvelopeHandler>>>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    dropped: AtomicU64,
}

impl MessageRouter {
    /// Create a router with no handlers and no bound connection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            outbound: Mutex::new(None),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register the handler for a message kind (latest wins).
    pub fn register(&self, kind: &str, handler: impl EnvelopeHandler + 'static) {
        let _ = self
            .handlers
            .write()
            .insert(kind.to_owned(), Arc::new(handler));
    }

    /// Bind the write queue of a fresh connection instance.
    pub fn bind_outbound(&self, tx: mpsc::Sender<String>) {
        *self.outbound.lock() = Some(tx);
    }

    /// Drop the bound write queue; subsequent sends fail fast.
    pub fn unbind_outbound(&self) {
        *self.outbound.lock() = None;
    }

    /// Whether a connection instance is currently bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.outbound.lock().is_some()
    }

    /// Frames dropped because the write queue was closed or full.
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Serialize and enqueue an envelope, reporting the outcome.
    pub fn try_send(&self, envelope: &Envelope) -> SendOutcome {
        let Ok(json) = envelope.to_json() else {
            warn!(kind = %envelope.kind, "failed to serialize outbound envelope");
            return SendOutcome::Failed;
        };
        let tx = match self.outbound.lock().as_ref() {
            Some(tx) => tx.clone(),
            None => return SendOutcome::NotBound,
        };
        if tx.try_send(json).is_ok() {
            counter!("bridge_envelopes_sent_total", "kind" => envelope.kind.clone()).increment(1);
            SendOutcome::Sent
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!("bridge_frames_dropped_total").increment(1);
            SendOutcome::Failed
        }
    }

    /// Send an envelope, surfacing failure to the caller as an error.
    pub fn send(&self, kind: &str, payload: Value) -> Result<()> {
        match self.try_send(&Envelope::new(kind, payload)) {
            SendOutcome::Sent => Ok(()),
            SendOutcome::NotBound => Err(BridgeError::NotConnected),
            SendOutcome::Failed => Err(BridgeError::transport("write queue closed or full")),
        }
    }

    /// Decode and dispatch one complete inbound text frame.
    ///
    /// Frames are dispatched strictly in arrival order; work a handler
    /// enqueued elsewhere completes concurrently without holding up the
    /// next frame.
    pub async fn on_frame(&self, raw: &str) {
        let envelope = match Envelope::from_json(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                counter!("bridge_decode_failures_total").increment(1);
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };
        counter!("bridge_envelopes_received_total", "kind" => envelope.kind.clone()).increment(1);

        let handler = self.handlers.read().get(&envelope.kind).cloned();
        let Some(handler) = handler else {
            debug!(kind = %envelope.kind, "ignoring envelope of unknown kind");
            return;
        };

        let kind = envelope.kind;
        match handler.handle(envelope.payload).await {
            Ok(Routed::Reply(reply)) => {
                if self.try_send(&reply) != SendOutcome::Sent {
                    warn!(kind = %reply.kind, "failed to send reply");
                }
            }
            Ok(Routed::None) => {}
            Err(e) => match reply_kind(&kind) {
                Some(reply) => {
                    let _ = self.try_send(&Envelope::error_reply(reply, e.to_string()));
                }
                None => warn!(kind, error = %e, "handler failed for kind without a reply"),
            },
        }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}
