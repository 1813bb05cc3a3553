//! Best-effort log forwarding and the queryable log buffer.
//!
//! The editor side hooks its process-wide log stream: every record lands in
//! the local ring buffer and, while the connection is usable, is forwarded
//! fire-and-forget as a `log` envelope. A forwarding failure requests a
//! disconnect through the installed hook and must not emit log events of
//! its own — a log-forwarding failure generating a log record would
//! trigger another forwarding attempt, and so on.
//!
//! The tool-server side ingests inbound `log` envelopes into its own buffer
//! and answers filtered queries from it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::router::{EnvelopeHandler, MessageRouter, Routed, SendOutcome};
use tether_core::envelope::kinds;
use tether_core::logs::{LogBuffer, LogQuery, LogRecord};
use tether_core::{Envelope, Result};

/// Callback invoked when a forward attempt fails on a live connection.
pub type ForwardFailureHook = Box<dyn Fn() + Send + Sync>;

/// Bounded log accumulator with opportunistic forwarding.
pub struct LogRelay {
    router: Arc<MessageRouter>,
    buffer: Mutex<LogBuffer>,
    forwarding: AtomicBool,
    on_forward_failure: Mutex<Option<ForwardFailureHook>>,
}

impl LogRelay {
    /// Create a relay with a ring buffer of `capacity` records.
    #[must_use]
    pub fn new(router: Arc<MessageRouter>, capacity: usize) -> Self {
        Self {
            router,
            buffer: Mutex::new(LogBuffer::new(capacity)),
            forwarding: AtomicBool::new(false),
            on_forward_failure: Mutex::new(None),
        }
    }

    /// Install the hook run when forwarding fails on a bound connection.
    ///
    /// The supervisor installs a force-disconnect here. The hook runs with
    /// the re-entrancy guard held, so a record emitted from inside it is
    /// buffered but never forwarded.
    pub fn set_forward_failure_hook(&self, hook: ForwardFailureHook) {
        *self.on_forward_failure.lock() = Some(hook);
    }

    /// Append a host log record and forward it if the connection is bound.
    pub fn record(&self, record: LogRecord) {
        self.buffer.lock().push(record.clone());

        // Guard against recursion: a failure hook (or anything it calls)
        // that emits a log record must not start another forward attempt.
        if self.forwarding.swap(true, Ordering::AcqRel) {
            return;
        }
        let payload = serde_json::to_value(&record).unwrap_or(Value::Null);
        let outcome = self.router.try_send(&Envelope::new(kinds::LOG, payload));
        if outcome == SendOutcome::Failed {
            if let Some(hook) = self.on_forward_failure.lock().as_ref() {
                hook();
            }
        }
        self.forwarding.store(false, Ordering::Release);
    }

    /// Append an inbound `log` envelope payload to the local buffer.
    pub fn ingest(&self, payload: Value) {
        match serde_json::from_value::<LogRecord>(payload) {
            Ok(record) => self.buffer.lock().push(record),
            Err(e) => warn!(error = %e, "dropping malformed log record"),
        }
    }

    /// Evaluate a query against the buffer.
    #[must_use]
    pub fn get_logs(&self, query: &LogQuery) -> Vec<Value> {
        self.buffer.lock().query(query)
    }

    /// Number of buffered records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Copy of the buffered records, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.buffer.lock().snapshot()
    }

    /// Register this relay as the `log` handler on a router.
    pub fn attach_ingest(this: &Arc<Self>, router: &MessageRouter) {
        router.register(
            kinds::LOG,
            IngestHandler {
                relay: Arc::clone(this),
            },
        );
    }
}

/// Router handler appending inbound `log` envelopes to the relay buffer.
struct IngestHandler {
    relay: Arc<LogRelay>,
}

#[async_trait]
impl EnvelopeHandler for IngestHandler {
    async fn handle(&self, payload: Value) -> Result<Routed> {
        self.relay.ingest(payload);
        Ok(Routed::None)
    }
}
