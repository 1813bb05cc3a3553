//! Privileged execution context boundary.
//!
//! The editor's state-mutating APIs are only safe on one privileged
//! execution context. [`PrivilegedDispatch`] is the seam the bridge's
//! handlers use to marshal work there and await its result.
//!
//! Contract: `submit` enqueues the work before returning its future, and
//! the privileged context runs queued work in enqueue order, exactly once,
//! with no reentrancy — a unit submitted while another is pending waits its
//! turn. The request correlator's FIFO-without-request-ids policy is sound
//! ONLY because of this ordering: with at most one privileged operation in
//! flight per command kind, replies leave the editor in the order the
//! requests arrived. An implementation that parallelized submitted work
//! would mismatch replies to the wrong waiters.

use futures::future::BoxFuture;
use serde_json::Value;

use tether_core::{BridgeError, Result};

/// Result of one privileged unit of work; the `Err` case becomes the wire
/// `{error}` field of the reply.
pub type PrivilegedResult = std::result::Result<Value, String>;

/// A unit of work to run on the privileged context.
pub type PrivilegedJob = Box<dyn FnOnce() -> PrivilegedResult + Send + 'static>;

/// Scheduling primitive marshaling work onto the privileged context.
pub trait PrivilegedDispatch: Send + Sync {
    /// Enqueue `work` for the privileged context and return a future that
    /// resolves with its result.
    ///
    /// The enqueue happens before this method returns, so the order of
    /// `submit` calls is the order of execution even when the returned
    /// futures are awaited concurrently.
    fn submit(&self, work: PrivilegedJob) -> BoxFuture<'static, Result<Value>>;
}

/// Map a dropped-result channel into the bridge error vocabulary.
///
/// Shared by implementations: a dispatcher that shut down mid-flight
/// surfaces as a lost connection to the caller, not a panic.
#[must_use]
pub fn dispatcher_gone() -> BridgeError {
    BridgeError::transport("privileged dispatcher stopped")
}
