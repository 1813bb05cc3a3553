//! Bridge error taxonomy.
//!
//! Only [`BridgeError::Transport`] and a heartbeat [`BridgeError::Timeout`]
//! escalate to a full disconnect; everything else is local and recoverable.
//! Callers always see either a structured payload or one of these errors
//! within the declared timeout, never an unhandled fault.

use thiserror::Error;

/// Result alias used across the bridge crates.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Why the pre-flight health gate refused a connection attempt.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateFailure {
    /// The side-channel endpoint could not be reached at all.
    #[error("peer unreachable: {message}")]
    Unreachable {
        /// Transport-level detail.
        message: String,
    },

    /// The endpoint answered but reported a non-ok status.
    #[error("peer unhealthy: status {status}")]
    Unhealthy {
        /// The status string the probe returned.
        status: String,
    },

    /// The probe did not complete within the gate timeout.
    #[error("health probe timed out after {timeout_ms}ms")]
    Timeout {
        /// Gate timeout that elapsed.
        timeout_ms: u64,
    },
}

/// Errors surfaced by the bridge protocol and lifecycle layers.
#[derive(Clone, Debug, Error)]
pub enum BridgeError {
    /// Pre-flight gate refused the attempt; no socket was opened.
    #[error("health gate failed: {0}")]
    Gate(#[from] GateFailure),

    /// Connect/send/receive failure on the stateful connection.
    #[error("transport failure: {message}")]
    Transport {
        /// Transport-level detail.
        message: String,
    },

    /// Malformed or unexpected envelope; logged, never a teardown.
    #[error("protocol error: {message}")]
    Protocol {
        /// What was malformed.
        message: String,
    },

    /// A reply or heartbeat did not arrive in time.
    #[error("{context} timed out after {timeout_ms}ms")]
    Timeout {
        /// What was being waited on.
        context: String,
        /// The elapsed bound.
        timeout_ms: u64,
    },

    /// The opaque handler failed; serialized as `{error}` in the reply.
    #[error("{message}")]
    Handler {
        /// Handler-provided description.
        message: String,
    },

    /// The peer is not connected; reported before touching the correlator.
    #[error("peer not connected")]
    NotConnected,

    /// The connection dropped while the request was in flight.
    #[error("connection lost")]
    ConnectionLost,
}

impl BridgeError {
    /// Shorthand for a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Shorthand for a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Shorthand for a handler failure.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Whether this error escalates to a forced disconnect.
    ///
    /// Gate, protocol, handler, and per-request timeout errors are local;
    /// the reconnect cadence or the specific waiter absorbs them.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::ConnectionLost)
    }
}
