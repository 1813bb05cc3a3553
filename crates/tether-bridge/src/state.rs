//! Connection lifecycle states.

use std::fmt;

/// Lifecycle state of the logical connection.
///
/// Owned exclusively by the supervisor; handlers never mutate it. All
/// transitions happen inside the tick or a connect attempt's own
/// continuation, with the state lock held across the check-and-set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Idle,
    /// Probing the peer's side-channel health endpoint.
    HealthChecking,
    /// Opening the transport connection.
    Connecting,
    /// Transport open, hello not yet sent.
    Handshaking,
    /// Usable: transport open and hello delivered.
    Open,
    /// Teardown in progress.
    Closing,
    /// A fatal error was detected; cleanup pending.
    Failed,
}

impl ConnectionState {
    /// Whether the connection is usable for commands.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Whether `connect()` may begin an attempt from this state.
    ///
    /// Any in-flight attempt or open connection makes `connect()` a guarded
    /// no-op, so concurrent callers can never open two sockets.
    #[must_use]
    pub fn can_begin_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::HealthChecking => "health-checking",
            Self::Connecting => "connecting",
            Self::Handshaking => "handshaking",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
