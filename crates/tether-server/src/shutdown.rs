//! Shutdown signaling for the server's tasks.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long `drain` waits for tasks before giving up on them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fan-out cancellation for the accept loop and live sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A token that resolves when shutdown is triggered.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown; idempotent.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown and wait for the given tasks, bounded by
    /// [`DRAIN_TIMEOUT`].
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>) {
        self.trigger();
        info!(tasks = handles.len(), "draining server tasks");
        let all = futures::future::join_all(handles);
        if tokio::time::timeout(DRAIN_TIMEOUT, all).await.is_err() {
            warn!("drain timed out after {DRAIN_TIMEOUT:?}");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
