//! Side-channel health status body.
//!
//! Served by the tool server on plain HTTP, probed by the editor as a
//! pre-flight gate before any stateful connection attempt. Never used for
//! data exchange.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::envelope::now_rfc3339;

/// Status string reported while the server is able to accept a bridge.
pub const STATUS_OK: &str = "ok";

/// Health probe response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// `"ok"` when the server is ready to accept the bridge connection.
    pub status: String,
    /// Tool-server crate version.
    pub version: String,
    /// Seconds since the server started.
    pub uptime_seconds: u64,
    /// Whether an editor bridge is currently attached.
    pub connected: bool,
    /// ISO-8601 time the probe was answered.
    pub timestamp: String,
}

impl HealthStatus {
    /// Build a status body from live counters.
    #[must_use]
    pub fn current(start_time: Instant, connected: bool) -> Self {
        Self {
            status: STATUS_OK.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            uptime_seconds: start_time.elapsed().as_secs(),
            connected,
            timestamp: now_rfc3339(),
        }
    }

    /// Whether the probe body gates a connection attempt open.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }
}
