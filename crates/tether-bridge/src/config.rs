//! Bridge configuration with environment variable overrides.
//!
//! Defaults carry the protocol's timing contract: 2 s health gate, 5 s
//! connect, 5 s reconnect cadence, 10 s heartbeat interval with a 20 s
//! liveness timeout, 30 s reply wait (60 s for command execution).
//!
//! Env vars use strict parsing — integers must be in range, booleans accept
//! `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off` — and invalid values are
//! silently ignored, falling back to the default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the initiating (editor) side of the bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// WebSocket endpoint of the tool server.
    pub server_url: String,
    /// Side-channel health endpoint probed before every connect attempt.
    pub health_url: String,
    /// Health-gate probe timeout in milliseconds.
    pub gate_timeout_ms: u64,
    /// Transport connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Reconnect cadence while unusable, in milliseconds.
    pub reconnect_interval_ms: u64,
    /// Interval between outbound `ping` envelopes, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Liveness timeout: force-disconnect when no `pong` for this long.
    pub heartbeat_timeout_ms: u64,
    /// Reply wait for ordinary commands, in milliseconds.
    pub reply_timeout_ms: u64,
    /// Reply wait for heavy commands (`executeCommand`), in milliseconds.
    pub heavy_reply_timeout_ms: u64,
    /// Log ring-buffer capacity.
    pub log_capacity: usize,
    /// Outbound write-queue depth (frames waiting on the writer task).
    pub outbound_queue: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:8765/bridge".into(),
            health_url: "http://127.0.0.1:8765/health".into(),
            gate_timeout_ms: 2_000,
            connect_timeout_ms: 5_000,
            reconnect_interval_ms: 5_000,
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 20_000,
            reply_timeout_ms: 30_000,
            heavy_reply_timeout_ms: 60_000,
            log_capacity: tether_core::logs::DEFAULT_LOG_CAPACITY,
            outbound_queue: 256,
        }
    }
}

impl BridgeConfig {
    /// Load defaults with `TETHER_*` environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `TETHER_*` environment overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = read_env_string("TETHER_SERVER_URL") {
            self.server_url = v;
        }
        if let Some(v) = read_env_string("TETHER_HEALTH_URL") {
            self.health_url = v;
        }
        if let Some(v) = read_env_u64("TETHER_GATE_TIMEOUT_MS", 100, 60_000) {
            self.gate_timeout_ms = v;
        }
        if let Some(v) = read_env_u64("TETHER_CONNECT_TIMEOUT_MS", 100, 60_000) {
            self.connect_timeout_ms = v;
        }
        if let Some(v) = read_env_u64("TETHER_RECONNECT_INTERVAL_MS", 100, 600_000) {
            self.reconnect_interval_ms = v;
        }
        if let Some(v) = read_env_u64("TETHER_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
            self.heartbeat_interval_ms = v;
        }
        if let Some(v) = read_env_u64("TETHER_HEARTBEAT_TIMEOUT_MS", 100, 600_000) {
            self.heartbeat_timeout_ms = v;
        }
        if let Some(v) = read_env_u64("TETHER_REPLY_TIMEOUT_MS", 100, 3_600_000) {
            self.reply_timeout_ms = v;
        }
        if let Some(v) = read_env_u64("TETHER_HEAVY_REPLY_TIMEOUT_MS", 100, 3_600_000) {
            self.heavy_reply_timeout_ms = v;
        }
        if let Some(v) = read_env_usize("TETHER_LOG_CAPACITY", 1, 1_000_000) {
            self.log_capacity = v;
        }
    }

    /// Health-gate probe timeout.
    #[must_use]
    pub fn gate_timeout(&self) -> Duration {
        Duration::from_millis(self.gate_timeout_ms)
    }

    /// Transport connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reconnect cadence.
    #[must_use]
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// Heartbeat send interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Heartbeat liveness timeout.
    #[must_use]
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Reply wait for the given request kind.
    #[must_use]
    pub fn reply_timeout_for(&self, kind: &str) -> Duration {
        if kind == tether_core::envelope::kinds::EXECUTE_COMMAND {
            Duration::from_millis(self.heavy_reply_timeout_ms)
        } else {
            Duration::from_millis(self.reply_timeout_ms)
        }
    }
}

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
#[must_use]
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| (min..=max).contains(v))
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| (min..=max).contains(v))
}
