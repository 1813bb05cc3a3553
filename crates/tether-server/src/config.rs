//! Tool-server configuration with environment variable overrides.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the accepting (tool-server) side of the bridge.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Reply wait for ordinary commands, in milliseconds.
    pub reply_timeout_ms: u64,
    /// Reply wait for heavy commands (`executeCommand`), in milliseconds.
    pub heavy_reply_timeout_ms: u64,
    /// Log ring-buffer capacity for relayed editor logs.
    pub log_capacity: usize,
    /// Outbound write-queue depth per editor connection.
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            reply_timeout_ms: 30_000,
            heavy_reply_timeout_ms: 60_000,
            log_capacity: tether_core::logs::DEFAULT_LOG_CAPACITY,
            outbound_queue: 1024,
        }
    }
}

impl ServerConfig {
    /// Load defaults with `TETHER_SERVER_*` environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply `TETHER_SERVER_*` environment overrides in place.
    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = std::env::var("TETHER_SERVER_HOST").ok().filter(|v| !v.is_empty()) {
            self.host = v;
        }
        if let Some(v) = read_env_u64("TETHER_SERVER_PORT", 0, 65_535) {
            self.port = u16::try_from(v).unwrap_or(0);
        }
        if let Some(v) = read_env_u64("TETHER_SERVER_REPLY_TIMEOUT_MS", 100, 3_600_000) {
            self.reply_timeout_ms = v;
        }
        if let Some(v) = read_env_u64("TETHER_SERVER_HEAVY_REPLY_TIMEOUT_MS", 100, 3_600_000) {
            self.heavy_reply_timeout_ms = v;
        }
        if let Some(v) = read_env_u64("TETHER_SERVER_LOG_CAPACITY", 1, 1_000_000) {
            self.log_capacity = usize::try_from(v).unwrap_or(tether_core::logs::DEFAULT_LOG_CAPACITY);
        }
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

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| (min..=max).contains(v))
}
