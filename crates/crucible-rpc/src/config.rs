//! Peer tuning knobs

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TIMEOUT_ENV: &str = "CRUCIBLE_RPC_TIMEOUT_MS";
pub const HIGH_WATER_MARK_ENV: &str = "CRUCIBLE_RPC_HIGH_WATER_MARK";
pub const READ_BUFFER_ENV: &str = "CRUCIBLE_RPC_READ_BUFFER";

/// Configuration shared by every peer a client or server creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// How long an outbound call waits for its response (milliseconds)
    pub timeout_ms: u64,

    /// Queued outbound bytes at which inbound reads pause
    pub high_water_mark: usize,

    /// Initial capacity of the inbound frame buffer
    pub read_buffer_size: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            high_water_mark: 16 * 1024,
            read_buffer_size: 8 * 1024,
        }
    }
}

impl PeerConfig {
    /// Defaults overridden by `CRUCIBLE_RPC_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(timeout_ms) = env_number(TIMEOUT_ENV) {
            config.timeout_ms = timeout_ms;
        }
        if let Some(high_water_mark) = env_number(HIGH_WATER_MARK_ENV) {
            config.high_water_mark = high_water_mark;
        }
        if let Some(read_buffer_size) = env_number(READ_BUFFER_ENV) {
            config.read_buffer_size = read_buffer_size;
        }
        config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_high_water_mark(mut self, bytes: usize) -> Self {
        self.high_water_mark = bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
