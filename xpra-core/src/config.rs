//! Typed engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::XpraError;

/// Options consumed by the engine, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Use an encrypted transport (`wss://`).
    pub encrypt: bool,
    /// Request true-color pixel data.
    pub true_color: bool,
    /// Ask the server for cursor data to render locally.
    pub local_cursor: bool,
    /// Join a session shared with other clients.
    pub shared: bool,
    /// Never send input-derived commands.
    pub view_only: bool,
    /// Pan the viewport on pointer drags instead of sending buttons.
    pub viewport_drag: bool,
    pub connect_timeout_secs: u64,
    pub disconnect_timeout_secs: u64,
    /// Period of the outgoing-queue flush.
    pub flush_interval_ms: u64,
    /// Period of client pings while connected.
    pub ping_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            encrypt: false,
            true_color: true,
            local_cursor: false,
            shared: true,
            view_only: false,
            viewport_drag: false,
            connect_timeout_secs: 5,
            disconnect_timeout_secs: 3,
            flush_interval_ms: 217,
            ping_interval_ms: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.disconnect_timeout_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1))
    }
}

/// Parse a legacy boolean option string.
///
/// Empty, `0`, `no`, `false` and `off` are false; `1`, `yes`, `true` and
/// `on` are true (case-insensitive). Anything else is rejected.
pub fn parse_flag(s: &str) -> Result<bool, XpraError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "no" | "false" | "off" => Ok(false),
        "1" | "yes" | "true" | "on" => Ok(true),
        other => Err(XpraError::Config(format!("not a boolean: {other:?}"))),
    }
}
