//! Client configuration.

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use xpra_core::{EngineConfig, XpraError};

/// Top-level configuration for the command-line client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where to connect.
    pub network: NetworkConfig,
    /// Session behaviour.
    pub session: SessionConfig,
    /// Timeouts and periodic timers.
    pub timing: TimingConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Path component of the server URI.
    pub path: String,
    /// Request an encrypted transport.
    pub encrypt: bool,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub true_color: bool,
    pub local_cursor: bool,
    pub shared: bool,
    /// Never send keyboard or pointer input.
    pub view_only: bool,
    /// Pointer drags pan the viewport.
    pub viewport_drag: bool,
}

/// Timer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub connect_timeout_secs: u64,
    pub disconnect_timeout_secs: u64,
    pub flush_interval_ms: u64,
    pub ping_interval_ms: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 10000,
            path: String::new(),
            encrypt: false,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            true_color: engine.true_color,
            local_cursor: engine.local_cursor,
            shared: engine.shared,
            view_only: engine.view_only,
            viewport_drag: engine.viewport_drag,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            connect_timeout_secs: engine.connect_timeout_secs,
            disconnect_timeout_secs: engine.disconnect_timeout_secs,
            flush_interval_ms: engine.flush_interval_ms,
            ping_interval_ms: engine.ping_interval_ms,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file.
    ///
    /// A missing file yields the defaults; an unreadable or malformed file
    /// is a `Config` error.
    pub fn load(path: &Path) -> Result<Self, XpraError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("no config at {}; using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(XpraError::Config(format!("{}: {e}", path.display())));
            }
        };
        toml::from_str(&contents)
            .map_err(|e| XpraError::Config(format!("{}: {e}", path.display())))
    }

    /// Check the settings the engine cannot recover from at runtime.
    pub fn validate(&self) -> Result<(), XpraError> {
        if self.network.host.trim().is_empty() {
            return Err(XpraError::Config("network.host is empty".into()));
        }
        if self.network.port == 0 {
            return Err(XpraError::Config("network.port must be non-zero".into()));
        }
        if self.timing.connect_timeout_secs == 0 {
            return Err(XpraError::Config("timing.connect_timeout_secs must be non-zero".into()));
        }
        if self.session.view_only && self.session.viewport_drag {
            warn!("view-only session: viewport drag pans locally, no input is sent");
        }
        Ok(())
    }

    /// Write the default configuration to `path`.
    pub fn write_default(path: &Path) -> Result<(), XpraError> {
        let text = toml::to_string_pretty(&Self::default())
            .map_err(|e| XpraError::Config(e.to_string()))?;
        std::fs::write(path, text)
            .map_err(|e| XpraError::Config(format!("{}: {e}", path.display())))
    }

    /// The subset of options the engine consumes.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            encrypt: self.network.encrypt,
            true_color: self.session.true_color,
            local_cursor: self.session.local_cursor,
            shared: self.session.shared,
            view_only: self.session.view_only,
            viewport_drag: self.session.viewport_drag,
            connect_timeout_secs: self.timing.connect_timeout_secs,
            disconnect_timeout_secs: self.timing.disconnect_timeout_secs,
            flush_interval_ms: self.timing.flush_interval_ms,
            ping_interval_ms: self.timing.ping_interval_ms,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
