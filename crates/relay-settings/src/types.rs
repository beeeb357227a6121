//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every struct is `#[serde(default)]`, so
//! a settings file only needs the keys it changes.

use relay_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 9000, "allowedOrigins": ["http://localhost:5173"] },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and transport settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.outbound_buffer == 0 {
            return Err(SettingsError::InvalidValue(
                "server.outboundBuffer must be at least 1".into(),
            ));
        }
        if self.server.max_message_size == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxMessageSize must be at least 1".into(),
            ));
        }
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("server.host is empty".into()));
        }
        Ok(())
    }
}

/// Listener and transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Frames queued per participant before a send waits for the writer.
    pub outbound_buffer: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Origins allowed by CORS. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// How long shutdown waits for in-flight work, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            outbound_buffer: 256,
            max_message_size: 64 * 1024,
            allowed_origins: Vec::new(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive, e.g. `info` or `relay_server=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
