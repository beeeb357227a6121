//! Server configuration.

use std::time::Duration;

use relay_settings::ServerSettings;
use serde::{Deserialize, Serialize};

/// Configuration for [`RelayServer`](crate::server::RelayServer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Capacity of each participant's outbound queue.
    pub outbound_buffer: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// CORS origins. Empty means any origin.
    pub allowed_origins: Vec<String>,
    /// Upper bound on the shutdown drain, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl ServerConfig {
    /// Shutdown drain bound as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            outbound_buffer: 256,
            max_message_size: 64 * 1024,
            allowed_origins: Vec::new(),
            shutdown_timeout_secs: 10,
        }
    }
}

impl From<&ServerSettings> for ServerConfig {
    fn from(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            outbound_buffer: settings.outbound_buffer.max(1),
            max_message_size: settings.max_message_size,
            allowed_origins: settings.allowed_origins.clone(),
            shutdown_timeout_secs: settings.shutdown_timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_loopback_on_ephemeral_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.outbound_buffer, 256);
        assert_eq!(cfg.max_message_size, 64 * 1024);
        assert!(cfg.allowed_origins.is_empty());
    }

    #[test]
    fn shutdown_timeout_duration() {
        let cfg = ServerConfig {
            shutdown_timeout_secs: 3,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.shutdown_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn from_settings_copies_every_field() {
        let settings = ServerSettings {
            host: "0.0.0.0".into(),
            port: 9000,
            outbound_buffer: 8,
            max_message_size: 1024,
            allowed_origins: vec!["http://localhost:5173".into()],
            shutdown_timeout_secs: 2,
        };
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.outbound_buffer, 8);
        assert_eq!(cfg.max_message_size, 1024);
        assert_eq!(cfg.allowed_origins, vec!["http://localhost:5173".to_string()]);
        assert_eq!(cfg.shutdown_timeout_secs, 2);
    }

    #[test]
    fn from_settings_clamps_zero_buffer() {
        let settings = ServerSettings {
            outbound_buffer: 0,
            ..ServerSettings::default()
        };
        assert_eq!(ServerConfig::from(&settings).outbound_buffer, 1);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig {
            port: 4000,
            allowed_origins: vec!["http://a.test".into()],
            ..ServerConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}
