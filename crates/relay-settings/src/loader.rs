//! Settings loading: defaults, then the settings file, then environment.
//!
//! The file is merged as JSON over the serialized defaults, so a partial file
//! leaves every key it omits at its default. Environment overrides are applied
//! to the typed struct afterwards, and the result is validated last.

use std::path::{Path, PathBuf};

use relay_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RelaySettings;

const PORT_RANGE: (u16, u16) = (1, u16::MAX);
const OUTBOUND_BUFFER_RANGE: (usize, usize) = (1, 1_000_000);
const MAX_MESSAGE_SIZE_RANGE: (usize, usize) = (1, 64 * 1024 * 1024);

/// Default settings file location: `~/.relay/settings.json`.
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from `path`, apply environment overrides, and validate.
///
/// A missing file is not an error; the defaults are used instead. A file that
/// exists but is not valid JSON is.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut merged = serde_json::to_value(RelaySettings::default())?;

    if path.is_file() {
        debug!(path = %path.display(), "reading settings file");
        let raw = std::fs::read_to_string(path)?;
        let overlay: Value = serde_json::from_str(&raw)?;
        merged = deep_merge(merged, overlay);
    } else {
        debug!(path = %path.display(), "no settings file, using defaults");
    }

    let mut settings: RelaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Merge `overlay` into `base`.
///
/// Objects merge key by key. Any other overlay value replaces the base value
/// outright, except `null`, which leaves the base untouched.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map.into_iter().filter(|(_, v)| !v.is_null()) {
                let next = match base_map.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                let _ = base_map.insert(key, next);
            }
            Value::Object(base_map)
        }
        (_, replacement) => replacement,
    }
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, &|name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// | Variable                 | Field                      |
/// |--------------------------|----------------------------|
/// | `RELAY_HOST`             | `server.host`              |
/// | `RELAY_PORT`, `PORT`     | `server.port`              |
/// | `RELAY_OUTBOUND_BUFFER`  | `server.outbound_buffer`   |
/// | `RELAY_MAX_MESSAGE_SIZE` | `server.max_message_size`  |
/// | `RELAY_ALLOWED_ORIGINS`  | `server.allowed_origins`   |
/// | `RELAY_LOG_LEVEL`        | `logging.level`            |
/// | `RELAY_LOG_FORMAT`       | `logging.format`           |
///
/// `RELAY_PORT` wins over `PORT` when both are set. Empty values are treated
/// as unset. Values that fail to parse are logged and ignored.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: &dyn Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(host) = read("RELAY_HOST") {
        settings.server.host = host.trim().to_string();
    }

    for name in ["RELAY_PORT", "PORT"] {
        if let Some(raw) = read(name) {
            if let Some(port) = parse_u16_range(&raw, PORT_RANGE.0, PORT_RANGE.1) {
                settings.server.port = port;
                break;
            }
            warn!(key = name, value = %raw, "invalid port, ignoring");
        }
    }

    if let Some(raw) = read("RELAY_OUTBOUND_BUFFER") {
        match parse_usize_range(&raw, OUTBOUND_BUFFER_RANGE.0, OUTBOUND_BUFFER_RANGE.1) {
            Some(n) => settings.server.outbound_buffer = n,
            None => warn!(key = "RELAY_OUTBOUND_BUFFER", value = %raw, "out of range, ignoring"),
        }
    }

    if let Some(raw) = read("RELAY_MAX_MESSAGE_SIZE") {
        match parse_usize_range(&raw, MAX_MESSAGE_SIZE_RANGE.0, MAX_MESSAGE_SIZE_RANGE.1) {
            Some(n) => settings.server.max_message_size = n,
            None => warn!(key = "RELAY_MAX_MESSAGE_SIZE", value = %raw, "out of range, ignoring"),
        }
    }

    if let Some(raw) = read("RELAY_ALLOWED_ORIGINS") {
        settings.server.allowed_origins = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(ToOwned::to_owned)
            .collect();
    }

    if let Some(level) = read("RELAY_LOG_LEVEL") {
        settings.logging.level = level.trim().to_string();
    }

    if let Some(raw) = read("RELAY_LOG_FORMAT") {
        match LogFormat::parse(raw.trim()) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "RELAY_LOG_FORMAT", value = %raw, "unknown log format, ignoring"),
        }
    }
}

/// Parse a `u16` and accept it only inside `min..=max`.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    val.trim()
        .parse::<u16>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

/// Parse a `usize` and accept it only inside `min..=max`.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    val.trim()
        .parse::<usize>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use relay_core::logging::capture_logs;
    use serde_json::json;
    use tracing::Level;

    use super::*;
    use crate::errors::SettingsError;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn apply(pairs: &[(&str, &str)]) -> RelaySettings {
        let vars = env(pairs);
        let mut settings = RelaySettings::default();
        apply_overrides(&mut settings, &|name| vars.get(name).cloned());
        settings
    }

    #[test]
    fn merge_overrides_nested_key_only() {
        let merged = deep_merge(
            json!({"server": {"host": "0.0.0.0", "port": 8080}}),
            json!({"server": {"port": 9000}}),
        );
        assert_eq!(merged, json!({"server": {"host": "0.0.0.0", "port": 9000}}));
    }

    #[test]
    fn merge_null_keeps_base() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_replaces_arrays() {
        let merged = deep_merge(json!({"o": ["a", "b"]}), json!({"o": ["c"]}));
        assert_eq!(merged["o"], json!(["c"]));
    }

    #[test]
    fn merge_adds_new_keys() {
        let merged = deep_merge(json!({"a": 1}), json!({"b": 2}));
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_scalar_over_object() {
        let merged = deep_merge(json!({"a": {"b": 1}}), json!({"a": 5}));
        assert_eq!(merged["a"], 5);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.server.outbound_buffer, 256);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"outboundBuffer": 16, "allowedOrigins": ["http://localhost:5173"]},
                "logging": {"format": "json"}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.server.outbound_buffer, 16);
        assert_eq!(
            settings.server.allowed_origins,
            vec!["http://localhost:5173".to_string()]
        );
        assert_eq!(settings.server.max_message_size, 65_536);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn file_with_zero_buffer_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"outboundBuffer": 0}}"#).unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn port_from_plain_port_var() {
        assert_eq!(apply(&[("PORT", "3000")]).server.port, 3000);
    }

    #[test]
    fn relay_port_wins_over_port() {
        let s = apply(&[("PORT", "3000"), ("RELAY_PORT", "4000")]);
        assert_eq!(s.server.port, 4000);
    }

    #[test]
    fn invalid_relay_port_falls_back_to_port() {
        let s = apply(&[("PORT", "3000"), ("RELAY_PORT", "zero")]);
        assert_eq!(s.server.port, 3000);
    }

    #[test]
    fn invalid_port_is_ignored_with_warning() {
        let (logs, _guard) = capture_logs();
        let s = apply(&[("PORT", "0")]);
        assert_eq!(s.server.port, 8080);
        assert!(logs.has_event(Level::WARN, "invalid port"));
    }

    #[test]
    fn empty_values_are_unset() {
        let s = apply(&[("RELAY_HOST", ""), ("RELAY_LOG_LEVEL", "  ")]);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.logging.level, "info");
    }

    #[test]
    fn string_overrides() {
        let s = apply(&[
            ("RELAY_HOST", "127.0.0.1"),
            ("RELAY_LOG_LEVEL", "relay_server=debug"),
            ("RELAY_LOG_FORMAT", "JSON"),
        ]);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.logging.level, "relay_server=debug");
        assert_eq!(s.logging.format, LogFormat::Json);
    }

    #[test]
    fn numeric_overrides_respect_ranges() {
        let s = apply(&[
            ("RELAY_OUTBOUND_BUFFER", "32"),
            ("RELAY_MAX_MESSAGE_SIZE", "1024"),
        ]);
        assert_eq!(s.server.outbound_buffer, 32);
        assert_eq!(s.server.max_message_size, 1024);

        let s = apply(&[
            ("RELAY_OUTBOUND_BUFFER", "0"),
            ("RELAY_MAX_MESSAGE_SIZE", "999999999999"),
        ]);
        assert_eq!(s.server.outbound_buffer, 256);
        assert_eq!(s.server.max_message_size, 65_536);
    }

    #[test]
    fn origins_split_on_commas() {
        let s = apply(&[(
            "RELAY_ALLOWED_ORIGINS",
            "http://a.test, http://b.test,,",
        )]);
        assert_eq!(
            s.server.allowed_origins,
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn unknown_log_format_ignored() {
        let s = apply(&[("RELAY_LOG_FORMAT", "xml")]);
        assert_eq!(s.logging.format, LogFormat::Compact);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_u16_range("65535", 1, u16::MAX), Some(65535));
        assert_eq!(parse_u16_range("70000", 1, u16::MAX), None);
        assert_eq!(parse_u16_range(" 80 ", 1, u16::MAX), Some(80));
        assert_eq!(parse_usize_range("5", 1, 4), None);
        assert_eq!(parse_usize_range("abc", 1, 4), None);
    }

    #[test]
    fn settings_path_under_relay_dir() {
        let path = settings_path();
        assert!(path.ends_with(".relay/settings.json"));
    }
}
