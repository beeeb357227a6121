//! Structured logging with `tracing`.
//!
//! [`init_subscriber`] installs the process-wide subscriber once at startup.
//! `RUST_LOG` takes precedence over the configured level so operators can
//! narrow or widen filters without touching settings.
//!
//! With the `test-utils` feature, [`capture_logs`] records events on the
//! current thread for assertions in tests.

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::{CapturedLogs, capture_logs};

/// Output format for the stderr log stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parse a format name (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "compact" | "text" | "pretty" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Build the level filter, preferring `RUST_LOG` when it is set and valid.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber with stderr output.
///
/// Call once at application startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str, format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init fails if a global subscriber is already installed
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}
