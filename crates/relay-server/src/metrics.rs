//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before any metric is recorded. Fails if another
/// recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle on a recorder that is not installed globally.
///
/// Renders nothing unless metrics are recorded through it explicitly. Used
/// where the global recorder is already taken, such as tests.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render the Prometheus text exposition.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted (counter).
pub const CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Open WebSocket connections (gauge).
pub const CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Registered participants (gauge).
pub const PARTICIPANTS_ACTIVE: &str = "relay_participants_active";
/// Broadcasts fanned out (counter).
pub const BROADCASTS_TOTAL: &str = "relay_broadcasts_total";
/// Per-recipient delivery failures (counter).
pub const DELIVERIES_FAILED_TOTAL: &str = "relay_deliveries_failed_total";
/// Inbound frames that failed to decode (counter).
pub const DECODE_ERRORS_TOTAL: &str = "relay_decode_errors_total";
/// Connection lifetime in seconds (histogram).
pub const SESSION_DURATION_SECONDS: &str = "relay_session_duration_seconds";
