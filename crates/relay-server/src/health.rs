//! `/health` endpoint.

use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is serving.
    pub status: &'static str,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered participants right now.
    pub participants: usize,
    /// Start time, RFC 3339.
    pub started_at: String,
}

/// Build a health response.
pub fn health_check(
    start_time: Instant,
    started_at: DateTime<Utc>,
    participants: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        participants,
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}
