//! `/health` endpoint body.

use std::time::Instant;

use beacon_settings::PushBackend;
use serde::Serialize;

/// Health report of a running push server.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while the server is accepting clients.
    pub status: &'static str,
    /// Seconds since the server was built.
    pub uptime_secs: u64,
    /// Registered push connections, one per session.
    pub connections: usize,
    /// Transport serving `/push`.
    pub backend: PushBackend,
}

/// Snapshot the server's liveness counters.
pub fn health_check(start_time: Instant, connections: usize, backend: PushBackend) -> HealthResponse {
    HealthResponse {
        status: "ok",
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        backend,
    }
}
