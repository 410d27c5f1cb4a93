use std::net::SocketAddr;

use crate::admission::AdmissionError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: admission attempts. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "roomledger_admissions_total";

/// Histogram: admission latency in seconds. Labels: outcome.
pub const ADMISSION_DURATION_SECONDS: &str = "roomledger_admission_duration_seconds";

/// Counter: bearer tokens rejected at the HTTP boundary.
pub const AUTH_FAILURES_TOTAL: &str = "roomledger_auth_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for a room's exclusive lock, in seconds.
pub const ROOM_LOCK_WAIT_SECONDS: &str = "roomledger_room_lock_wait_seconds";

/// Gauge: rooms known to the ledger.
pub const ROOMS_ACTIVE: &str = "roomledger_rooms_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomledger_wal_flush_batch_size";

/// Counter: appends refused because their commit deadline passed in the queue.
pub const WAL_APPENDS_EXPIRED_TOTAL: &str = "roomledger_wal_appends_expired_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("metrics exporter not installed: {e}"),
    }
}

/// Map an admission result to a short label for metrics.
pub fn outcome_label<T>(result: &Result<T, AdmissionError>) -> &'static str {
    match result {
        Ok(_) => "created",
        Err(AdmissionError::InvalidInterval) => "invalid_interval",
        Err(AdmissionError::Rejected(_)) => "rejected",
        Err(AdmissionError::RoomNotFound(_)) => "not_found",
        Err(AdmissionError::Conflict) => "conflict",
        Err(AdmissionError::Unavailable(_)) => "unavailable",
    }
}
