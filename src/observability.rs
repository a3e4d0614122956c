use std::net::SocketAddr;

use crate::protocol::Request;

// ── Allocation metrics ──────────────────────────────────────────

/// Counter: reserve calls. Labels: outcome (granted, waitlisted, error).
pub const RESERVATIONS_TOTAL: &str = "seatline_reservations_total";

/// Counter: holds confirmed before their deadline.
pub const CONFIRMATIONS_TOTAL: &str = "seatline_confirmations_total";

/// Counter: seats returned to the pool. Labels: reason (expired, released).
pub const RECLAIMS_TOTAL: &str = "seatline_reclaims_total";

/// Counter: waitlisted clients granted a reclaimed seat.
pub const PROMOTIONS_TOTAL: &str = "seatline_promotions_total";

/// Gauge: events currently tracked.
pub const EVENTS_ACTIVE: &str = "seatline_events_active";

// ── Admission gate ──────────────────────────────────────────────

/// Gauge: client operations currently inside the admission gate.
pub const GATE_IN_FLIGHT: &str = "seatline_gate_in_flight";

/// Histogram: time spent waiting for an admission slot, in seconds.
pub const GATE_WAIT_SECONDS: &str = "seatline_gate_wait_seconds";

// ── Store ───────────────────────────────────────────────────────

/// Histogram: appends sharing one fsync.
pub const WAL_FLUSH_BATCH_SIZE: &str = "seatline_wal_flush_batch_size";

/// Histogram: time to write and fsync one batch, in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "seatline_wal_flush_duration_seconds";

/// Counter: compactions that failed and left the full log in place.
pub const WAL_COMPACTION_FAILURES_TOTAL: &str = "seatline_wal_compaction_failures_total";

// ── Wire ────────────────────────────────────────────────────────

/// Counter: requests handled. Labels: command, status.
pub const REQUESTS_TOTAL: &str = "seatline_requests_total";

/// Histogram: request latency in seconds. Labels: command.
pub const REQUEST_DURATION_SECONDS: &str = "seatline_request_duration_seconds";

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "seatline_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "seatline_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "seatline_connections_rejected_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Request variant to a short label for metrics.
pub fn command_label(req: &Request) -> &'static str {
    match req {
        Request::CreateEvent { .. } => "create_event",
        Request::Reserve { .. } => "reserve",
        Request::Confirm { .. } => "confirm",
        Request::Release { .. } => "release",
        Request::ListEvents => "list_events",
        Request::Waitlist { .. } => "waitlist",
        Request::Pending { .. } => "pending",
        Request::Status { .. } => "status",
    }
}
