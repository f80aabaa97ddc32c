use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests. Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "washdesk_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "washdesk_http_request_duration_seconds";

// ── Booking engine ──────────────────────────────────────────────

/// Counter: reservations accepted.
pub const RESERVATIONS_CREATED_TOTAL: &str = "washdesk_reservations_created_total";

/// Counter: reservations rejected because they overlapped an existing one.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "washdesk_reservation_conflicts_total";

// ── Journal ─────────────────────────────────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "washdesk_wal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "washdesk_wal_flush_batch_size";

/// Counter: journal records read back at startup.
pub const WAL_RECORDS_REPLAYED_TOTAL: &str = "washdesk_wal_records_replayed_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
