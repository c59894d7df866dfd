use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation operations. Labels: operation, outcome.
pub const OPERATIONS_TOTAL: &str = "salonbook_operations_total";

/// Histogram: operation latency in seconds, lock wait included. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "salonbook_operation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: time spent waiting for shop/stylist day locks, in seconds.
pub const LOCK_WAIT_SECONDS: &str = "salonbook_lock_wait_seconds";

/// Counter: lock acquisitions that hit the timeout.
pub const LOCK_TIMEOUTS_TOTAL: &str = "salonbook_lock_timeouts_total";

/// Gauge: lock slots currently allocated.
pub const LOCK_SLOTS: &str = "salonbook_lock_slots";

/// Histogram: journal group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "salonbook_wal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "salonbook_wal_flush_batch_size";

/// Install the fmt tracing subscriber and, when a port is given, the Prometheus exporter.
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init(metrics_port: Option<u16>) {
    let _ = tracing_subscriber::fmt().try_init();

    let Some(port) = metrics_port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::warn!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Short outcome label for an operation result.
pub fn outcome_label<T>(result: &Result<T, crate::engine::BookingError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    }
}
