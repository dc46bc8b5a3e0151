use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests served. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "veranda_http_requests_total";

/// Counter: availability checks answered.
pub const AVAILABILITY_CHECKS_TOTAL: &str = "veranda_availability_checks_total";

/// Counter: Pending bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "veranda_bookings_created_total";

/// Counter: bookings confirmed by the payment webhook.
pub const BOOKINGS_CONFIRMED_TOTAL: &str = "veranda_bookings_confirmed_total";

/// Counter: bookings cancelled (explicitly or by failed confirmation).
pub const BOOKINGS_CANCELLED_TOTAL: &str = "veranda_bookings_cancelled_total";

/// Counter: booking attempts rejected on capacity or guest limits.
pub const BOOKINGS_REJECTED_TOTAL: &str = "veranda_bookings_rejected_total";

/// Counter: webhook deliveries rejected (bad signature or payload).
pub const WEBHOOKS_REJECTED_TOTAL: &str = "veranda_webhooks_rejected_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: properties created.
pub const PROPERTIES_CREATED_TOTAL: &str = "veranda_properties_created_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "veranda_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "veranda_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
