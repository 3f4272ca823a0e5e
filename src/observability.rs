use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: availability queries served.
pub const AVAILABILITY_QUERIES_TOTAL: &str = "slotgrid_availability_queries_total";

/// Histogram: availability query latency in seconds.
pub const AVAILABILITY_QUERY_DURATION_SECONDS: &str =
    "slotgrid_availability_query_duration_seconds";

/// Counter: reservations created (including group extensions).
pub const RESERVATIONS_CREATED_TOTAL: &str = "slotgrid_reservations_created_total";

/// Counter: reservations committed to permanent bookings.
pub const RESERVATIONS_COMMITTED_TOTAL: &str = "slotgrid_reservations_committed_total";

/// Counter: reservations released (expiry, cancel, targeted release).
pub const RESERVATIONS_RELEASED_TOTAL: &str = "slotgrid_reservations_released_total";

/// Counter: authoritative capacity rejections at the slot store.
pub const CAPACITY_REJECTIONS_TOTAL: &str = "slotgrid_capacity_rejections_total";

// ── Sweep metrics ───────────────────────────────────────────────

/// Histogram: full-sweep duration in seconds.
pub const SWEEP_DURATION_SECONDS: &str = "slotgrid_sweep_duration_seconds";

/// Counter: reservations cleaned up by sweeps.
pub const SWEEP_REAPED_TOTAL: &str = "slotgrid_sweep_reaped_total";

/// Install the fmt tracing subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}
