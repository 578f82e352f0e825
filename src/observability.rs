use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "fleetbook_http_requests_total";

/// Counter: catalog searches. Labels: cache (hit|miss).
pub const SEARCH_TOTAL: &str = "fleetbook_search_total";

/// Histogram: uncached search latency in seconds.
pub const SEARCH_DURATION_SECONDS: &str = "fleetbook_search_duration_seconds";

/// Counter: bookings accepted.
pub const BOOKINGS_CREATED_TOTAL: &str = "fleetbook_bookings_created_total";

/// Counter: booking requests rejected for overlapping dates.
pub const BOOKING_CONFLICTS_TOTAL: &str = "fleetbook_booking_conflicts_total";

/// Counter: lifecycle transitions applied. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "fleetbook_transitions_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: live entries in the search result cache.
pub const CACHE_ENTRIES: &str = "fleetbook_cache_entries";

/// Counter: full cache invalidations triggered by ledger writes.
pub const CACHE_INVALIDATIONS_TOTAL: &str = "fleetbook_cache_invalidations_total";

/// Gauge: vehicles in the catalog.
pub const VEHICLES_ACTIVE: &str = "fleetbook_vehicles_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "fleetbook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "fleetbook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
/// A failed install is logged; the service runs without metrics.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics"),
        Err(e) => tracing::error!("failed to install Prometheus metrics exporter: {e}"),
    }
}

/// Install the global tracing subscriber. `filter` uses `EnvFilter` syntax,
/// e.g. `info,fleetbook=debug`.
pub fn init_tracing(filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
