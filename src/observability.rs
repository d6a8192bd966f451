use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: reservation commands processed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "berth_commands_total";

/// Counter: creation attempts rejected with a conflict.
pub const CONFLICTS_TOTAL: &str = "berth_conflicts_total";

/// Counter: payment-gateway failures (authorize/capture/refund, incl. timeouts).
pub const PAYMENT_FAILURES_TOTAL: &str = "berth_payment_failures_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: resources currently tracked by the engine.
pub const RESOURCES_ACTIVE: &str = "berth_resources_active";

/// Counter: sweep passes executed.
pub const SWEEP_RUNS_TOTAL: &str = "berth_sweep_runs_total";

/// Counter: time-driven transitions applied by the sweep. Labels: transition.
pub const SWEEP_TRANSITIONS_TOTAL: &str = "berth_sweep_transitions_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "berth_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (records per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "berth_journal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if `None`.
pub fn init_metrics(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Install the default fmt tracing subscriber. Embedders with their own
/// subscriber should skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
