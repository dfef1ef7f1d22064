use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus exporter and register all application metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // Pre-register counters so they appear even before the first increment.
    counter!("webhook_payloads_total").absolute(0);
    counter!("staged_trades_total").absolute(0);
    counter!("trades_processed_total").absolute(0);
    counter!("valuation_failures_total").absolute(0);
    counter!("consensus_signals_total").absolute(0);
    counter!("queue_jobs_completed_total").absolute(0);
    counter!("queue_jobs_failed_total").absolute(0);

    // Pre-register gauges at zero.
    gauge!("staged_backlog").set(0.0);

    // Histogram is lazily created on first record; force creation.
    histogram!("ingest_latency_seconds").record(0.0);

    handle
}
