use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and register all application metrics.
/// With a listen address the exporter serves its own scrape endpoint;
/// without one the recorder is still installed so counters stay cheap
/// no-ops with real values for tests and dry runs.
pub fn init_metrics(listen: Option<SocketAddr>) {
    match listen {
        Some(addr) => PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("failed to install Prometheus exporter"),
        None => {
            let _ = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");
        }
    }

    // Pre-register counters so they appear even before the first increment.
    counter!("trades_received_total").absolute(0);
    counter!("trades_deduplicated_total").absolute(0);
    counter!("orders_submitted_total").absolute(0);
    counter!("orders_failed_total").absolute(0);
    counter!("orders_filtered_total").absolute(0);
    counter!("order_submit_retries_total").absolute(0);
    counter!("reservations_opened_total").absolute(0);
    counter!("reservations_released_total").absolute(0);
    counter!("matches_recorded_total").absolute(0);

    // Pre-register gauges at zero.
    gauge!("active_leaders").set(0.0);

    // Histogram is lazily created on first record; force creation.
    histogram!("trade_processing_seconds").record(0.0);
}
