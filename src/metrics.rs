use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::models::Exchange;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus exporter and register the sync metrics.
/// Returns a `PrometheusHandle` whose `render()` method produces the
/// text/plain Prometheus scrape payload. The recorder is installed once per
/// process; later calls return the same handle.
pub fn init_metrics() -> PrometheusHandle {
    HANDLE.get_or_init(install).clone()
}

fn install() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    describe_counter!("sync_cycles_total", "Completed sync cycles by exchange and outcome");
    describe_counter!("positions_upserted_total", "Closed positions written by sync cycles");
    describe_counter!("records_skipped_total", "Malformed exchange records dropped during sync");
    describe_histogram!("sync_cycle_seconds", "Wall time of one sync cycle");

    // Pre-register per-exchange counters so they appear before the first cycle.
    for exchange in Exchange::ALL {
        let name = exchange.as_str();
        counter!("positions_upserted_total", "exchange" => name).absolute(0);
        counter!("records_skipped_total", "exchange" => name).absolute(0);
    }

    handle
}
