use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

/// One-time metrics registration (so series show up on /metrics before the first cycle).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("watch_cycles_total", "Poll cycles started.");
        describe_counter!(
            "watch_fetch_errors_total",
            "Failed fetches, labelled by error kind."
        );
        describe_counter!("watch_results_total", "Results published after filter and cap.");
        describe_counter!(
            "watch_filtered_out_total",
            "Results dropped by the strict keyword filter."
        );
        describe_counter!(
            "watch_http_status_errors_total",
            "Non-2xx responses from Reddit."
        );
        describe_counter!(
            "watch_webhook_errors_total",
            "Failed webhook deliveries."
        );
        describe_histogram!("watch_fetch_ms", "Fetch + filter time per cycle in milliseconds.");
        describe_histogram!("watch_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!("watch_last_cycle_ts", "Unix ts of the last cycle start.");
        describe_gauge!("watch_polling", "1 while a session is polling.");
    });
}

impl Metrics {
    /// Install the Prometheus recorder. Call once per process.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        ensure_metrics_described();
        gauge!("watch_polling").set(0.0);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
