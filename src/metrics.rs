// src/metrics.rs
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe the sync series.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;
        ensure_metrics_described();
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

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_records_total", "Rows upserted into gold, per source.");
        describe_counter!("sync_batches_total", "Batches read from silver, per source.");
        describe_counter!(
            "sync_failures_total",
            "Source-kind runs aborted, labelled by source and stage."
        );
        describe_counter!(
            "sync_watermark_persist_failures_total",
            "Watermark writes that failed after a successful upsert."
        );
        describe_gauge!(
            "sync_watermark_ts",
            "Unix ts of the persisted watermark, per source."
        );
        describe_histogram!("sync_pass_duration_ms", "Full pass duration in milliseconds.");
        describe_counter!("sync_passes_total", "Passes started by the scheduler.");
        describe_counter!(
            "sync_ticks_skipped_total",
            "Triggers dropped because a pass was still running."
        );
        describe_gauge!("sync_pass_last_run_ts", "Unix ts when the last pass finished.");
    });
}
