// tests/metrics.rs
mod common;

use std::sync::Arc;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use news_sync::metrics::Metrics;
use news_sync::source::memory::MemorySource;
use news_sync::sync::SyncEngine;
use news_sync::target::memory::MemoryTarget;

#[tokio::test]
async fn metrics_endpoint_exposes_sync_series() {
    let metrics = Metrics::init().expect("recorder installs once per test binary");

    let mut records = common::jp_series(3);
    records.push(common::cn("W1", common::at(1)));
    let source = Arc::new(MemorySource::with_records(records));
    source.fail_next_reads(1);
    let engine = SyncEngine::new(source, Arc::new(MemoryTarget::new()));
    let report = engine.sync_all(&CancellationToken::new()).await;
    assert_eq!(report.failures().count(), 1);

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "sync_records_total{source=\"cn_wind\"} 1",
        "sync_batches_total",
        "sync_failures_total{source=\"jp_minkabu\",stage=\"fetch\"} 1",
        "sync_watermark_ts",
        "sync_pass_duration_ms",
        "sync_pass_last_run_ts",
    ] {
        assert!(text.contains(needle), "missing `{needle}` in:\n{text}");
    }
}
