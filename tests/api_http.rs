// tests/api_http.rs
//
// HTTP-level tests for the query Router without opening sockets.
// Exercised via tower::ServiceExt::oneshot against the in-memory gold store.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value as Json;
use tower::ServiceExt as _;

use common::{at, cn, jp_series};
use news_sync::api::{self, AppState};
use news_sync::db::HealthCheck;
use news_sync::error::StoreError;
use news_sync::normalize::{normalize, normalize_batch};
use news_sync::scheduler::{Scheduler, SchedulerCfg};
use news_sync::source::memory::MemorySource;
use news_sync::sync::SyncEngine;
use news_sync::target::memory::MemoryTarget;
use news_sync::target::TargetWriter;

const BODY_LIMIT: usize = 1024 * 1024;

struct Unhealthy;

#[async_trait]
impl HealthCheck for Unhealthy {
    async fn health_check(&self) -> Result<(), StoreError> {
        Err(StoreError::message("gold db unhealthy: connection refused"))
    }
}

/// Gold store with 3 Minkabu rows and 2 Wind rows (one HK-only).
async fn seeded() -> Arc<MemoryTarget> {
    let target = Arc::new(MemoryTarget::new());
    target.upsert(&normalize_batch(&jp_series(3))).await.unwrap();

    let both = normalize(&cn("W1", at(10)));
    let mut hk_only = normalize(&cn("W2", at(20)));
    hk_only.tickers = vec!["0700.HK".into()];
    target.upsert(&[both, hk_only]).await.unwrap();
    target
}

fn router_for(target: Arc<MemoryTarget>) -> Router {
    api::router(AppState {
        query: target.clone(),
        health: target,
        scheduler: None,
    })
}

async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_ok_and_unhealthy() {
    let (status, body) = call(router_for(seeded().await), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let app = api::router(AppState {
        query: Arc::new(MemoryTarget::new()),
        health: Arc::new(Unhealthy),
        scheduler: None,
    });
    let (status, body) = call(app, "GET", "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "service unhealthy");
}

#[tokio::test]
async fn list_by_country_returns_newest_first_with_pagination() {
    let app = router_for(seeded().await);

    let (status, body) = call(app.clone(), "GET", "/v1/news/jp").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["limit"], 20);
    let data = body["data"].as_array().expect("data array");
    assert_eq!(data.len(), 3);
    assert_eq!(data[0]["id"], "jp_minkabu_N00003");
    assert_eq!(data[0]["publisher"], "Minkabu");
    assert_eq!(data[0]["date"], "2025-06-01");

    let (_, page2) = call(app.clone(), "GET", "/v1/news/JP?limit=2&page=2").await;
    assert_eq!(page2["data"].as_array().unwrap().len(), 1);
    assert_eq!(page2["data"][0]["id"], "jp_minkabu_N00001");
    assert_eq!(page2["pagination"]["total"], 3);

    let (_, by_ticker) = call(app, "GET", "/v1/news/JP?ticker=9999").await;
    assert_eq!(by_ticker["pagination"]["total"], 0);
}

#[tokio::test]
async fn invalid_country_is_bad_request() {
    let (status, body) = call(router_for(seeded().await), "GET", "/v1/news/US").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid country, must be 'JP' or 'CN'");
}

#[tokio::test]
async fn exchange_route_filters_cn_by_suffix() {
    let app = router_for(seeded().await);

    let (status, body) = call(app.clone(), "GET", "/v1/news/CN/sh").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["data"][0]["id"], "cn_wind_W1");

    let (_, hk) = call(app.clone(), "GET", "/v1/news/CN/HK").await;
    assert_eq!(hk["pagination"]["total"], 2);

    let (_, ticker) = call(app.clone(), "GET", "/v1/news/CN/HK?ticker=0700").await;
    assert_eq!(ticker["pagination"]["total"], 2);

    let (status, body) = call(app.clone(), "GET", "/v1/news/JP/SH").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "exchange filter only supported for CN");

    let (status, _) = call(app, "GET", "/v1/news/CN/NYSE").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn detail_resolves_composite_ids() {
    let app = router_for(seeded().await);

    let (status, body) = call(app.clone(), "GET", "/v1/news/item/jp_minkabu_N00002").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "jp_minkabu_N00002");
    assert_eq!(body["translated_headline"], "Headline N00002");
    assert!(body.get("keywords").is_none(), "absent keywords are omitted");

    let (status, body) = call(app.clone(), "GET", "/v1/news/item/cn_wind_W1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["keywords"][0], "liquor");

    let (status, body) = call(app.clone(), "GET", "/v1/news/item/jp_minkabu_missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "news not found");

    let (status, body) = call(app, "GET", "/v1/news/item/us_reuters_1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid news id format: us_reuters_1");
}

#[tokio::test]
async fn sync_endpoints_need_a_scheduler() {
    let app = router_for(seeded().await);

    let (status, _) = call(app.clone(), "GET", "/v1/sync/status").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let (status, body) = call(app, "POST", "/v1/sync/trigger").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "scheduler disabled");
}

#[tokio::test]
async fn trigger_starts_a_pass_and_status_reports_it() {
    let source = Arc::new(MemorySource::with_records(jp_series(4)));
    let target = Arc::new(MemoryTarget::new());
    let engine = SyncEngine::new(source, target.clone());
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(engine),
        SchedulerCfg {
            interval: Duration::from_secs(3600),
            shutdown_grace: Duration::from_secs(5),
        },
    ));
    let app = api::router(AppState {
        query: target.clone(),
        health: target.clone(),
        scheduler: Some(scheduler.clone()),
    });

    let (status, body) = call(app.clone(), "POST", "/v1/sync/trigger").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");

    for _ in 0..200 {
        if scheduler.status().passes_completed == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (status, body) = call(app.clone(), "GET", "/v1/sync/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);
    assert_eq!(body["passes_completed"], 1);
    assert_eq!(body["last_pass"]["records"], 4);
    assert_eq!(target.len(), 4);

    scheduler.shutdown().await;
    let (status, body) = call(app, "POST", "/v1/sync/trigger").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "scheduler shutting down");
}
