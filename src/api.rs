// src/api.rs
//! Read-only query surface over the gold table, plus sync status/trigger.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::db::HealthCheck;
use crate::model::{parse_composite_id, NewsDetail, NewsFilter, NewsListResponse, Pagination, SourceKind};
use crate::scheduler::{Scheduler, SchedulerStatus, TriggerOutcome};
use crate::target::NewsQuery;

const EXCHANGES: [&str; 4] = ["HK", "SH", "SZ", "BJ"];

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<dyn NewsQuery>,
    pub health: Arc<dyn HealthCheck>,
    pub scheduler: Option<Arc<Scheduler>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/news/item/{id}", get(news_detail))
        .route("/v1/news/{country}", get(list_by_country))
        .route("/v1/news/{country}/{exchange}", get(list_by_country_exchange))
        .route("/v1/sync/status", get(sync_status))
        .route("/v1/sync/trigger", post(sync_trigger))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// Lenient list params: unparsable values fall back to defaults.
#[derive(Debug, Default, serde::Deserialize)]
pub struct ListParams {
    ticker: Option<String>,
    from: Option<String>,
    to: Option<String>,
    page: Option<String>,
    limit: Option<String>,
}

impl ListParams {
    fn to_filter(&self) -> NewsFilter {
        let parse_ts = |s: &Option<String>| {
            s.as_deref()
                .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        NewsFilter {
            from: parse_ts(&self.from),
            to: parse_ts(&self.to),
            page: self
                .page
                .as_deref()
                .and_then(|p| p.parse::<u32>().ok())
                .filter(|p| *p > 0)
                .unwrap_or(1),
            limit: self
                .limit
                .as_deref()
                .and_then(|l| l.parse::<u32>().ok())
                .filter(|l| (1..=NewsFilter::MAX_LIMIT).contains(l))
                .unwrap_or(NewsFilter::DEFAULT_LIMIT),
            ..NewsFilter::default()
        }
    }

    fn ticker(&self) -> Option<&str> {
        self.ticker.as_deref().filter(|t| !t.is_empty())
    }
}

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    if let Err(e) = state.health.health_check().await {
        tracing::error!(error = %e, "health check failed");
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "service unhealthy",
        ));
    }
    Ok(Json(json!({ "status": "ok" })))
}

async fn list_by_country(
    State(state): State<AppState>,
    Path(country): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<NewsListResponse>, ApiError> {
    let source = SourceKind::from_country(&country)
        .ok_or_else(|| ApiError::bad_request("invalid country, must be 'JP' or 'CN'"))?;

    let filter = NewsFilter {
        source: Some(source),
        ticker: params.ticker().map(str::to_string),
        ..params.to_filter()
    };
    execute_list(&state, filter).await
}

async fn list_by_country_exchange(
    State(state): State<AppState>,
    Path((country, exchange)): Path<(String, String)>,
    Query(params): Query<ListParams>,
) -> Result<Json<NewsListResponse>, ApiError> {
    if SourceKind::from_country(&country) != Some(SourceKind::CnWind) {
        return Err(ApiError::bad_request("exchange filter only supported for CN"));
    }
    let exchange = exchange.to_ascii_uppercase();
    if !EXCHANGES.contains(&exchange.as_str()) {
        return Err(ApiError::bad_request(
            "invalid exchange, must be 'HK', 'SH', 'SZ', or 'BJ'",
        ));
    }

    let filter = NewsFilter {
        source: Some(SourceKind::CnWind),
        ticker: params.ticker().map(|t| format!("{t}.{exchange}")),
        exchange: Some(exchange),
        ..params.to_filter()
    };
    execute_list(&state, filter).await
}

async fn execute_list(
    state: &AppState,
    filter: NewsFilter,
) -> Result<Json<NewsListResponse>, ApiError> {
    let filter = filter.normalized();
    let (data, total) = state.query.list_news(&filter).await.map_err(|e| {
        tracing::error!(error = %e, "failed to list news");
        ApiError::internal()
    })?;
    Ok(Json(NewsListResponse {
        data,
        pagination: Pagination {
            page: filter.page,
            limit: filter.limit,
            total,
        },
    }))
}

async fn news_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<NewsDetail>, ApiError> {
    let (kind, native_id) = parse_composite_id(&id)
        .ok_or_else(|| ApiError::bad_request(format!("invalid news id format: {id}")))?;
    let detail = state.query.get_news(kind, &native_id).await.map_err(|e| {
        tracing::error!(error = %e, id = %id, "failed to load news detail");
        ApiError::internal()
    })?;
    detail
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "news not found"))
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<SchedulerStatus>, ApiError> {
    let sched = state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "scheduler disabled"))?;
    Ok(Json(sched.status()))
}

async fn sync_trigger(State(state): State<AppState>) -> Result<Response, ApiError> {
    let sched = state
        .scheduler
        .as_ref()
        .ok_or_else(|| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "scheduler disabled"))?;
    match sched.trigger() {
        TriggerOutcome::Started => {
            Ok((StatusCode::ACCEPTED, Json(json!({ "status": "started" }))).into_response())
        }
        TriggerOutcome::AlreadyRunning => Err(ApiError::new(
            StatusCode::CONFLICT,
            "sync pass already running",
        )),
        TriggerOutcome::ShuttingDown => Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "scheduler shutting down",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_fall_back_on_garbage() {
        let p = ListParams {
            from: Some("yesterday".into()),
            to: Some("2025-06-01T00:00:00Z".into()),
            page: Some("-2".into()),
            limit: Some("1000".into()),
            ..Default::default()
        };
        let f = p.to_filter();
        assert_eq!(f.from, None);
        assert!(f.to.is_some());
        assert_eq!(f.page, 1);
        assert_eq!(f.limit, NewsFilter::DEFAULT_LIMIT);
    }
}
