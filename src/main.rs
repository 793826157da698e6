//! news-sync: binary entrypoint.
//! Connects silver/gold, starts the sync scheduler (first pass immediately),
//! serves the query API, and shuts both down on SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use news_sync::api::{self, AppState};
use news_sync::config::AppConfig;
use news_sync::db::Databases;
use news_sync::metrics::Metrics;
use news_sync::scheduler::{Scheduler, SchedulerCfg, ShutdownOutcome};
use news_sync::source::postgres::PgSourceReader;
use news_sync::sync::SyncEngine;
use news_sync::target::postgres::PgTargetStore;

/// `RUST_LOG` wins; otherwise the configured level. `LOG_FORMAT=json` for JSON lines.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env.local first (local development), then .env as fallback; no-op in prod.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    let cfg = AppConfig::load().context("failed to load config")?;
    init_tracing(&cfg.server.log_level);
    let sources = cfg.sync.source_kinds()?;
    let metrics = Metrics::init()?;

    tracing::info!("connecting to databases");
    let dbs = Databases::connect(&cfg.silver, &cfg.gold).await?;
    tracing::info!("database connections established");

    let gold = Arc::new(PgTargetStore::new(dbs.gold.clone()));
    gold.migrate().await.context("failed to apply gold schema")?;

    let engine = SyncEngine::new(Arc::new(PgSourceReader::new(dbs.silver.clone())), gold.clone())
        .with_batch_size(cfg.sync.batch_size)
        .with_sources(sources);

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(engine),
        SchedulerCfg {
            interval: cfg.sync.interval(),
            shutdown_grace: cfg.sync.shutdown_grace(),
        },
    ));
    scheduler.start();

    let state = AppState {
        query: gold,
        health: Arc::new(dbs.clone()),
        scheduler: Some(scheduler.clone()),
    };
    let app = api::router(state).merge(metrics.router());

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(port = cfg.server.port, "starting HTTP server");

    let http_stop = CancellationToken::new();
    let mut server = {
        let stop = http_stop.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
        })
    };

    let mut server_done = false;
    tokio::select! {
        _ = shutdown_signal() => tracing::info!("shutdown signal received"),
        res = &mut server => {
            tracing::error!(result = ?res, "HTTP server exited unexpectedly");
            server_done = true;
        }
    }

    // Scheduler first: it waits for the in-flight pass, bounded by the grace period.
    if scheduler.shutdown().await == ShutdownOutcome::TimedOut {
        tracing::error!("scheduler shutdown error: grace period exceeded");
    }

    http_stop.cancel();
    if !server_done
        && tokio::time::timeout(cfg.sync.shutdown_grace(), server)
            .await
            .is_err()
    {
        tracing::error!("HTTP server shutdown error: grace period exceeded");
    }
    dbs.close().await;

    tracing::info!("shutdown complete");
    Ok(())
}
