// src/db.rs
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::config::DbConfig;
use crate::error::StoreError;

/// Liveness check for the stores behind the HTTP surface.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Silver (read-only source tables) and gold (unified table) pools.
#[derive(Clone)]
pub struct Databases {
    pub silver: PgPool,
    pub gold: PgPool,
}

impl Databases {
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn connect(silver: &DbConfig, gold: &DbConfig) -> Result<Self> {
        let silver = connect_pool(silver, true)
            .await
            .context("failed to connect to silver db")?;
        let gold = match connect_pool(gold, false).await {
            Ok(p) => p,
            Err(e) => {
                silver.close().await;
                return Err(e.context("failed to connect to gold db"));
            }
        };
        Ok(Self { silver, gold })
    }

    pub async fn close(&self) {
        self.silver.close().await;
        self.gold.close().await;
    }
}

pub fn connect_options(cfg: &DbConfig, read_only: bool) -> PgConnectOptions {
    let mut params = vec![("search_path", cfg.schema.as_str())];
    if read_only {
        params.push(("default_transaction_read_only", "on"));
    }
    PgConnectOptions::new()
        .host(&cfg.host)
        .port(cfg.port)
        .database(&cfg.name)
        .username(&cfg.user)
        .password(&cfg.password)
        .options(params)
}

async fn connect_pool(cfg: &DbConfig, read_only: bool) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .max_lifetime(Duration::from_secs(30 * 60))
        .idle_timeout(Duration::from_secs(5 * 60))
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options(cfg, read_only))
        .await
        .context("failed to create pool")?;

    if let Err(e) = sqlx::query("SELECT 1").execute(&pool).await {
        pool.close().await;
        return Err(anyhow::Error::new(e).context("failed to ping"));
    }
    Ok(pool)
}

#[async_trait]
impl HealthCheck for Databases {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.silver)
            .await
            .map_err(|e| StoreError::message(format!("silver db unhealthy: {e}")))?;
        sqlx::query("SELECT 1")
            .execute(&self.gold)
            .await
            .map_err(|e| StoreError::message(format!("gold db unhealthy: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for crate::target::memory::MemoryTarget {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
