// src/config/mod.rs
//! Layered configuration: defaults → TOML file → environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;
use crate::model::SourceKind;

const ENV_PATH: &str = "SYNC_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/sync.toml";
pub const MAX_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub batch_size: usize,
    /// Registered source-kinds by name; empty list is rejected.
    pub sources: Vec<String>,
    pub shutdown_grace_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            batch_size: crate::sync::DEFAULT_BATCH_SIZE,
            sources: SourceKind::ALL.iter().map(|k| k.to_string()).collect(),
            shutdown_grace_secs: 30,
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Parsed, de-duplicated source list (registration order kept).
    pub fn source_kinds(&self) -> Result<Vec<SourceKind>, SyncError> {
        let mut out = Vec::new();
        for s in self.sources.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let kind = s.parse::<SourceKind>().map_err(SyncError::Configuration)?;
            if !out.contains(&kind) {
                out.push(kind);
            }
        }
        if out.is_empty() {
            return Err(SyncError::Configuration(
                "at least one source must be registered".into(),
            ));
        }
        Ok(out)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.interval_secs == 0 {
            return Err(SyncError::Configuration(
                "sync interval must be positive".into(),
            ));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(SyncError::Configuration(format!(
                "batch size must be within 1..={MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.shutdown_grace_secs == 0 {
            return Err(SyncError::Configuration(
                "shutdown grace must be positive".into(),
            ));
        }
        self.source_kinds().map(|_| ())
    }
}

/// Connection settings for one Postgres database; env-only (credentials).
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub schema: String,
}

impl DbConfig {
    /// Read `<PREFIX>_DB_{HOST,PORT,NAME,USER,PASSWORD,SCHEMA}`.
    pub fn from_env(prefix: &str, default_name: &str, default_schema: &str) -> Result<Self, SyncError> {
        let var = |k: &str| std::env::var(format!("{prefix}_DB_{k}")).ok();
        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "localhost".to_string()),
            port: parse_env_opt(&format!("{prefix}_DB_PORT"))?.unwrap_or(5432),
            name: var("NAME").unwrap_or_else(|| default_name.to_string()),
            user: var("USER").unwrap_or_default(),
            password: var("PASSWORD").unwrap_or_default(),
            schema: var("SCHEMA").unwrap_or_else(|| default_schema.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub silver: DbConfig,
    pub gold: DbConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    server: ServerConfig,
    sync: SyncConfig,
}

impl AppConfig {
    /// Resolve the file layer via `$SYNC_CONFIG_PATH`, then `config/sync.toml`,
    /// then apply env overrides and validate.
    pub fn load() -> Result<Self> {
        let path = match std::env::var(ENV_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                anyhow::ensure!(pb.exists(), "{ENV_PATH} points to non-existent path");
                Some(pb)
            }
            Err(_) => Some(PathBuf::from(DEFAULT_PATH)).filter(|p| p.exists()),
        };
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("reading sync config from {}", p.display()))?;
                toml::from_str::<FileConfig>(&content)
                    .with_context(|| format!("parsing sync config {}", p.display()))?
            }
            None => FileConfig::default(),
        };

        let mut cfg = Self {
            server: file.server,
            silver: DbConfig::from_env("SILVER", "etl", "silver")?,
            gold: DbConfig::from_env("GOLD", "hana_securities", "gold")?,
            sync: file.sync,
        };
        cfg.apply_env()?;
        cfg.sync.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<(), SyncError> {
        if let Some(port) = parse_env_opt("SERVER_PORT")? {
            self.server.port = port;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(mins) = parse_env_opt::<u64>("BATCH_INTERVAL_MINUTES")? {
            self.sync.interval_secs = mins.saturating_mul(60);
        }
        if let Some(secs) = parse_env_opt("SYNC_INTERVAL_SECS")? {
            self.sync.interval_secs = secs;
        }
        if let Some(n) = parse_env_opt("SYNC_BATCH_SIZE")? {
            self.sync.batch_size = n;
        }
        if let Ok(list) = std::env::var("SYNC_SOURCES") {
            self.sync.sources = list.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(secs) = parse_env_opt("SHUTDOWN_GRACE_SECS")? {
            self.sync.shutdown_grace_secs = secs;
        }
        Ok(())
    }
}

fn parse_env_opt<T: std::str::FromStr>(key: &str) -> Result<Option<T>, SyncError> {
    match std::env::var(key) {
        Ok(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SyncError::Configuration(format!("{key}: invalid value {v:?}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = SyncConfig::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.interval(), Duration::from_secs(600));
        assert_eq!(
            s.source_kinds().unwrap(),
            vec![SourceKind::JpMinkabu, SourceKind::CnWind]
        );
    }

    #[test]
    fn invalid_values_are_configuration_failures() {
        let zero_interval = SyncConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(SyncError::Configuration(_))
        ));

        let big_batch = SyncConfig {
            batch_size: MAX_BATCH_SIZE + 1,
            ..Default::default()
        };
        assert!(big_batch.validate().is_err());

        let unknown = SyncConfig {
            sources: vec!["jp_minkabu".into(), "us_bloomberg".into()],
            ..Default::default()
        };
        assert!(unknown.validate().is_err());

        let none = SyncConfig {
            sources: vec![" ".into()],
            ..Default::default()
        };
        assert!(none.validate().is_err());
    }

    #[test]
    fn duplicate_sources_collapse() {
        let s = SyncConfig {
            sources: vec!["cn_wind".into(), "CN_WIND".into(), "jp_minkabu".into()],
            ..Default::default()
        };
        assert_eq!(
            s.source_kinds().unwrap(),
            vec![SourceKind::CnWind, SourceKind::JpMinkabu]
        );
    }
}
