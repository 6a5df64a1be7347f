//! Bootstrap of the reports runtime from loaded configuration.
//!
//! Opens the database, applies migrations and builds every adapter the
//! scheduling runtime needs.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::adapters::artifacts::FsArtifactStore;
use crate::adapters::email::mailer_from_config;
use crate::adapters::sqlite::{
    database_url, initialize_database, PoolConfig, SqliteAnalyticsSource, SqliteReportScheduleRepository,
};
use crate::domain::models::config::Config;
use crate::domain::ports::clock::SystemClock;
use crate::services::runtime::{ReportsRuntime, RuntimePorts};

/// Open the configured database with the schema up to date.
pub async fn open_database(config: &Config) -> Result<SqlitePool> {
    let url = database_url(&config.database.path);
    initialize_database(&url, Some(PoolConfig::from(&config.database)))
        .await
        .with_context(|| format!("Failed to open database at {}", config.database.path))
}

/// Production adapters over an open pool.
pub fn runtime_ports(pool: SqlitePool, config: &Config) -> Result<RuntimePorts> {
    let mailer = mailer_from_config(&config.smtp).context("Failed to configure mailer")?;
    Ok(RuntimePorts {
        repo: Arc::new(SqliteReportScheduleRepository::new(pool.clone())),
        analytics: Arc::new(SqliteAnalyticsSource::new(pool)),
        artifacts: Arc::new(FsArtifactStore::new(&config.reports.artifact_root)),
        mailer,
        clock: Arc::new(SystemClock),
    })
}

/// Wire a complete runtime over an open pool.
pub fn build_runtime(pool: SqlitePool, config: &Config) -> Result<ReportsRuntime> {
    let ports = runtime_ports(pool, config)?;
    tracing::debug!(
        database = %config.database.path,
        artifact_root = %config.reports.artifact_root,
        mailer = ports.mailer.name(),
        "Runtime adapters ready"
    );
    Ok(ReportsRuntime::new(ports, &config.reports))
}
