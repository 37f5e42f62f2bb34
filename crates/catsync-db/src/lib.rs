//! Postgres persistence for sync configurations, tracked products and sync logs.

pub mod seed;
pub mod sync_configs;
pub mod sync_logs;
pub mod tracked_products;

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub use seed::seed_sync_configs;
pub use sync_configs::{
    delete_sync_config, get_sync_config, insert_sync_config, list_active_sync_configs,
    list_sync_configs, update_sync_config, SyncConfigRow,
};
pub use sync_logs::{
    create_sync_log, get_last_failed_sync, get_last_successful_sync, get_sync_log, list_sync_logs,
    update_sync_log, SyncLogRow,
};
pub use tracked_products::{
    delete_tracked_product, list_tracked_products, upsert_tracked_product, TrackedProductRow,
};

// Relative to crates/catsync-db/Cargo.toml.
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

/// Pool sizing, taken from [`catsync_core::AppConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &catsync_core::AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("stored {table} row {id} is invalid: {source}")]
    InvalidRow {
        table: &'static str,
        id: String,
        #[source]
        source: catsync_core::ConfigError,
    },
    #[error("failed to encode {context}: {source}")]
    Encode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Opens the pool that every catsync process shares.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Successful rows in `_sqlx_migrations`; zero before the first migration.
async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// Applies the embedded migrations and returns how many were new.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migrations(pool).await;
    Ok(usize::try_from(after - before).unwrap_or(0))
}

/// `SELECT 1` round trip.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await?;
    Ok(())
}
