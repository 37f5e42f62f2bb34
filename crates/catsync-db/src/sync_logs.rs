//! Database operations for `sync_logs`.

use catsync_core::{SyncLogStatus, SyncLogUpdate};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SELECT_COLUMNS: &str = "id, config_id, start_time, end_time, status, message, \
     items_processed, items_succeeded, items_failed";

/// A row from the `sync_logs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncLogRow {
    pub id: Uuid,
    pub config_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: String,
    pub message: Option<String>,
    pub items_processed: i32,
    pub items_succeeded: i32,
    pub items_failed: i32,
}

impl SyncLogRow {
    /// Parsed status; `None` if the stored value is unknown.
    #[must_use]
    pub fn status(&self) -> Option<SyncLogStatus> {
        self.status.parse().ok()
    }
}

/// Creates a log row in `started` status and returns it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_sync_log(
    pool: &PgPool,
    config_id: Uuid,
    message: &str,
) -> Result<SyncLogRow, DbError> {
    let row = sqlx::query_as::<_, SyncLogRow>(&format!(
        "INSERT INTO sync_logs (id, config_id, status, message) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {SELECT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(config_id)
    .bind(SyncLogStatus::Started.as_str())
    .bind(message)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Applies `update` to a log row. A terminal status also sets `end_time = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the row does not exist, or [`DbError::Sqlx`]
/// if the update fails.
pub async fn update_sync_log(
    pool: &PgPool,
    id: Uuid,
    update: &SyncLogUpdate,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE sync_logs SET \
             status = COALESCE($2, status), \
             message = COALESCE($3, message), \
             items_processed = COALESCE($4, items_processed), \
             items_succeeded = COALESCE($5, items_succeeded), \
             items_failed = COALESCE($6, items_failed), \
             end_time = CASE WHEN $7 THEN NOW() ELSE end_time END \
         WHERE id = $1",
    )
    .bind(id)
    .bind(update.status.map(SyncLogStatus::as_str))
    .bind(update.message.as_deref())
    .bind(update.items_processed)
    .bind(update.items_succeeded)
    .bind(update.items_failed)
    .bind(update.is_terminal())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    Ok(())
}

/// Fetches a single log row by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_log(pool: &PgPool, id: Uuid) -> Result<SyncLogRow, DbError> {
    sqlx::query_as::<_, SyncLogRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM sync_logs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Most recent run that finished successfully (`completed` or
/// `completed_with_errors`), by `end_time`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_last_successful_sync(
    pool: &PgPool,
    config_id: Uuid,
) -> Result<Option<SyncLogRow>, DbError> {
    let row = sqlx::query_as::<_, SyncLogRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM sync_logs \
         WHERE config_id = $1 AND status IN ('completed', 'completed_with_errors') \
           AND end_time IS NOT NULL \
         ORDER BY end_time DESC \
         LIMIT 1"
    ))
    .bind(config_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Most recent `failed` run, by `end_time`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_last_failed_sync(
    pool: &PgPool,
    config_id: Uuid,
) -> Result<Option<SyncLogRow>, DbError> {
    let row = sqlx::query_as::<_, SyncLogRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM sync_logs \
         WHERE config_id = $1 AND status = 'failed' AND end_time IS NOT NULL \
         ORDER BY end_time DESC \
         LIMIT 1"
    ))
    .bind(config_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Returns the most recent `limit` log rows, newest first, optionally for one config.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_logs(
    pool: &PgPool,
    config_id: Option<Uuid>,
    limit: i64,
) -> Result<Vec<SyncLogRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncLogRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM sync_logs \
         WHERE ($1::uuid IS NULL OR config_id = $1) \
         ORDER BY start_time DESC, id DESC \
         LIMIT $2"
    ))
    .bind(config_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
