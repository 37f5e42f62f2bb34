//! Database operations for `tracked_products`, the durable join between a
//! configuration's SKUs and the remote product/variant ids.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `tracked_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackedProductRow {
    pub id: i64,
    pub config_id: Uuid,
    /// SKU as last seen in the feed.
    pub sku: String,
    /// Normalized SKU (see [`catsync_core::sku_key`]); unique per config.
    pub sku_key: String,
    pub remote_product_id: String,
    pub remote_variant_id: Option<String>,
    pub last_payload: serde_json::Value,
    pub last_synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Inserts or refreshes the tracking row for `(config_id, sku)`.
///
/// Matching is on the normalized SKU, so a case change in the feed updates the
/// existing row instead of creating a second one.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_tracked_product(
    pool: &PgPool,
    config_id: Uuid,
    sku: &str,
    remote_product_id: &str,
    remote_variant_id: Option<&str>,
    payload: &serde_json::Value,
) -> Result<TrackedProductRow, DbError> {
    let row = sqlx::query_as::<_, TrackedProductRow>(
        "INSERT INTO tracked_products \
             (config_id, sku, sku_key, remote_product_id, remote_variant_id, last_payload, last_synced_at) \
         VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
         ON CONFLICT (config_id, sku_key) DO UPDATE SET \
             sku = EXCLUDED.sku, \
             remote_product_id = EXCLUDED.remote_product_id, \
             remote_variant_id = COALESCE(EXCLUDED.remote_variant_id, tracked_products.remote_variant_id), \
             last_payload = EXCLUDED.last_payload, \
             last_synced_at = NOW() \
         RETURNING id, config_id, sku, sku_key, remote_product_id, remote_variant_id, \
                   last_payload, last_synced_at, created_at",
    )
    .bind(config_id)
    .bind(sku)
    .bind(catsync_core::sku_key(sku))
    .bind(remote_product_id)
    .bind(remote_variant_id)
    .bind(payload)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Removes the tracking row for `(config_id, sku)`. Returns whether a row was deleted.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_tracked_product(
    pool: &PgPool,
    config_id: Uuid,
    sku: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM tracked_products WHERE config_id = $1 AND sku_key = $2")
        .bind(config_id)
        .bind(catsync_core::sku_key(sku))
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Returns every tracking row for a configuration, ordered by SKU key.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tracked_products(
    pool: &PgPool,
    config_id: Uuid,
) -> Result<Vec<TrackedProductRow>, DbError> {
    let rows = sqlx::query_as::<_, TrackedProductRow>(
        "SELECT id, config_id, sku, sku_key, remote_product_id, remote_variant_id, \
                last_payload, last_synced_at, created_at \
         FROM tracked_products \
         WHERE config_id = $1 \
         ORDER BY sku_key",
    )
    .bind(config_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
