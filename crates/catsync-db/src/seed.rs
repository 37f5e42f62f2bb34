use catsync_core::NewSyncConfiguration;
use sqlx::PgPool;
use uuid::Uuid;

use crate::sync_configs::encode_columns;
use crate::DbError;

/// Upsert sync configurations by name.
///
/// Returns the number of configurations processed (inserted or updated).
/// All upserts run inside a single transaction; if any operation fails
/// the entire batch is rolled back. Existing rows keep their id so tracking
/// rows and logs stay attached.
///
/// # Errors
///
/// Returns [`DbError::Encode`] if a JSON column cannot be encoded, or
/// [`DbError::Sqlx`] if any database operation fails.
pub async fn seed_sync_configs(
    pool: &PgPool,
    configs: &[NewSyncConfiguration],
) -> Result<usize, DbError> {
    let mut tx = pool.begin().await?;
    let mut count = 0usize;

    for config in configs {
        let cols = encode_columns(
            &config.credentials,
            &config.field_mapping,
            &config.custom_attributes,
            config.sync_frequency_hours,
        )?;

        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO sync_configurations \
                 (id, name, source_type, credentials, field_mapping, custom_attributes, \
                  sync_frequency_hours, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (name) DO UPDATE SET \
                 source_type = EXCLUDED.source_type, \
                 credentials = EXCLUDED.credentials, \
                 field_mapping = EXCLUDED.field_mapping, \
                 custom_attributes = EXCLUDED.custom_attributes, \
                 sync_frequency_hours = EXCLUDED.sync_frequency_hours, \
                 is_active = EXCLUDED.is_active, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(&config.name)
        .bind(config.source_type.as_str())
        .bind(&cols.credentials)
        .bind(&cols.field_mapping)
        .bind(&cols.custom_attributes)
        .bind(cols.sync_frequency_hours)
        .bind(config.is_active)
        .fetch_one(&mut *tx)
        .await?;

        tracing::debug!(config = %config.name, %id, "seeded sync configuration");
        count += 1;
    }

    tx.commit().await?;
    Ok(count)
}
