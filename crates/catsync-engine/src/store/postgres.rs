//! [`ConfigStore`], [`TrackingStore`] and [`SyncLogStore`] over `catsync-db`.

use async_trait::async_trait;
use catsync_core::{NewSyncConfiguration, SyncConfigPatch, SyncConfiguration, SyncLogUpdate};
use catsync_db::{DbError, SyncConfigRow, SyncLogRow};
use sqlx::PgPool;
use uuid::Uuid;

use super::{
    ConfigStore, StoreError, SyncLogEntry, SyncLogStore, TrackingRecord, TrackingStore,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_config(row: &SyncConfigRow) -> Result<SyncConfiguration, StoreError> {
    row.to_configuration()
        .map_err(|source| StoreError::InvalidConfig { id: row.id, source })
}

fn decode_log(row: SyncLogRow) -> Result<SyncLogEntry, StoreError> {
    let status = row.status.parse().map_err(|source| {
        StoreError::Db(DbError::InvalidRow {
            table: "sync_logs",
            id: row.id.to_string(),
            source,
        })
    })?;
    Ok(SyncLogEntry {
        id: row.id,
        config_id: row.config_id,
        start_time: row.start_time,
        end_time: row.end_time,
        status,
        message: row.message,
        items_processed: row.items_processed,
        items_succeeded: row.items_succeeded,
        items_failed: row.items_failed,
    })
}

#[async_trait]
impl ConfigStore for PgStore {
    /// Rows that no longer decode are skipped with a warning so one bad
    /// configuration cannot hide the others.
    async fn list(&self) -> Result<Vec<SyncConfiguration>, StoreError> {
        let rows = catsync_db::list_sync_configs(&self.pool).await?;
        let mut configs = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_config(row) {
                Ok(config) => configs.push(config),
                Err(e) => tracing::warn!(config_id = %row.id, name = %row.name, error = %e, "skipping undecodable sync configuration"),
            }
        }
        Ok(configs)
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncConfiguration>, StoreError> {
        catsync_db::get_sync_config(&self.pool, id)
            .await?
            .as_ref()
            .map(decode_config)
            .transpose()
    }

    async fn create(&self, config: NewSyncConfiguration) -> Result<SyncConfiguration, StoreError> {
        config.validate()?;
        let row = catsync_db::insert_sync_config(&self.pool, &config).await?;
        decode_config(&row)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: SyncConfigPatch,
    ) -> Result<SyncConfiguration, StoreError> {
        let current = self.get(id).await?.ok_or(StoreError::ConfigNotFound(id))?;
        let next = patch.apply_to(&current)?;
        let row = catsync_db::update_sync_config(&self.pool, &next)
            .await
            .map_err(|e| match e {
                DbError::NotFound => StoreError::ConfigNotFound(id),
                other => StoreError::Db(other),
            })?;
        decode_config(&row)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(catsync_db::delete_sync_config(&self.pool, id).await?)
    }
}

#[async_trait]
impl TrackingStore for PgStore {
    async fn upsert(
        &self,
        config_id: Uuid,
        sku: &str,
        remote_product_id: &str,
        remote_variant_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError> {
        catsync_db::upsert_tracked_product(
            &self.pool,
            config_id,
            sku,
            remote_product_id,
            remote_variant_id,
            payload,
        )
        .await?;
        Ok(())
    }

    async fn remove(&self, config_id: Uuid, sku: &str) -> Result<bool, StoreError> {
        Ok(catsync_db::delete_tracked_product(&self.pool, config_id, sku).await?)
    }

    async fn list_by_config(&self, config_id: Uuid) -> Result<Vec<TrackingRecord>, StoreError> {
        let rows = catsync_db::list_tracked_products(&self.pool, config_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| TrackingRecord {
                config_id: row.config_id,
                sku: row.sku,
                remote_product_id: row.remote_product_id,
                remote_variant_id: row.remote_variant_id,
                last_payload: row.last_payload,
                last_synced_at: row.last_synced_at,
            })
            .collect())
    }
}

#[async_trait]
impl SyncLogStore for PgStore {
    async fn create(&self, config_id: Uuid, message: &str) -> Result<Uuid, StoreError> {
        Ok(catsync_db::create_sync_log(&self.pool, config_id, message)
            .await?
            .id)
    }

    async fn update(&self, log_id: Uuid, update: &SyncLogUpdate) -> Result<(), StoreError> {
        catsync_db::update_sync_log(&self.pool, log_id, update)
            .await
            .map_err(|e| match e {
                DbError::NotFound => StoreError::LogNotFound(log_id),
                other => StoreError::Db(other),
            })
    }

    async fn last_success(&self, config_id: Uuid) -> Result<Option<SyncLogEntry>, StoreError> {
        catsync_db::get_last_successful_sync(&self.pool, config_id)
            .await?
            .map(decode_log)
            .transpose()
    }

    async fn last_failure(&self, config_id: Uuid) -> Result<Option<SyncLogEntry>, StoreError> {
        catsync_db::get_last_failed_sync(&self.pool, config_id)
            .await?
            .map(decode_log)
            .transpose()
    }

    async fn recent(
        &self,
        config_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        catsync_db::list_sync_logs(&self.pool, config_id, limit)
            .await?
            .into_iter()
            .map(decode_log)
            .collect()
    }
}
