//! Persistence seams used by the engine.
//!
//! Each store is a small async trait so the engine can run against Postgres
//! ([`PgStore`]) or a process-local map ([`MemoryStore`]).

use async_trait::async_trait;
use catsync_core::{
    ConfigError, NewSyncConfiguration, SyncConfigPatch, SyncConfiguration, SyncLogStatus,
    SyncLogUpdate,
};
use catsync_db::DbError;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration {0} not found")]
    ConfigNotFound(Uuid),

    #[error("sync log {0} not found")]
    LogNotFound(Uuid),

    #[error("stored configuration {id} is invalid: {source}")]
    InvalidConfig {
        id: Uuid,
        #[source]
        source: ConfigError,
    },

    #[error(transparent)]
    Rejected(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Durable link between a configuration's SKU and its remote identity.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingRecord {
    pub config_id: Uuid,
    pub sku: String,
    pub remote_product_id: String,
    pub remote_variant_id: Option<String>,
    pub last_payload: serde_json::Value,
    pub last_synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncLogEntry {
    pub id: Uuid,
    pub config_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SyncLogStatus,
    pub message: Option<String>,
    pub items_processed: i32,
    pub items_succeeded: i32,
    pub items_failed: i32,
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn list(&self) -> Result<Vec<SyncConfiguration>, StoreError>;

    /// `Ok(None)` when no configuration has `id`; [`StoreError::InvalidConfig`]
    /// when one exists but cannot be decoded.
    async fn get(&self, id: Uuid) -> Result<Option<SyncConfiguration>, StoreError>;

    async fn create(&self, config: NewSyncConfiguration) -> Result<SyncConfiguration, StoreError>;

    async fn update(&self, id: Uuid, patch: SyncConfigPatch)
        -> Result<SyncConfiguration, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    async fn upsert(
        &self,
        config_id: Uuid,
        sku: &str,
        remote_product_id: &str,
        remote_variant_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn remove(&self, config_id: Uuid, sku: &str) -> Result<bool, StoreError>;

    async fn list_by_config(&self, config_id: Uuid) -> Result<Vec<TrackingRecord>, StoreError>;
}

#[async_trait]
pub trait SyncLogStore: Send + Sync {
    /// Opens a log row in `started` status and returns its id.
    async fn create(&self, config_id: Uuid, message: &str) -> Result<Uuid, StoreError>;

    async fn update(&self, log_id: Uuid, update: &SyncLogUpdate) -> Result<(), StoreError>;

    async fn last_success(&self, config_id: Uuid) -> Result<Option<SyncLogEntry>, StoreError>;

    async fn last_failure(&self, config_id: Uuid) -> Result<Option<SyncLogEntry>, StoreError>;

    /// Most recent runs first, optionally for one configuration.
    async fn recent(
        &self,
        config_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SyncLogEntry>, StoreError>;
}
