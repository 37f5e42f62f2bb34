//! Process-local store for tests and dry runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use catsync_core::{
    sku_key, ConfigError, NewSyncConfiguration, SyncConfigPatch, SyncConfiguration,
    SyncLogStatus, SyncLogUpdate,
};
use chrono::Utc;
use uuid::Uuid;

use super::{
    ConfigStore, StoreError, SyncLogEntry, SyncLogStore, TrackingRecord, TrackingStore,
};

/// Implements every store trait over in-memory maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    configs: RwLock<HashMap<Uuid, SyncConfiguration>>,
    /// Keyed by `(config_id, sku_key)`.
    tracking: RwLock<HashMap<(Uuid, String), TrackingRecord>>,
    /// Insertion order breaks `end_time` ties.
    logs: RwLock<Vec<SyncLogEntry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every log row, oldest first.
    pub fn logs(&self) -> Vec<SyncLogEntry> {
        self.logs.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Appends a pre-built log row (for seeding history).
    pub fn push_log(&self, entry: SyncLogEntry) {
        self.logs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
    }

    fn latest_log(
        &self,
        config_id: Uuid,
        keep: impl Fn(SyncLogStatus) -> bool,
    ) -> Option<SyncLogEntry> {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        logs.iter()
            .enumerate()
            .filter(|(_, e)| e.config_id == config_id && keep(e.status))
            .filter_map(|(idx, e)| e.end_time.map(|end| (end, idx, e)))
            .max_by_key(|(end, idx, _)| (*end, *idx))
            .map(|(_, _, e)| e.clone())
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list(&self) -> Result<Vec<SyncConfiguration>, StoreError> {
        let mut configs: Vec<_> = self
            .configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(configs)
    }

    async fn get(&self, id: Uuid) -> Result<Option<SyncConfiguration>, StoreError> {
        Ok(self
            .configs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned())
    }

    async fn create(&self, config: NewSyncConfiguration) -> Result<SyncConfiguration, StoreError> {
        config.validate()?;
        let mut configs = self.configs.write().unwrap_or_else(|e| e.into_inner());
        let lowered = config.name.to_lowercase();
        if configs.values().any(|c| c.name.to_lowercase() == lowered) {
            return Err(ConfigError::Validation(format!(
                "a configuration named '{}' already exists",
                config.name
            ))
            .into());
        }
        let stored = config.into_configuration(Uuid::new_v4());
        configs.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: Uuid,
        patch: SyncConfigPatch,
    ) -> Result<SyncConfiguration, StoreError> {
        let mut configs = self.configs.write().unwrap_or_else(|e| e.into_inner());
        let current = configs.get(&id).ok_or(StoreError::ConfigNotFound(id))?;
        let next = patch.apply_to(current)?;
        configs.insert(id, next.clone());
        Ok(next)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self
            .configs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .is_some();
        if removed {
            self.tracking
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|(config_id, _), _| *config_id != id);
            self.logs
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|e| e.config_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn upsert(
        &self,
        config_id: Uuid,
        sku: &str,
        remote_product_id: &str,
        remote_variant_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut tracking = self.tracking.write().unwrap_or_else(|e| e.into_inner());
        let key = (config_id, sku_key(sku));
        let previous_variant = tracking
            .get(&key)
            .and_then(|r| r.remote_variant_id.clone());
        tracking.insert(
            key,
            TrackingRecord {
                config_id,
                sku: sku.to_string(),
                remote_product_id: remote_product_id.to_string(),
                remote_variant_id: remote_variant_id.map(str::to_string).or(previous_variant),
                last_payload: payload.clone(),
                last_synced_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn remove(&self, config_id: Uuid, sku: &str) -> Result<bool, StoreError> {
        Ok(self
            .tracking
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(config_id, sku_key(sku)))
            .is_some())
    }

    async fn list_by_config(&self, config_id: Uuid) -> Result<Vec<TrackingRecord>, StoreError> {
        let mut records: Vec<_> = self
            .tracking
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|((id, _), _)| *id == config_id)
            .map(|(_, r)| r.clone())
            .collect();
        records.sort_by_key(|r| sku_key(&r.sku));
        Ok(records)
    }
}

#[async_trait]
impl SyncLogStore for MemoryStore {
    async fn create(&self, config_id: Uuid, message: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        self.push_log(SyncLogEntry {
            id,
            config_id,
            start_time: Utc::now(),
            end_time: None,
            status: SyncLogStatus::Started,
            message: Some(message.to_string()),
            items_processed: 0,
            items_succeeded: 0,
            items_failed: 0,
        });
        Ok(id)
    }

    async fn update(&self, log_id: Uuid, update: &SyncLogUpdate) -> Result<(), StoreError> {
        let mut logs = self.logs.write().unwrap_or_else(|e| e.into_inner());
        let entry = logs
            .iter_mut()
            .find(|e| e.id == log_id)
            .ok_or(StoreError::LogNotFound(log_id))?;
        if let Some(status) = update.status {
            entry.status = status;
        }
        if let Some(message) = &update.message {
            entry.message = Some(message.clone());
        }
        if let Some(n) = update.items_processed {
            entry.items_processed = n;
        }
        if let Some(n) = update.items_succeeded {
            entry.items_succeeded = n;
        }
        if let Some(n) = update.items_failed {
            entry.items_failed = n;
        }
        if update.is_terminal() {
            entry.end_time = Some(Utc::now());
        }
        Ok(())
    }

    async fn last_success(&self, config_id: Uuid) -> Result<Option<SyncLogEntry>, StoreError> {
        Ok(self.latest_log(config_id, SyncLogStatus::is_success))
    }

    async fn last_failure(&self, config_id: Uuid) -> Result<Option<SyncLogEntry>, StoreError> {
        Ok(self.latest_log(config_id, |s| s == SyncLogStatus::Failed))
    }

    async fn recent(
        &self,
        config_id: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        let logs = self.logs.read().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<(usize, &SyncLogEntry)> = logs
            .iter()
            .enumerate()
            .filter(|(_, e)| config_id.is_none_or(|id| e.config_id == id))
            .collect();
        rows.sort_by(|(ia, a), (ib, b)| (b.start_time, ib).cmp(&(a.start_time, ia)));
        Ok(rows
            .into_iter()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }
}
