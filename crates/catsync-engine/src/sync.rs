//! One reconciliation run, end to end.

use std::sync::Arc;

use catsync_core::{AppConfig, SyncConfiguration, SyncLogStatus, SyncLogUpdate};
use catsync_shopify::{ClientOptions, ShopifyClient};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::bulk::{BulkRunner, BulkSettings};
use crate::categorizer::{categorize, WriteItem};
use crate::direct::{DirectRunner, DEFAULT_DIRECT_CONCURRENCY};
use crate::error::SyncError;
use crate::feed::{extract_records, FeedFetcher, SourceFetcher};
use crate::mapper::map_record;
use crate::outcome::BatchOutcome;
use crate::resolver::CatalogResolver;
use crate::store::{ConfigStore, PgStore, StoreError, SyncLogStore, TrackingStore};
use crate::strategy::{choose_path, ExecutionPath, DEFAULT_BULK_THRESHOLD};
use crate::sweeper::{CleanupSummary, Sweeper};

/// Records processed by a limited run when no limit is given.
pub const DEFAULT_LIMIT: usize = 100;
/// Failure reasons quoted in a run's log message.
const MAX_QUOTED_ERRORS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Process only the first `limit` feed records and skip deletes.
    pub limited: bool,
    pub limit: usize,
    /// Use bulk jobs for any non-empty create or update set.
    pub use_bulk: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limited: false,
            limit: DEFAULT_LIMIT,
            use_bulk: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duplicates_removed: usize,
    pub sync_log_id: Option<Uuid>,
}

impl RunSummary {
    fn log_message(&self, errors: &[String]) -> String {
        let mut message = format!(
            "Sync completed: {} created, {} updated, {} deleted, {} failed, {} skipped",
            self.created, self.updated, self.deleted, self.failed, self.skipped
        );
        if self.duplicates_removed > 0 {
            message.push_str(&format!(", {} duplicates removed", self.duplicates_removed));
        }
        if !errors.is_empty() {
            let quoted: Vec<&str> = errors.iter().take(MAX_QUOTED_ERRORS).map(String::as_str).collect();
            message.push_str(&format!(". Errors: {}", quoted.join(" | ")));
            if errors.len() > MAX_QUOTED_ERRORS {
                message.push_str(&format!(" (+{} more)", errors.len() - MAX_QUOTED_ERRORS));
            }
        }
        message
    }

    fn to_counts(&self) -> (i32, i32, i32) {
        let succeeded = self.created + self.updated + self.deleted;
        let clamp = |n: usize| i32::try_from(n).unwrap_or(i32::MAX);
        (
            clamp(succeeded + self.failed),
            clamp(succeeded),
            clamp(self.failed),
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub bulk_threshold: usize,
    pub direct_concurrency: usize,
    pub bulk: BulkSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bulk_threshold: DEFAULT_BULK_THRESHOLD,
            direct_concurrency: DEFAULT_DIRECT_CONCURRENCY,
            bulk: BulkSettings::default(),
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            bulk_threshold: config.bulk_threshold,
            direct_concurrency: config.direct_concurrency,
            bulk: BulkSettings {
                poll_interval: std::time::Duration::from_secs(config.bulk_poll_interval_secs),
                max_poll_attempts: config.bulk_max_poll_attempts,
            },
        }
    }
}

/// The three persistence seams the engine writes through.
#[derive(Clone)]
pub struct Stores {
    pub configs: Arc<dyn ConfigStore>,
    pub tracking: Arc<dyn TrackingStore>,
    pub logs: Arc<dyn SyncLogStore>,
}

impl Stores {
    #[must_use]
    pub fn postgres(pool: PgPool) -> Self {
        Self::shared(Arc::new(PgStore::new(pool)))
    }

    /// All three seams backed by one value.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: ConfigStore + TrackingStore + SyncLogStore + 'static,
    {
        Self {
            configs: store.clone(),
            tracking: store.clone(),
            logs: store,
        }
    }
}

pub struct SyncEngine {
    stores: Stores,
    feeds: Arc<dyn FeedFetcher>,
    client: Arc<ShopifyClient>,
    resolver: CatalogResolver,
    settings: EngineSettings,
    /// One bulk mutation per shop at a time.
    bulk_lock: Mutex<()>,
}

impl SyncEngine {
    #[must_use]
    pub fn new(
        stores: Stores,
        feeds: Arc<dyn FeedFetcher>,
        client: Arc<ShopifyClient>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            resolver: CatalogResolver::new(Arc::clone(&client)),
            stores,
            feeds,
            client,
            settings,
            bulk_lock: Mutex::new(()),
        }
    }

    /// Postgres-backed engine wired from environment configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] when the platform credentials are
    /// missing or a client cannot be built.
    pub fn from_app_config(config: &AppConfig, pool: PgPool) -> Result<Self, SyncError> {
        let (domain, token) = config.shopify_credentials()?;
        let client = ShopifyClient::new(domain, token, &ClientOptions::from_app_config(config))
            .map_err(|e| SyncError::Configuration(format!("platform client: {e}")))?;
        let feeds = SourceFetcher::from_app_config(config)?;
        Ok(Self::new(
            Stores::postgres(pool),
            Arc::new(feeds),
            Arc::new(client),
            EngineSettings::from_app_config(config),
        ))
    }

    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Runs one reconciliation for `config_id`.
    ///
    /// Every run that opened a sync log finishes it with exactly one terminal
    /// status, whether the run succeeds or fails.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] for an unknown or invalid
    /// configuration, and any run-fatal error ([`SyncError::is_fatal`]).
    pub async fn run_sync(&self, config_id: Uuid, options: RunOptions) -> Result<RunSummary, SyncError> {
        let config = match self.stores.configs.get(config_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                return Err(SyncError::Configuration(format!(
                    "sync configuration {config_id} not found"
                )))
            }
            Err(StoreError::InvalidConfig { id, source }) => {
                let log_id = self.stores.logs.create(id, "Sync started").await?;
                let err = SyncError::Configuration(format!("configuration {id} is invalid: {source}"));
                self.finish_failed(log_id, &err).await;
                return Err(err);
            }
            Err(e) => return Err(e.into()),
        };

        let start_message = if options.limited {
            format!("Limited sync started (first {} records)", options.limit)
        } else {
            "Sync started".to_owned()
        };
        let log_id = self.stores.logs.create(config_id, &start_message).await?;
        tracing::info!(
            config_id = %config_id,
            sync_log_id = %log_id,
            name = %config.name,
            limited = options.limited,
            use_bulk = options.use_bulk,
            "sync run started"
        );

        match self.execute(&config, log_id, options).await {
            Ok((mut summary, errors)) => {
                summary.sync_log_id = Some(log_id);
                let status = if summary.failed > 0 {
                    SyncLogStatus::CompletedWithErrors
                } else {
                    SyncLogStatus::Completed
                };
                let (processed, succeeded, failed) = summary.to_counts();
                let update = SyncLogUpdate {
                    status: Some(status),
                    message: Some(summary.log_message(&errors)),
                    items_processed: Some(processed),
                    items_succeeded: Some(succeeded),
                    items_failed: Some(failed),
                };
                if let Err(e) = self.stores.logs.update(log_id, &update).await {
                    tracing::error!(sync_log_id = %log_id, error = %e, "failed to finalize sync log");
                }
                tracing::info!(
                    config_id = %config_id,
                    sync_log_id = %log_id,
                    status = %status,
                    created = summary.created,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    failed = summary.failed,
                    skipped = summary.skipped,
                    "sync run finished"
                );
                Ok(summary)
            }
            Err(err) => {
                tracing::error!(config_id = %config_id, sync_log_id = %log_id, error = %err, "sync run failed");
                self.finish_failed(log_id, &err).await;
                Err(err)
            }
        }
    }

    async fn finish_failed(&self, log_id: Uuid, err: &SyncError) {
        let update = SyncLogUpdate {
            items_processed: Some(0),
            items_succeeded: Some(0),
            items_failed: Some(0),
            ..SyncLogUpdate::phase(SyncLogStatus::Failed, format!("Sync failed: {err}"))
        };
        if let Err(e) = self.stores.logs.update(log_id, &update).await {
            tracing::error!(sync_log_id = %log_id, error = %e, "failed to record sync failure");
        }
    }

    async fn phase(&self, log_id: Uuid, status: SyncLogStatus, message: impl Into<String>) -> Result<(), SyncError> {
        self.stores
            .logs
            .update(log_id, &SyncLogUpdate::phase(status, message))
            .await?;
        Ok(())
    }

    async fn execute(
        &self,
        config: &SyncConfiguration,
        log_id: Uuid,
        options: RunOptions,
    ) -> Result<(RunSummary, Vec<String>), SyncError> {
        self.phase(log_id, SyncLogStatus::Processing, "Fetching feed").await?;
        let document = self
            .feeds
            .fetch(config.source_type, &config.credentials)
            .await?;
        let mut records = extract_records(document, config.credentials.data_path.as_deref())?;
        if options.limited {
            records.truncate(options.limit);
        }

        let mut summary = RunSummary::default();
        let mut entities = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate() {
            match map_record(record, config) {
                Ok(entity) => entities.push(entity),
                Err(reason) => {
                    summary.skipped += 1;
                    tracing::debug!(config_id = %config.id, record = idx, ?reason, "skipping feed record");
                }
            }
        }

        let skus: Vec<String> = entities.iter().map(|e| e.sku.clone()).collect();
        let identities = self.resolver.resolve(&skus).await;
        let tracked = self.stores.tracking.list_by_config(config.id).await?;
        let plan = categorize(entities, &identities, &tracked, !options.limited);
        summary.skipped += plan.duplicates;

        tracing::info!(
            config_id = %config.id,
            sync_log_id = %log_id,
            records = records.len(),
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            deletes = plan.deletes.len(),
            skipped = summary.skipped,
            "reconciliation planned"
        );
        self.phase(
            log_id,
            SyncLogStatus::Processing,
            format!(
                "Processing {} creates, {} updates, {} deletes",
                plan.creates.len(),
                plan.updates.len(),
                plan.deletes.len()
            ),
        )
        .await?;

        let location = if plan.creates.is_empty() {
            None
        } else {
            match self.resolver.default_location().await {
                Ok(id) => Some(id.to_owned()),
                Err(e) => {
                    tracing::warn!(error = %e, "no default location; creating without initial stock");
                    None
                }
            }
        };

        let mut errors = Vec::new();
        let creates = self
            .write_set(config.id, log_id, &plan.creates, location.as_deref(), options.use_bulk)
            .await?;
        let updates = self
            .write_set(config.id, log_id, &plan.updates, location.as_deref(), options.use_bulk)
            .await?;
        let deletes = self.direct(config.id).delete(&plan.deletes).await;

        summary.created = creates.succeeded;
        summary.updated = updates.succeeded;
        summary.deleted = deletes.succeeded;
        summary.failed = creates.failed + updates.failed + deletes.failed;
        for outcome in [creates, updates, deletes] {
            errors.extend(outcome.errors);
        }

        match self.cleanup_duplicates(Some(log_id)).await {
            Ok(cleanup) => summary.duplicates_removed = cleanup.deleted,
            Err(e) => tracing::warn!(sync_log_id = %log_id, error = %e, "duplicate cleanup failed"),
        }

        Ok((summary, errors))
    }

    fn direct(&self, config_id: Uuid) -> DirectRunner<'_> {
        DirectRunner {
            client: &self.client,
            tracking: self.stores.tracking.as_ref(),
            config_id,
            concurrency: self.settings.direct_concurrency,
        }
    }

    async fn write_set(
        &self,
        config_id: Uuid,
        log_id: Uuid,
        items: &[WriteItem],
        location: Option<&str>,
        force_bulk: bool,
    ) -> Result<BatchOutcome, SyncError> {
        match choose_path(items.len(), self.settings.bulk_threshold, force_bulk) {
            ExecutionPath::Direct => Ok(self.direct(config_id).write(items, location).await),
            ExecutionPath::Bulk => {
                let kind = if items.first().is_some_and(WriteItem::is_create) {
                    "creates"
                } else {
                    "updates"
                };
                self.phase(
                    log_id,
                    SyncLogStatus::BulkOperationStarted,
                    format!("Bulk operation started for {} {kind}", items.len()),
                )
                .await?;
                let runner = BulkRunner {
                    client: &self.client,
                    tracking: self.stores.tracking.as_ref(),
                    config_id,
                    settings: self.settings.bulk,
                    lock: &self.bulk_lock,
                };
                Ok(runner.execute(items, location).await)
            }
        }
    }

    /// Removes duplicate products across the whole catalog. With a log id,
    /// the run's log shows the cleanup phase.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transport`] if the catalog scan fails, or
    /// [`SyncError::Store`] if the log cannot be updated.
    pub async fn cleanup_duplicates(&self, sync_log_id: Option<Uuid>) -> Result<CleanupSummary, SyncError> {
        if let Some(log_id) = sync_log_id {
            self.phase(log_id, SyncLogStatus::CleaningDuplicates, "Cleaning duplicate products")
                .await?;
        }
        let summary = Sweeper { client: &self.client }.sweep().await?;
        tracing::info!(
            sync_log_id = ?sync_log_id,
            total_scanned = summary.total_scanned,
            duplicate_groups = summary.duplicate_groups,
            deleted = summary.deleted,
            errors = summary.errors,
            "duplicate cleanup finished"
        );
        Ok(summary)
    }
}
