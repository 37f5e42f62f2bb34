//! Per-item `productSet` / `productDelete` calls under a concurrency cap.

use std::sync::LazyLock;

use catsync_shopify::{ShopifyClient, ShopifyError};
use futures::stream::{self, StreamExt};
use regex::Regex;
use uuid::Uuid;

use crate::categorizer::WriteItem;
use crate::outcome::BatchOutcome;
use crate::store::{TrackingRecord, TrackingStore};

/// Default in-flight limit for one run's direct calls.
pub const DEFAULT_DIRECT_CONCURRENCY: usize = 2;

static ALREADY_GONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)does not exist|not found|could not be found").expect("valid already-gone regex")
});

/// `true` when a delete failed only because the product is already gone.
#[must_use]
pub fn is_already_gone(err: &ShopifyError) -> bool {
    match err {
        ShopifyError::UserErrors(errors) => errors.iter().any(|e| ALREADY_GONE_RE.is_match(&e.message)),
        ShopifyError::GraphQl(message) => ALREADY_GONE_RE.is_match(message),
        _ => false,
    }
}

enum ItemResult {
    Ok,
    Failed(String),
}

fn tally(results: Vec<ItemResult>) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for result in results {
        outcome.processed += 1;
        match result {
            ItemResult::Ok => outcome.succeeded += 1,
            ItemResult::Failed(reason) => {
                outcome.failed += 1;
                outcome.errors.push(reason);
            }
        }
    }
    outcome
}

pub struct DirectRunner<'a> {
    pub client: &'a ShopifyClient,
    pub tracking: &'a dyn TrackingStore,
    pub config_id: Uuid,
    pub concurrency: usize,
}

impl DirectRunner<'_> {
    /// One synchronous `productSet` per item. A rejected item is recorded as
    /// failed; the rest of the set still runs.
    pub async fn write(&self, items: &[WriteItem], location_id: Option<&str>) -> BatchOutcome {
        let calls: Vec<_> = items.iter().map(|item| self.write_one(item, location_id)).collect();
        let results = stream::iter(calls)
            .buffer_unordered(self.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;
        tally(results)
    }

    async fn write_one(&self, item: &WriteItem, location_id: Option<&str>) -> ItemResult {
        let sku = item.entity.sku.as_str();
        let input = item.product_set_input(location_id);
        let outcome = match self.client.product_set(&input).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    config_id = %self.config_id,
                    sku,
                    create = item.is_create(),
                    error = %e,
                    "productSet failed"
                );
                return ItemResult::Failed(format!("{sku}: {e}"));
            }
        };

        let variant_id = outcome
            .variant_id
            .as_deref()
            .or(item.identity.as_ref().map(|i| i.variant_id.as_str()));
        if let Err(e) = self
            .tracking
            .upsert(
                self.config_id,
                sku,
                &outcome.product_id,
                variant_id,
                &item.entity.record,
            )
            .await
        {
            tracing::warn!(
                config_id = %self.config_id,
                sku,
                error = %e,
                "failed to record tracking after write"
            );
        }
        ItemResult::Ok
    }

    /// Deletes tracked products that left the feed. A product that is
    /// already gone counts as deleted.
    pub async fn delete(&self, records: &[TrackingRecord]) -> BatchOutcome {
        let calls: Vec<_> = records.iter().map(|record| self.delete_one(record)).collect();
        let results = stream::iter(calls)
            .buffer_unordered(self.concurrency.max(1))
            .collect::<Vec<_>>()
            .await;
        tally(results)
    }

    async fn delete_one(&self, record: &TrackingRecord) -> ItemResult {
        let sku = record.sku.as_str();
        match self.client.delete_product(&record.remote_product_id).await {
            Ok(()) => {}
            Err(e) if is_already_gone(&e) => {
                tracing::info!(
                    config_id = %self.config_id,
                    sku,
                    product_id = %record.remote_product_id,
                    "product already deleted remotely"
                );
            }
            Err(e) => {
                tracing::warn!(
                    config_id = %self.config_id,
                    sku,
                    product_id = %record.remote_product_id,
                    error = %e,
                    "productDelete failed"
                );
                return ItemResult::Failed(format!("{sku}: {e}"));
            }
        }

        if let Err(e) = self.tracking.remove(self.config_id, sku).await {
            tracing::warn!(
                config_id = %self.config_id,
                sku,
                error = %e,
                "failed to drop tracking after delete"
            );
        }
        ItemResult::Ok
    }
}
