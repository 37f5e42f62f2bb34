//! SKU → remote identity resolution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use catsync_core::sku_key;
use catsync_shopify::{Location, ShopifyClient, ShopifyError, VariantMatch};
use futures::stream::{self, StreamExt};
use tokio::sync::OnceCell;

/// SKUs per OR-combined search.
pub const RESOLVE_BATCH_SIZE: usize = 25;
const FALLBACK_CONCURRENCY: usize = 4;

/// Where a SKU currently lives on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteIdentity {
    pub entity_id: String,
    pub variant_id: String,
    pub title: String,
}

impl From<&VariantMatch> for RemoteIdentity {
    fn from(m: &VariantMatch) -> Self {
        Self {
            entity_id: m.product.id.clone(),
            variant_id: m.id.clone(),
            title: m.product.title.clone(),
        }
    }
}

/// Normalized SKU key → identity.
pub type IdentityMap = HashMap<String, RemoteIdentity>;

/// Resolves SKUs against the live catalog and memoizes the shop's default
/// inventory location for the life of the process.
pub struct CatalogResolver {
    client: Arc<ShopifyClient>,
    batch_size: usize,
    default_location: OnceCell<String>,
}

impl CatalogResolver {
    #[must_use]
    pub fn new(client: Arc<ShopifyClient>) -> Self {
        Self {
            client,
            batch_size: RESOLVE_BATCH_SIZE,
            default_location: OnceCell::new(),
        }
    }

    /// Looks up every SKU in `skus`. Keys missing from the result are absent
    /// on the platform, or could not be looked up (logged).
    pub async fn resolve(&self, skus: &[String]) -> IdentityMap {
        let mut seen = HashSet::new();
        let unique: Vec<String> = skus
            .iter()
            .filter(|s| seen.insert(sku_key(s)))
            .cloned()
            .collect();

        let mut found = IdentityMap::new();
        for batch in unique.chunks(self.batch_size) {
            match self.client.find_variants_by_skus(batch).await {
                Ok(matches) => merge_matches(&mut found, batch, &matches),
                Err(e) => {
                    tracing::warn!(
                        batch_len = batch.len(),
                        error = %e,
                        "SKU batch search failed; falling back to single lookups"
                    );
                }
            }

            let misses: Vec<&String> = batch
                .iter()
                .filter(|s| !found.contains_key(&sku_key(s)))
                .collect();
            if misses.is_empty() {
                continue;
            }
            let lookups: Vec<_> = misses
                .into_iter()
                .map(|sku| async move { (sku_key(sku), self.lookup_one(sku).await) })
                .collect();
            let fallbacks: Vec<(String, Option<RemoteIdentity>)> = stream::iter(lookups)
                .buffer_unordered(FALLBACK_CONCURRENCY)
                .collect()
                .await;
            for (key, identity) in fallbacks {
                if let Some(identity) = identity {
                    found.entry(key).or_insert(identity);
                }
            }
        }

        tracing::debug!(
            requested = unique.len(),
            resolved = found.len(),
            "resolved SKUs against catalog"
        );
        found
    }

    /// Single-SKU lookup. Failures are logged and treated as "not found".
    async fn lookup_one(&self, sku: &str) -> Option<RemoteIdentity> {
        let wanted = [sku.to_owned()];
        match self.client.find_variants_by_skus(&wanted).await {
            Ok(matches) => {
                let key = sku_key(sku);
                matches
                    .iter()
                    .find(|m| m.sku.as_deref().is_some_and(|s| sku_key(s) == key))
                    .map(RemoteIdentity::from)
            }
            Err(e) => {
                tracing::warn!(sku, error = %e, "single SKU lookup failed");
                None
            }
        }
    }

    /// Id of the location new products stock into: the first active location
    /// that fulfills online orders, else the first location listed.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::MissingData`] if the shop has no locations, or
    /// any error from the request. Failures are not cached.
    pub async fn default_location(&self) -> Result<&str, ShopifyError> {
        self.default_location
            .get_or_try_init(|| async {
                let locations = self.client.list_locations().await?;
                pick_default_location(&locations)
                    .map(|l| l.id.clone())
                    .ok_or_else(|| ShopifyError::MissingData("locations".to_owned()))
            })
            .await
            .map(String::as_str)
    }
}

/// Adds matches whose SKU was actually requested; search can return near hits.
fn merge_matches(found: &mut IdentityMap, requested: &[String], matches: &[VariantMatch]) {
    let wanted: HashSet<String> = requested.iter().map(|s| sku_key(s)).collect();
    for m in matches {
        let Some(key) = m.sku.as_deref().map(sku_key) else {
            continue;
        };
        if wanted.contains(&key) {
            found.entry(key).or_insert_with(|| RemoteIdentity::from(m));
        }
    }
}

fn pick_default_location(locations: &[Location]) -> Option<&Location> {
    locations
        .iter()
        .find(|l| l.is_active && l.fulfills_online_orders)
        .or_else(|| locations.first())
}
