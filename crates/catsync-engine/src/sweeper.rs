//! Duplicate cleanup: keep the most recently updated product per SKU.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use catsync_core::sku_key;
use catsync_shopify::{CatalogProduct, ShopifyClient, ShopifyError, MAX_PAGE_SIZE};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use crate::direct::is_already_gone;

/// Safety stop for catalog paging.
const MAX_CATALOG_PAGES: usize = 1000;
const DELETE_BATCH_SIZE: usize = 5;
const DELETE_BATCH_PAUSE: Duration = Duration::from_millis(100);

/// One product seen carrying one SKU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub sku_key: String,
    pub product_id: String,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSummary {
    pub total_scanned: usize,
    pub duplicate_groups: usize,
    pub deleted: usize,
    pub errors: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct DuplicatePlan {
    pub duplicate_groups: usize,
    /// Product ids to delete, each listed once.
    pub deletions: Vec<String>,
    /// SKUs whose owners carry no `updatedAt`; the keeper falls back to id order.
    pub undated_groups: Vec<String>,
}

/// Observations for every distinct SKU on each product.
#[must_use]
pub fn observe(products: &[CatalogProduct]) -> Vec<Observation> {
    let mut out = Vec::new();
    for product in products {
        let mut seen = HashSet::new();
        for sku in product.skus() {
            let key = sku_key(sku);
            if seen.insert(key.clone()) {
                out.push(Observation {
                    sku_key: key,
                    product_id: product.id.clone(),
                    updated_at: product.updated_at,
                });
            }
        }
    }
    out
}

/// Numeric tail of a global id, so `.../Product/10` sorts after `.../Product/9`.
fn id_number(id: &str) -> Option<u64> {
    id.rsplit('/').next().and_then(|tail| tail.parse().ok())
}

/// Newest first; unknown timestamps last; ties by id descending.
fn keeper_order(a: &Observation, b: &Observation) -> Ordering {
    match (a.updated_at, b.updated_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| id_number(&b.product_id).cmp(&id_number(&a.product_id)))
    .then_with(|| b.product_id.cmp(&a.product_id))
}

/// Groups observations by SKU and picks every product to delete.
///
/// Every loser of every group is queued, including a product that keeps some
/// other group. Such a SKU is left with no owner and is recreated by the next
/// sync, so no SKU ever keeps more than one product.
#[must_use]
pub fn plan_duplicate_deletions(observations: &[Observation]) -> DuplicatePlan {
    let mut groups: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
    for obs in observations {
        let group = groups.entry(obs.sku_key.as_str()).or_default();
        if !group.iter().any(|o| o.product_id == obs.product_id) {
            group.push(obs);
        }
    }

    let mut plan = DuplicatePlan::default();
    let mut queued = HashSet::new();
    for (sku, group) in groups.iter_mut().filter(|(_, g)| g.len() > 1) {
        plan.duplicate_groups += 1;
        group.sort_by(|a, b| keeper_order(a, b));
        if group[0].updated_at.is_none() {
            plan.undated_groups.push((*sku).to_owned());
        }
        for loser in &group[1..] {
            if queued.insert(loser.product_id.as_str()) {
                plan.deletions.push(loser.product_id.clone());
            }
        }
    }
    plan
}

pub struct Sweeper<'a> {
    pub client: &'a ShopifyClient,
}

impl Sweeper<'_> {
    /// Scans the whole catalog and deletes duplicate products.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError`] if the catalog scan fails; nothing is deleted
    /// in that case. Individual delete failures are counted in `errors`.
    pub async fn sweep(&self) -> Result<CleanupSummary, ShopifyError> {
        let products = self.scan().await?;
        let plan = plan_duplicate_deletions(&observe(&products));
        let mut summary = CleanupSummary {
            total_scanned: products.len(),
            duplicate_groups: plan.duplicate_groups,
            ..CleanupSummary::default()
        };
        tracing::info!(
            total_scanned = summary.total_scanned,
            duplicate_groups = summary.duplicate_groups,
            queued = plan.deletions.len(),
            "duplicate scan finished"
        );
        for sku in &plan.undated_groups {
            tracing::warn!(sku = %sku, "duplicate group has no updatedAt; keeping the highest product id");
        }

        let batches: Vec<&[String]> = plan.deletions.chunks(DELETE_BATCH_SIZE).collect();
        for (i, batch) in batches.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(DELETE_BATCH_PAUSE).await;
            }
            let results = join_all(batch.iter().map(|id| self.client.delete_product(id))).await;
            for (id, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => summary.deleted += 1,
                    Err(e) if is_already_gone(&e) => summary.deleted += 1,
                    Err(e) => {
                        tracing::warn!(product_id = %id, error = %e, "duplicate delete failed");
                        summary.errors += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    async fn scan(&self) -> Result<Vec<CatalogProduct>, ShopifyError> {
        let mut products = Vec::new();
        let mut cursor: Option<String> = None;
        for page in 1..=MAX_CATALOG_PAGES {
            let connection = self
                .client
                .catalog_page(cursor.as_deref(), MAX_PAGE_SIZE)
                .await?;
            let next = connection.page_info.next_cursor().map(str::to_owned);
            products.extend(connection.into_nodes());
            match next {
                Some(c) => cursor = Some(c),
                None => return Ok(products),
            }
            if page == MAX_CATALOG_PAGES {
                tracing::warn!(pages = page, "catalog scan hit the page limit");
            }
        }
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn obs(sku: &str, id: &str, hour: Option<u32>) -> Observation {
        Observation {
            sku_key: sku_key(sku),
            product_id: id.to_string(),
            updated_at: hour.map(|h| Utc.with_ymd_and_hms(2026, 1, 1, h, 0, 0).unwrap()),
        }
    }

    #[test]
    fn keeps_newest_regardless_of_input_order() {
        let a = obs("X", "gid://shopify/Product/1", Some(1));
        let b = obs("X", "gid://shopify/Product/2", Some(2));
        let c = obs("x", "gid://shopify/Product/3", Some(3));
        for input in [
            vec![a.clone(), b.clone(), c.clone()],
            vec![c.clone(), a.clone(), b.clone()],
            vec![b.clone(), c.clone(), a.clone()],
        ] {
            let mut plan = plan_duplicate_deletions(&input);
            plan.deletions.sort();
            assert_eq!(plan.duplicate_groups, 1);
            assert_eq!(
                plan.deletions,
                vec!["gid://shopify/Product/1".to_string(), "gid://shopify/Product/2".to_string()]
            );
        }
    }

    #[test]
    fn ties_break_on_numeric_id_and_missing_timestamps_lose() {
        let plan = plan_duplicate_deletions(&[
            obs("A", "gid://shopify/Product/9", Some(5)),
            obs("A", "gid://shopify/Product/10", Some(5)),
            obs("A", "gid://shopify/Product/11", None),
        ]);
        let mut deletions = plan.deletions;
        deletions.sort();
        assert_eq!(
            deletions,
            vec!["gid://shopify/Product/11".to_string(), "gid://shopify/Product/9".to_string()]
        );
    }

    #[test]
    fn every_loser_is_queued_so_no_sku_keeps_two_owners() {
        // P2 loses group A but keeps group B.
        let observations = [
            obs("A", "gid://shopify/Product/1", Some(9)),
            obs("A", "gid://shopify/Product/2", Some(5)),
            obs("B", "gid://shopify/Product/2", Some(5)),
            obs("B", "gid://shopify/Product/3", Some(1)),
        ];
        let plan = plan_duplicate_deletions(&observations);
        assert_eq!(plan.duplicate_groups, 2);
        assert_eq!(
            plan.deletions,
            vec!["gid://shopify/Product/2".to_string(), "gid://shopify/Product/3".to_string()]
        );

        for sku in ["a", "b"] {
            let owners: HashSet<&str> = observations
                .iter()
                .filter(|o| o.sku_key == sku && !plan.deletions.contains(&o.product_id))
                .map(|o| o.product_id.as_str())
                .collect();
            assert!(owners.len() <= 1, "SKU {sku} still has duplicates: {owners:?}");
        }
        assert!(observations
            .iter()
            .any(|o| o.sku_key == "a" && !plan.deletions.contains(&o.product_id)));
    }

    #[test]
    fn undated_groups_are_reported() {
        let plan = plan_duplicate_deletions(&[
            obs("A", "gid://shopify/Product/1", None),
            obs("A", "gid://shopify/Product/2", None),
            obs("B", "gid://shopify/Product/3", Some(1)),
            obs("B", "gid://shopify/Product/4", None),
        ]);
        assert_eq!(plan.undated_groups, vec!["a".to_string()]);
        assert_eq!(
            plan.deletions,
            vec!["gid://shopify/Product/1".to_string(), "gid://shopify/Product/4".to_string()]
        );
    }

    #[test]
    fn same_product_listed_twice_is_not_a_duplicate() {
        let plan = plan_duplicate_deletions(&[
            obs("A", "gid://shopify/Product/1", Some(1)),
            obs("A", "gid://shopify/Product/1", Some(1)),
        ]);
        assert_eq!(plan, DuplicatePlan::default());
    }
}
