//! Create / update / delete partitioning.

use std::collections::HashSet;

use catsync_core::sku_key;
use serde_json::Value;

use crate::mapper::{MappedEntity, UpdateTarget};
use crate::resolver::{IdentityMap, RemoteIdentity};
use crate::store::TrackingRecord;

/// One `productSet` write: a create when `identity` is `None`, else an update.
#[derive(Debug, Clone)]
pub struct WriteItem {
    pub entity: MappedEntity,
    pub identity: Option<RemoteIdentity>,
}

impl WriteItem {
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.identity.is_none()
    }

    #[must_use]
    pub fn product_set_input(&self, location_id: Option<&str>) -> Value {
        let target = self.identity.as_ref().map(|i| UpdateTarget {
            product_id: &i.entity_id,
            variant_id: Some(i.variant_id.as_str()).filter(|v| !v.is_empty()),
        });
        self.entity.product_set_input(target, location_id)
    }
}

#[derive(Debug, Default)]
pub struct Plan {
    pub creates: Vec<WriteItem>,
    pub updates: Vec<WriteItem>,
    /// Tracked SKUs that disappeared from the feed.
    pub deletes: Vec<TrackingRecord>,
    /// Later occurrences of a SKU already seen in this feed.
    pub duplicates: usize,
}

impl Plan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Partitions mapped entities into operations.
///
/// Deletes are only planned when `include_deletes` is set; a truncated feed
/// would otherwise delete everything past the cut.
#[must_use]
pub fn categorize(
    entities: Vec<MappedEntity>,
    identities: &IdentityMap,
    tracking: &[TrackingRecord],
    include_deletes: bool,
) -> Plan {
    let mut plan = Plan::default();
    let mut feed_keys = HashSet::new();

    for entity in entities {
        let key = sku_key(&entity.sku);
        if !feed_keys.insert(key.clone()) {
            plan.duplicates += 1;
            continue;
        }
        let identity = identities.get(&key).cloned();
        let item = WriteItem { entity, identity };
        if item.is_create() {
            plan.creates.push(item);
        } else {
            plan.updates.push(item);
        }
    }

    if include_deletes {
        plan.deletes = tracking
            .iter()
            .filter(|t| !feed_keys.contains(&sku_key(&t.sku)))
            .cloned()
            .collect();
    }

    plan
}
