//! Response shapes for the Admin API documents in [`crate::queries`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::pagination::Connection;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A variant returned by a SKU search, with its owning product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VariantMatch {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
    pub product: ProductRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogVariant {
    pub id: String,
    #[serde(default)]
    pub sku: Option<String>,
}

/// A product from a full catalog scan.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub variants: Connection<CatalogVariant>,
}

impl CatalogProduct {
    /// Non-blank variant SKUs in response order.
    pub fn skus(&self) -> impl Iterator<Item = &str> {
        self.variants
            .edges
            .iter()
            .filter_map(|e| e.node.sku.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub fulfills_online_orders: bool,
}

/// Remote identity returned by a successful `productSet`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSetOutcome {
    pub product_id: String,
    pub variant_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Bulk operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StagedParameter {
    pub name: String,
    pub value: String,
}

/// A writable upload slot returned by `stagedUploadsCreate`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedTarget {
    pub url: String,
    #[serde(default)]
    pub resource_url: Option<String>,
    #[serde(default)]
    pub parameters: Vec<StagedParameter>,
}

impl StagedTarget {
    /// The `stagedUploadPath` a bulk mutation references: the value of the `key` form parameter.
    #[must_use]
    pub fn staged_upload_path(&self) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == "key")
            .map(|p| p.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkOperationStatus {
    Created,
    Running,
    Completed,
    Canceling,
    Canceled,
    Failed,
    Expired,
    #[serde(other)]
    Unknown,
}

impl BulkOperationStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BulkOperationStatus::Completed
                | BulkOperationStatus::Canceled
                | BulkOperationStatus::Failed
                | BulkOperationStatus::Expired
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOperation {
    pub id: String,
    pub status: BulkOperationStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default, deserialize_with = "deserialize_count")]
    pub object_count: u64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub partial_data_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// `objectCount` is an `UnsignedInt64` scalar, which the API serializes as a string.
fn deserialize_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
        Null(Option<()>),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) if s.trim().is_empty() => Ok(0),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        Raw::Null(_) => Ok(0),
    }
}
