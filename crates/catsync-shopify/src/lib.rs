//! GraphQL Admin API client for the catalog platform.
//!
//! One request primitive ([`ShopifyClient::execute`]) plus typed helpers for
//! the handful of queries and mutations the sync engine issues: SKU lookup,
//! `productSet`, `productDelete`, catalog paging, locations, and the staged
//! upload / bulk mutation lifecycle.

pub mod bulk;
pub mod catalog;
pub mod client;
pub mod error;
pub mod pagination;
pub mod queries;
mod retry;
pub mod types;

pub use bulk::BULK_UPLOAD_FILENAME;
pub use catalog::{sku_search_query, MAX_PAGE_SIZE};
pub use client::{ClientOptions, ShopifyClient};
pub use error::{ShopifyError, UserError};
pub use pagination::{Connection, PageInfo};
pub use types::{
    BulkOperation, BulkOperationStatus, CatalogProduct, CatalogVariant, Location,
    ProductRef, ProductSetOutcome, StagedParameter, StagedTarget, VariantMatch,
};
