//! Catalog reads and per-product mutations.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::{check_user_errors, ShopifyClient};
use crate::error::{ShopifyError, UserError};
use crate::pagination::Connection;
use crate::queries;
use crate::types::{CatalogProduct, Location, ProductSetOutcome, VariantMatch};

/// Largest page the Admin API serves.
pub const MAX_PAGE_SIZE: usize = 250;

/// Builds an OR-combined variant search filter: `sku:"A" OR sku:"B"`.
///
/// Quotes and backslashes inside a SKU are escaped so a hostile value cannot
/// break out of its term.
#[must_use]
pub fn sku_search_query(skus: &[String]) -> String {
    skus.iter()
        .map(|sku| {
            let escaped = sku.trim().replace('\\', "\\\\").replace('"', "\\\"");
            format!("sku:\"{escaped}\"")
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantsData {
    product_variants: Connection<VariantMatch>,
}

#[derive(Deserialize)]
struct IdNode {
    id: String,
}

#[derive(Deserialize)]
struct ProductWithVariants {
    id: String,
    variants: Connection<IdNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductSetPayload {
    product: Option<ProductWithVariants>,
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductSetData {
    product_set: ProductSetPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductDeletePayload {
    #[serde(default)]
    user_errors: Vec<UserError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductDeleteData {
    product_delete: ProductDeletePayload,
}

#[derive(Deserialize)]
struct CatalogData {
    products: Connection<CatalogProduct>,
}

#[derive(Deserialize)]
struct LocationsData {
    locations: Connection<Location>,
}

impl ShopifyClient {
    /// Searches variants whose SKU matches any of `skus`.
    ///
    /// The search index may be slightly behind recent writes; callers that
    /// need certainty follow up misses with a single-SKU lookup.
    ///
    /// # Errors
    ///
    /// Propagates any [`ShopifyError`] from the request.
    pub async fn find_variants_by_skus(
        &self,
        skus: &[String],
    ) -> Result<Vec<VariantMatch>, ShopifyError> {
        if skus.is_empty() {
            return Ok(Vec::new());
        }
        // A product can hold more than one variant per searched SKU.
        let first = (skus.len() * 2).clamp(1, MAX_PAGE_SIZE);
        let data: VariantsData = self
            .execute_as(
                queries::VARIANTS_BY_SKU,
                json!({ "first": first, "query": sku_search_query(skus) }),
                "productVariants search",
            )
            .await?;
        Ok(data.product_variants.into_nodes())
    }

    /// Creates or updates one product via `productSet` (synchronous mode).
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::UserErrors`] when the platform rejects the
    /// input, [`ShopifyError::MissingData`] when no product comes back, or any
    /// transport error from [`ShopifyClient::execute`].
    pub async fn product_set(&self, input: &Value) -> Result<ProductSetOutcome, ShopifyError> {
        let data: ProductSetData = self
            .execute_as(
                queries::PRODUCT_SET,
                json!({ "input": input, "synchronous": true }),
                "productSet",
            )
            .await?;
        check_user_errors(data.product_set.user_errors)?;
        let product = data
            .product_set
            .product
            .ok_or_else(|| ShopifyError::MissingData("productSet.product".to_owned()))?;
        let variant_id = product.variants.into_nodes().into_iter().next().map(|v| v.id);
        Ok(ProductSetOutcome {
            product_id: product.id,
            variant_id,
        })
    }

    /// Deletes a product and all of its variants.
    ///
    /// # Errors
    ///
    /// Returns [`ShopifyError::UserErrors`] if the platform refuses (including
    /// when the product no longer exists), or any transport error.
    pub async fn delete_product(&self, product_id: &str) -> Result<(), ShopifyError> {
        let data: ProductDeleteData = self
            .execute_as(
                queries::PRODUCT_DELETE,
                json!({ "input": { "id": product_id } }),
                "productDelete",
            )
            .await?;
        check_user_errors(data.product_delete.user_errors)
    }

    /// Fetches one page of the catalog, starting after `cursor`.
    ///
    /// # Errors
    ///
    /// Propagates any [`ShopifyError`] from the request.
    pub async fn catalog_page(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Connection<CatalogProduct>, ShopifyError> {
        let data: CatalogData = self
            .execute_as(
                queries::CATALOG_PAGE,
                json!({ "first": page_size.clamp(1, MAX_PAGE_SIZE), "after": cursor }),
                "products page",
            )
            .await?;
        Ok(data.products)
    }

    /// Lists the shop's inventory locations.
    ///
    /// # Errors
    ///
    /// Propagates any [`ShopifyError`] from the request.
    pub async fn list_locations(&self) -> Result<Vec<Location>, ShopifyError> {
        let data: LocationsData = self
            .execute_as(queries::SHOP_LOCATIONS, json!({}), "locations")
            .await?;
        Ok(data.locations.into_nodes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_query_joins_terms_with_or() {
        let q = sku_search_query(&["A-1".to_string(), " b-2 ".to_string()]);
        assert_eq!(q, r#"sku:"A-1" OR sku:"b-2""#);
    }

    #[test]
    fn sku_query_escapes_quotes_and_backslashes() {
        let q = sku_search_query(&[r#"X"Y\Z"#.to_string()]);
        assert_eq!(q, r#"sku:"X\"Y\\Z""#);
    }
}
