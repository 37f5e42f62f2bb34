//! GraphQL documents sent to the Admin API.

/// Variant search by SKU. `$query` is an OR-combined `sku:"..."` filter.
pub const VARIANTS_BY_SKU: &str = r"
query variantsBySku($first: Int!, $query: String!) {
  productVariants(first: $first, query: $query) {
    edges {
      node {
        id
        sku
        product { id title handle updatedAt }
      }
    }
  }
}";

/// Create-or-update a product with its single default variant.
pub const PRODUCT_SET: &str = r"
mutation productSet($input: ProductSetInput!, $synchronous: Boolean!) {
  productSet(input: $input, synchronous: $synchronous) {
    product {
      id
      variants(first: 1) { edges { node { id sku } } }
    }
    userErrors { field message }
  }
}";

/// Per-line mutation executed by a bulk job; each JSONL line supplies `$input`.
pub const BULK_PRODUCT_SET: &str = "mutation call($input: ProductSetInput!) { productSet(input: $input) { product { id variants(first: 1) { edges { node { id sku } } } } userErrors { field message } } }";

pub const PRODUCT_DELETE: &str = r"
mutation productDelete($input: ProductDeleteInput!) {
  productDelete(input: $input) {
    deletedProductId
    userErrors { field message }
  }
}";

/// One page of the full catalog with every variant SKU.
pub const CATALOG_PAGE: &str = r"
query catalogPage($first: Int!, $after: String) {
  products(first: $first, after: $after) {
    pageInfo { hasNextPage endCursor }
    edges {
      node {
        id
        title
        handle
        updatedAt
        variants(first: 100) { edges { node { id sku } } }
      }
    }
  }
}";

pub const SHOP_LOCATIONS: &str = r"
query shopLocations {
  locations(first: 10) {
    edges { node { id name isActive fulfillsOnlineOrders } }
  }
}";

pub const STAGED_UPLOADS_CREATE: &str = r"
mutation stagedUploadsCreate($input: [StagedUploadInput!]!) {
  stagedUploadsCreate(input: $input) {
    stagedTargets {
      url
      resourceUrl
      parameters { name value }
    }
    userErrors { field message }
  }
}";

pub const BULK_OPERATION_RUN_MUTATION: &str = r"
mutation bulkOperationRunMutation($mutation: String!, $stagedUploadPath: String!) {
  bulkOperationRunMutation(mutation: $mutation, stagedUploadPath: $stagedUploadPath) {
    bulkOperation { id status errorCode createdAt completedAt objectCount fileSize url partialDataUrl }
    userErrors { field message }
  }
}";

pub const BULK_OPERATION_STATUS: &str = r"
query bulkOperationStatus($id: ID!) {
  node(id: $id) {
    ... on BulkOperation {
      id status errorCode createdAt completedAt objectCount fileSize url partialDataUrl
    }
  }
}";
