//! End-to-end runs of `SyncEngine` against a `wiremock` Admin API and an
//! in-memory store.
//!
//! All GraphQL documents share one endpoint, so each mock matches on the
//! operation name in the request body.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use catsync_core::{NewSyncConfiguration, SourceCredentials, SourceType, SyncLogStatus};
use catsync_engine::bulk::BulkSettings;
use catsync_engine::{
    ConfigStore, EngineSettings, FeedFetcher, MemoryStore, RunOptions, Stores, SyncEngine,
    SyncError, TrackingStore,
};
use catsync_shopify::{ClientOptions, ShopifyClient};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GRAPHQL_PATH: &str = "/admin/api/2024-10/graphql.json";

/// Serves a fixed document, or a fixed failure, for every fetch.
struct StaticFeed(Result<Value, String>);

#[async_trait]
impl FeedFetcher for StaticFeed {
    async fn fetch(
        &self,
        _source_type: SourceType,
        _credentials: &SourceCredentials,
    ) -> Result<Value, SyncError> {
        self.0.clone().map_err(SyncError::SourceFetch)
    }
}

struct Harness {
    server: MockServer,
    store: Arc<MemoryStore>,
    engine: SyncEngine,
    config_id: Uuid,
}

async fn harness(feed: Result<Value, String>) -> Harness {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let config: NewSyncConfiguration = serde_json::from_value(json!({
        "name": "Supplier A",
        "source_type": "file",
        "credentials": { "file_path": "/srv/feeds/supplier-a.json" },
        "field_mapping": { "title": "title", "variant.price": "price" },
    }))
    .expect("valid configuration");
    let config_id = ConfigStore::create(store.as_ref(), config)
        .await
        .expect("store configuration")
        .id;

    let client = ShopifyClient::new(
        &server.uri(),
        "shpat_test",
        &ClientOptions {
            timeout_secs: 5,
            user_agent: "catsync-test/0.1".to_string(),
            max_retries: 0,
            backoff_base_ms: 0,
            ..ClientOptions::default()
        },
    )
    .expect("failed to build test ShopifyClient");
    let settings = EngineSettings {
        bulk: BulkSettings {
            poll_interval: Duration::from_millis(1),
            max_poll_attempts: 5,
        },
        ..EngineSettings::default()
    };
    let engine = SyncEngine::new(
        Stores::shared(Arc::clone(&store)),
        Arc::new(StaticFeed(feed)),
        Arc::new(client),
        settings,
    );
    Harness {
        server,
        store,
        engine,
        config_id,
    }
}

async fn mock_graphql(server: &MockServer, fragment: &str, body: Value) {
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains(fragment))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mock_no_remote_matches(server: &MockServer) {
    mock_graphql(
        server,
        "variantsBySku",
        json!({ "data": { "productVariants": { "edges": [] } } }),
    )
    .await;
}

async fn mock_location(server: &MockServer) {
    mock_graphql(
        server,
        "shopLocations",
        json!({ "data": { "locations": { "edges": [{ "node": {
            "id": "gid://shopify/Location/1",
            "name": "Warehouse",
            "isActive": true,
            "fulfillsOnlineOrders": true
        } }] } } }),
    )
    .await;
}

async fn mock_empty_catalog(server: &MockServer) {
    mock_graphql(
        server,
        "catalogPage",
        json!({ "data": { "products": {
            "pageInfo": { "hasNextPage": false, "endCursor": null },
            "edges": []
        } } }),
    )
    .await;
}

fn product_set_response(product: u32, variant: u32) -> Value {
    json!({ "data": { "productSet": {
        "product": {
            "id": format!("gid://shopify/Product/{product}"),
            "variants": { "edges": [{ "node": {
                "id": format!("gid://shopify/ProductVariant/{variant}")
            } }] }
        },
        "userErrors": []
    } } })
}

/// Staged upload, upload target and bulk submission for one job.
async fn mock_bulk_submission(server: &MockServer) {
    mock_graphql(
        server,
        "stagedUploadsCreate",
        json!({ "data": { "stagedUploadsCreate": {
            "stagedTargets": [{
                "url": format!("{}/staged-upload", server.uri()),
                "resourceUrl": null,
                "parameters": [{ "name": "key", "value": "tmp/bulk/vars.jsonl" }]
            }],
            "userErrors": []
        } } }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/staged-upload"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(server)
        .await;
    mock_graphql(
        server,
        "bulkOperationRunMutation",
        json!({ "data": { "bulkOperationRunMutation": {
            "bulkOperation": { "id": "gid://shopify/BulkOperation/7", "status": "CREATED", "objectCount": "0" },
            "userErrors": []
        } } }),
    )
    .await;
}

fn bulk_status(status: &str, extra: Value) -> Value {
    let mut node = json!({ "id": "gid://shopify/BulkOperation/7", "status": status });
    if let (Some(node), Value::Object(extra)) = (node.as_object_mut(), extra) {
        node.extend(extra);
    }
    json!({ "data": { "node": node } })
}

// ---------------------------------------------------------------------------
// Test 1 – a new SKU is created directly and tracked
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_sku_is_created_and_tracked() {
    let h = harness(Ok(json!([{ "sku": "A", "title": "Widget", "price": "9.99" }]))).await;
    mock_no_remote_matches(&h.server).await;
    mock_location(&h.server).await;
    mock_empty_catalog(&h.server).await;
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("mutation productSet("))
        .and(body_string_contains("\"title\":\"Widget\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_set_response(100, 200)))
        .expect(1)
        .mount(&h.server)
        .await;

    let summary = h
        .engine
        .run_sync(h.config_id, RunOptions::default())
        .await
        .expect("run succeeds");

    assert_eq!(summary.created, 1);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.failed, 0);

    let tracked = TrackingStore::list_by_config(h.store.as_ref(), h.config_id)
        .await
        .unwrap();
    assert_eq!(tracked.len(), 1);
    assert_eq!(tracked[0].sku, "A");
    assert_eq!(tracked[0].remote_product_id, "gid://shopify/Product/100");
    assert_eq!(
        tracked[0].remote_variant_id.as_deref(),
        Some("gid://shopify/ProductVariant/200")
    );

    let logs = h.store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, SyncLogStatus::Completed);
    assert_eq!(logs[0].items_succeeded, 1);
    assert!(logs[0].end_time.is_some());
    assert_eq!(summary.sync_log_id, Some(logs[0].id));
}

// ---------------------------------------------------------------------------
// Test 2 – matched SKU is updated in place; a vanished SKU is deleted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn matched_sku_updates_and_missing_sku_deletes() {
    let h = harness(Ok(json!([{ "sku": "A", "title": "Widget v2" }]))).await;
    TrackingStore::upsert(
        h.store.as_ref(),
        h.config_id,
        "GONE",
        "gid://shopify/Product/9",
        Some("gid://shopify/ProductVariant/99"),
        &json!({}),
    )
    .await
    .unwrap();

    mock_graphql(
        &h.server,
        "variantsBySku",
        json!({ "data": { "productVariants": { "edges": [{ "node": {
            "id": "gid://shopify/ProductVariant/11",
            "sku": "a",
            "product": { "id": "gid://shopify/Product/1", "title": "Widget", "handle": "widget" }
        } }] } } }),
    )
    .await;
    mock_empty_catalog(&h.server).await;
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("mutation productSet("))
        .and(body_string_contains("\"id\":\"gid://shopify/Product/1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_set_response(1, 11)))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("productDelete"))
        .and(body_string_contains("gid://shopify/Product/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "productDelete": { "deletedProductId": "gid://shopify/Product/9", "userErrors": [] } }
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    // No creates, so the location is never needed.
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("shopLocations"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let summary = h
        .engine
        .run_sync(h.config_id, RunOptions::default())
        .await
        .expect("run succeeds");

    assert_eq!((summary.created, summary.updated, summary.deleted), (0, 1, 1));
    let tracked = TrackingStore::list_by_config(h.store.as_ref(), h.config_id)
        .await
        .unwrap();
    let skus: Vec<&str> = tracked.iter().map(|r| r.sku.as_str()).collect();
    assert_eq!(skus, vec!["A"]);
}

// ---------------------------------------------------------------------------
// Test 3 – limited runs never delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn limited_run_skips_deletes() {
    let h = harness(Ok(json!([
        { "sku": "A", "title": "Widget" },
        { "sku": "B", "title": "Gadget" }
    ])))
    .await;
    TrackingStore::upsert(
        h.store.as_ref(),
        h.config_id,
        "GONE",
        "gid://shopify/Product/9",
        None,
        &json!({}),
    )
    .await
    .unwrap();
    mock_no_remote_matches(&h.server).await;
    mock_location(&h.server).await;
    mock_empty_catalog(&h.server).await;
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("mutation productSet("))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_set_response(100, 200)))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("productDelete"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let options = RunOptions {
        limited: true,
        limit: 1,
        use_bulk: false,
    };
    let summary = h.engine.run_sync(h.config_id, options).await.expect("run succeeds");

    assert_eq!((summary.created, summary.deleted), (1, 0));
    let tracked = TrackingStore::list_by_config(h.store.as_ref(), h.config_id)
        .await
        .unwrap();
    assert_eq!(tracked.len(), 2, "GONE stays tracked");
}

// ---------------------------------------------------------------------------
// Test 4 – bulk job polls RUNNING → RUNNING → COMPLETED
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bulk_job_completes_after_polling() {
    let h = harness(Ok(json!([
        { "sku": "A", "title": "Widget" },
        { "sku": "B", "title": "Gadget" }
    ])))
    .await;
    mock_no_remote_matches(&h.server).await;
    mock_location(&h.server).await;
    mock_empty_catalog(&h.server).await;
    mock_bulk_submission(&h.server).await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("bulkOperationStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bulk_status("RUNNING", json!({}))))
        .up_to_n_times(2)
        .expect(2)
        .mount(&h.server)
        .await;
    mock_graphql(
        &h.server,
        "bulkOperationStatus",
        bulk_status(
            "COMPLETED",
            json!({ "objectCount": "2", "url": format!("{}/results.jsonl", h.server.uri()) }),
        ),
    )
    .await;

    let results = [
        json!({ "data": { "productSet": { "product": { "id": "gid://shopify/Product/1",
            "variants": { "edges": [{ "node": { "id": "gid://shopify/ProductVariant/11" } }] } },
            "userErrors": [] } }, "__lineNumber": 0 }),
        json!({ "data": { "productSet": { "product": { "id": "gid://shopify/Product/2",
            "variants": { "edges": [{ "node": { "id": "gid://shopify/ProductVariant/22" } }] } },
            "userErrors": [] } }, "__lineNumber": 1 }),
    ]
    .iter()
    .map(Value::to_string)
    .collect::<Vec<_>>()
    .join("\n");
    Mock::given(method("GET"))
        .and(path("/results.jsonl"))
        .respond_with(ResponseTemplate::new(200).set_body_string(results))
        .mount(&h.server)
        .await;

    let options = RunOptions {
        use_bulk: true,
        ..RunOptions::default()
    };
    let summary = h.engine.run_sync(h.config_id, options).await.expect("run succeeds");

    assert_eq!(summary.created, 2);
    assert_eq!(summary.failed, 0);
    let tracked = TrackingStore::list_by_config(h.store.as_ref(), h.config_id)
        .await
        .unwrap();
    let ids: Vec<&str> = tracked.iter().map(|r| r.remote_product_id.as_str()).collect();
    assert_eq!(ids, vec!["gid://shopify/Product/1", "gid://shopify/Product/2"]);
    assert_eq!(h.store.logs()[0].status, SyncLogStatus::Completed);
}

// ---------------------------------------------------------------------------
// Test 5 – a failed bulk job fails its whole batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_bulk_job_fails_every_item() {
    let h = harness(Ok(json!([
        { "sku": "A", "title": "Widget" },
        { "sku": "B", "title": "Gadget" }
    ])))
    .await;
    mock_no_remote_matches(&h.server).await;
    mock_location(&h.server).await;
    mock_empty_catalog(&h.server).await;
    mock_bulk_submission(&h.server).await;

    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("bulkOperationStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bulk_status("RUNNING", json!({}))))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;
    mock_graphql(
        &h.server,
        "bulkOperationStatus",
        bulk_status("FAILED", json!({ "errorCode": "INTERNAL_SERVER_ERROR" })),
    )
    .await;

    let options = RunOptions {
        use_bulk: true,
        ..RunOptions::default()
    };
    let summary = h.engine.run_sync(h.config_id, options).await.expect("run succeeds");

    assert_eq!(summary.created, 0);
    assert_eq!(summary.failed, 2);
    assert!(TrackingStore::list_by_config(h.store.as_ref(), h.config_id)
        .await
        .unwrap()
        .is_empty());
    let log = &h.store.logs()[0];
    assert_eq!(log.status, SyncLogStatus::CompletedWithErrors);
    assert!(log
        .message
        .as_deref()
        .is_some_and(|m| m.contains("INTERNAL_SERVER_ERROR")));
}

// ---------------------------------------------------------------------------
// Test 6 – unknown configuration opens no log
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_configuration_is_rejected_without_a_log() {
    let h = harness(Ok(json!([]))).await;

    let err = h
        .engine
        .run_sync(Uuid::new_v4(), RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Configuration(_)));
    assert!(h.store.logs().is_empty());
}

// ---------------------------------------------------------------------------
// Test 7 – feed failure marks the log failed and touches nothing remote
// ---------------------------------------------------------------------------

#[tokio::test]
async fn feed_failure_fails_the_log() {
    let h = harness(Err("connection refused".to_string())).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&h.server)
        .await;

    let err = h
        .engine
        .run_sync(h.config_id, RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::SourceFetch(_)));
    let logs = h.store.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, SyncLogStatus::Failed);
    assert!(logs[0].end_time.is_some());
    assert!(logs[0]
        .message
        .as_deref()
        .is_some_and(|m| m.contains("connection refused")));
}

// ---------------------------------------------------------------------------
// Test 8 – cleanup keeps the newest product per SKU
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cleanup_deletes_older_duplicates() {
    let h = harness(Ok(json!([]))).await;
    mock_graphql(
        &h.server,
        "catalogPage",
        json!({ "data": { "products": {
            "pageInfo": { "hasNextPage": false, "endCursor": null },
            "edges": [
                { "node": { "id": "gid://shopify/Product/1", "title": "Old", "updatedAt": "2026-01-01T00:00:00Z",
                    "variants": { "edges": [{ "node": { "id": "gid://shopify/ProductVariant/1", "sku": "DUP" } }] } } },
                { "node": { "id": "gid://shopify/Product/2", "title": "New", "updatedAt": "2026-02-01T00:00:00Z",
                    "variants": { "edges": [{ "node": { "id": "gid://shopify/ProductVariant/2", "sku": "dup" } }] } } }
            ]
        } } }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("productDelete"))
        .and(body_string_contains("gid://shopify/Product/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "productDelete": { "deletedProductId": "gid://shopify/Product/1", "userErrors": [] } }
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let summary = h.engine.cleanup_duplicates(None).await.expect("cleanup succeeds");

    assert_eq!(summary.total_scanned, 2);
    assert_eq!(summary.duplicate_groups, 1);
    assert_eq!(summary.deleted, 1);
    assert_eq!(summary.errors, 0);
}

fn bulk_results(product_ids: &[u32]) -> String {
    product_ids
        .iter()
        .enumerate()
        .map(|(line, id)| {
            json!({ "data": { "productSet": { "product": { "id": format!("gid://shopify/Product/{id}"),
                "variants": { "edges": [{ "node": { "id": format!("gid://shopify/ProductVariant/{id}0") } }] } },
                "userErrors": [] } }, "__lineNumber": line })
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bulk_options() -> RunOptions {
    RunOptions {
        use_bulk: true,
        ..RunOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Test 9 – a zero objectCount falls back to counting result lines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_object_count_counts_result_lines() {
    let h = harness(Ok(json!([
        { "sku": "A", "title": "Widget" },
        { "sku": "B", "title": "Gadget" }
    ])))
    .await;
    mock_no_remote_matches(&h.server).await;
    mock_location(&h.server).await;
    mock_empty_catalog(&h.server).await;
    mock_bulk_submission(&h.server).await;
    mock_graphql(
        &h.server,
        "bulkOperationStatus",
        bulk_status(
            "COMPLETED",
            json!({ "objectCount": "0", "url": format!("{}/results.jsonl", h.server.uri()) }),
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/results.jsonl"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bulk_results(&[5, 6])))
        .expect(1)
        .mount(&h.server)
        .await;

    let summary = h.engine.run_sync(h.config_id, bulk_options()).await.expect("run succeeds");

    assert_eq!((summary.created, summary.failed), (2, 0));
    let tracked = TrackingStore::list_by_config(h.store.as_ref(), h.config_id)
        .await
        .unwrap();
    let ids: Vec<&str> = tracked.iter().map(|r| r.remote_product_id.as_str()).collect();
    assert_eq!(ids, vec!["gid://shopify/Product/5", "gid://shopify/Product/6"]);
    let log = &h.store.logs()[0];
    assert_eq!(log.status, SyncLogStatus::Completed);
    assert_eq!(log.items_succeeded, 2);
}

// ---------------------------------------------------------------------------
// Test 10 – a job that never finishes times out its batch; the run goes on
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_ceiling_fails_the_batch_and_releases_the_bulk_lock() {
    let h = harness(Ok(json!([
        { "sku": "A", "title": "Widget" },
        { "sku": "B", "title": "Gadget" }
    ])))
    .await;
    mock_no_remote_matches(&h.server).await;
    mock_location(&h.server).await;
    mock_graphql(
        &h.server,
        "stagedUploadsCreate",
        json!({ "data": { "stagedUploadsCreate": {
            "stagedTargets": [{
                "url": format!("{}/staged-upload", h.server.uri()),
                "resourceUrl": null,
                "parameters": [{ "name": "key", "value": "tmp/bulk/vars.jsonl" }]
            }],
            "userErrors": []
        } } }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/staged-upload"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&h.server)
        .await;
    mock_graphql(
        &h.server,
        "bulkOperationRunMutation",
        json!({ "data": { "bulkOperationRunMutation": {
            "bulkOperation": { "id": "gid://shopify/BulkOperation/7", "status": "CREATED", "objectCount": "0" },
            "userErrors": []
        } } }),
    )
    .await;
    // The harness allows five polls per job.
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("bulkOperationStatus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(bulk_status("RUNNING", json!({}))))
        .expect(10)
        .mount(&h.server)
        .await;
    // Cleanup still runs after the timed-out batch.
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("catalogPage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "products": {
            "pageInfo": { "hasNextPage": false, "endCursor": null },
            "edges": []
        } } })))
        .expect(2)
        .mount(&h.server)
        .await;

    let summary = h.engine.run_sync(h.config_id, bulk_options()).await.expect("run succeeds");

    assert_eq!((summary.created, summary.failed), (0, 2));
    assert!(TrackingStore::list_by_config(h.store.as_ref(), h.config_id)
        .await
        .unwrap()
        .is_empty());
    let log = &h.store.logs()[0];
    assert_eq!(log.status, SyncLogStatus::CompletedWithErrors);
    assert!(log
        .message
        .as_deref()
        .is_some_and(|m| m.contains("still RUNNING after 5 polls")));

    // A second run can take the bulk lock again.
    let again = tokio::time::timeout(
        Duration::from_secs(10),
        h.engine.run_sync(h.config_id, bulk_options()),
    )
    .await
    .expect("bulk lock was released")
    .expect("run succeeds");
    assert_eq!(again.failed, 2);
}

// ---------------------------------------------------------------------------
// Test 11 – submission user errors abort only their own batch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejected_bulk_submission_fails_only_that_batch() {
    let h = harness(Ok(json!([
        { "sku": "A", "title": "Widget" },
        { "sku": "B", "title": "Gadget" },
        { "sku": "C", "title": "Gizmo v2" }
    ])))
    .await;
    mock_graphql(
        &h.server,
        "variantsBySku",
        json!({ "data": { "productVariants": { "edges": [{ "node": {
            "id": "gid://shopify/ProductVariant/31",
            "sku": "C",
            "product": { "id": "gid://shopify/Product/3", "title": "Gizmo", "handle": "gizmo" }
        } }] } } }),
    )
    .await;
    mock_location(&h.server).await;
    mock_empty_catalog(&h.server).await;
    mock_graphql(
        &h.server,
        "stagedUploadsCreate",
        json!({ "data": { "stagedUploadsCreate": {
            "stagedTargets": [{
                "url": format!("{}/staged-upload", h.server.uri()),
                "resourceUrl": null,
                "parameters": [{ "name": "key", "value": "tmp/bulk/vars.jsonl" }]
            }],
            "userErrors": []
        } } }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/staged-upload"))
        .respond_with(ResponseTemplate::new(201))
        .expect(2)
        .mount(&h.server)
        .await;
    // The create batch is refused at submission; the update batch goes through.
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("bulkOperationRunMutation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {
            "bulkOperationRunMutation": {
                "bulkOperation": null,
                "userErrors": [{ "field": null, "message": "A bulk mutation is already in progress" }]
            }
        } })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&h.server)
        .await;
    mock_graphql(
        &h.server,
        "bulkOperationRunMutation",
        json!({ "data": { "bulkOperationRunMutation": {
            "bulkOperation": { "id": "gid://shopify/BulkOperation/8", "status": "CREATED", "objectCount": "0" },
            "userErrors": []
        } } }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(GRAPHQL_PATH))
        .and(body_string_contains("bulkOperationStatus"))
        .and(body_string_contains("gid://shopify/BulkOperation/8"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "node": {
            "id": "gid://shopify/BulkOperation/8",
            "status": "COMPLETED",
            "objectCount": "1"
        } } })))
        .mount(&h.server)
        .await;

    let summary = h.engine.run_sync(h.config_id, bulk_options()).await.expect("run succeeds");

    assert_eq!((summary.created, summary.updated, summary.failed), (0, 1, 2));
    let tracked = TrackingStore::list_by_config(h.store.as_ref(), h.config_id)
        .await
        .unwrap();
    let skus: Vec<&str> = tracked.iter().map(|r| r.sku.as_str()).collect();
    assert_eq!(skus, vec!["C"]);
    let log = &h.store.logs()[0];
    assert_eq!(log.status, SyncLogStatus::CompletedWithErrors);
    assert!(log
        .message
        .as_deref()
        .is_some_and(|m| m.contains("already in progress")));
}

// ---------------------------------------------------------------------------
// The run future must be spawnable on a multi-threaded runtime.
// ---------------------------------------------------------------------------

fn assert_send<T: Send>(_: T) {}

#[tokio::test]
async fn run_futures_are_send() {
    let h = harness(Ok(json!([]))).await;
    assert_send(h.engine.run_sync(h.config_id, RunOptions::default()));
    assert_send(h.engine.cleanup_duplicates(None));
}
