//! Offline unit tests for catsync-db pool configuration and row types.
//! These tests do not require a live database connection.

use catsync_core::{AppConfig, Environment, SyncLogStatus};
use catsync_db::{PoolConfig, SyncLogRow, TrackedProductRow};
use std::path::PathBuf;

#[test]
fn pool_config_from_app_config_uses_core_values() {
    let app_config = AppConfig {
        database_url: "postgres://example".to_string(),
        env: Environment::Test,
        log_level: "info".to_string(),
        configs_path: PathBuf::from("./config/sync_configs.yaml"),
        shopify_shop_domain: None,
        shopify_access_token: None,
        shopify_api_version: "2024-10".to_string(),
        user_agent: "ua".to_string(),
        db_max_connections: 42,
        db_min_connections: 7,
        db_acquire_timeout_secs: 9,
        api_request_timeout_secs: 30,
        api_max_concurrency: 5,
        api_max_retries: 3,
        api_retry_backoff_base_ms: 1000,
        direct_concurrency: 2,
        feed_max_concurrency: 2,
        feed_request_timeout_secs: 120,
        bulk_threshold: 10,
        bulk_poll_interval_secs: 5,
        bulk_max_poll_attempts: 120,
        schedule_cron: "0 0 * * * *".to_string(),
        shutdown_grace_secs: 60,
    };

    let pool_config = PoolConfig::from_app_config(&app_config);
    assert_eq!(pool_config.max_connections, 42);
    assert_eq!(pool_config.min_connections, 7);
    assert_eq!(pool_config.acquire_timeout_secs, 9);
}

/// Compile-time smoke test: confirm that [`SyncLogRow`] has all expected
/// fields with the correct types. No database required.
#[test]
fn sync_log_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = SyncLogRow {
        id: Uuid::new_v4(),
        config_id: Uuid::new_v4(),
        start_time: Utc::now(),
        end_time: None,
        status: "completed_with_errors".to_string(),
        message: Some("Sync completed.".to_string()),
        items_processed: 10_i32,
        items_succeeded: 8_i32,
        items_failed: 2_i32,
    };

    assert_eq!(row.status(), Some(SyncLogStatus::CompletedWithErrors));
    assert!(row.end_time.is_none());
    assert_eq!(row.items_processed, row.items_succeeded + row.items_failed);
}

#[test]
fn sync_log_row_with_unknown_status_parses_to_none() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = SyncLogRow {
        id: Uuid::new_v4(),
        config_id: Uuid::new_v4(),
        start_time: Utc::now(),
        end_time: Some(Utc::now()),
        status: "exploded".to_string(),
        message: None,
        items_processed: 0,
        items_succeeded: 0,
        items_failed: 0,
    };

    assert_eq!(row.status(), None);
}

#[test]
fn tracked_product_row_has_expected_fields() {
    use chrono::Utc;
    use uuid::Uuid;

    let row = TrackedProductRow {
        id: 1_i64,
        config_id: Uuid::new_v4(),
        sku: "ABC-1".to_string(),
        sku_key: "abc-1".to_string(),
        remote_product_id: "gid://shopify/Product/1".to_string(),
        remote_variant_id: Some("gid://shopify/ProductVariant/11".to_string()),
        last_payload: serde_json::json!({ "title": "Widget" }),
        last_synced_at: Utc::now(),
        created_at: Utc::now(),
    };

    assert_eq!(row.sku_key, catsync_core::sku_key(&row.sku));
    assert!(row.remote_variant_id.is_some());
}
