//! Live integration tests for catsync-db using `#[sqlx::test]`.
//!
//! Each test gets a fresh, fully-migrated Postgres database spun up by the
//! sqlx test harness. The `migrations` path is relative to the crate root
//! (`crates/catsync-db/`), so `"../../migrations"` resolves to the workspace
//! migration directory.
//!
//! Ignored by default; run with `--ignored` against a disposable server.

use catsync_core::{
    FieldMapping, MappingEntry, NewSyncConfiguration, SourceCredentials, SourceType,
    SyncLogStatus, SyncLogUpdate, TargetField,
};
use catsync_db::{
    create_sync_log, delete_sync_config, delete_tracked_product, get_last_failed_sync,
    get_last_successful_sync, get_sync_config, get_sync_log, insert_sync_config,
    list_active_sync_configs, list_sync_logs, list_tracked_products, seed_sync_configs,
    update_sync_config, update_sync_log, upsert_tracked_product, DbError,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_new_config(name: &str, is_active: bool) -> NewSyncConfiguration {
    NewSyncConfiguration {
        name: name.to_string(),
        source_type: SourceType::Ftp,
        credentials: SourceCredentials {
            host: "ftp.example.test".to_string(),
            port: Some(21),
            user: Some("feed".to_string()),
            password: Some("secret".to_string()),
            file_path: "/exports/products.json".to_string(),
            data_path: Some("data.products".to_string()),
        },
        field_mapping: FieldMapping::new(vec![
            MappingEntry {
                target: TargetField::Title,
                source: "Name".to_string(),
            },
            MappingEntry {
                target: TargetField::Sku,
                source: "Code".to_string(),
            },
        ]),
        custom_attributes: vec![],
        sync_frequency_hours: 24,
        is_active,
    }
}

// ---------------------------------------------------------------------------
// sync_configurations
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn insert_then_get_round_trips_configuration(pool: sqlx::PgPool) {
    let row = insert_sync_config(&pool, &make_new_config("acme", true))
        .await
        .expect("insert failed");

    let fetched = get_sync_config(&pool, row.id)
        .await
        .expect("get failed")
        .expect("row missing");
    let config = fetched.to_configuration().expect("decode failed");

    assert_eq!(config.name, "acme");
    assert_eq!(config.credentials.password.as_deref(), Some("secret"));
    assert_eq!(config.field_mapping.source_for(TargetField::Sku), Some("Code"));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn list_active_skips_inactive_configs(pool: sqlx::PgPool) {
    insert_sync_config(&pool, &make_new_config("on", true))
        .await
        .expect("insert failed");
    insert_sync_config(&pool, &make_new_config("off", false))
        .await
        .expect("insert failed");

    let active = list_active_sync_configs(&pool).await.expect("list failed");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "on");
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn update_missing_config_is_not_found(pool: sqlx::PgPool) {
    let config = make_new_config("ghost", true).into_configuration(uuid::Uuid::new_v4());
    let err = update_sync_config(&pool, &config).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn seed_is_idempotent_and_keeps_ids(pool: sqlx::PgPool) {
    let configs = vec![make_new_config("acme", true)];
    assert_eq!(seed_sync_configs(&pool, &configs).await.unwrap(), 1);
    let first = list_active_sync_configs(&pool).await.unwrap();

    let mut changed = configs.clone();
    changed[0].sync_frequency_hours = 6;
    assert_eq!(seed_sync_configs(&pool, &changed).await.unwrap(), 1);
    let second = list_active_sync_configs(&pool).await.unwrap();

    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(second[0].sync_frequency_hours, 6);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn deleting_config_cascades_to_tracking(pool: sqlx::PgPool) {
    let row = insert_sync_config(&pool, &make_new_config("acme", true))
        .await
        .unwrap();
    upsert_tracked_product(
        &pool,
        row.id,
        "SKU-1",
        "gid://shopify/Product/1",
        None,
        &serde_json::json!({}),
    )
    .await
    .unwrap();

    assert!(delete_sync_config(&pool, row.id).await.unwrap());
    assert!(list_tracked_products(&pool, row.id).await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// tracked_products
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn tracking_upsert_matches_on_normalized_sku(pool: sqlx::PgPool) {
    let config = insert_sync_config(&pool, &make_new_config("acme", true))
        .await
        .unwrap();

    upsert_tracked_product(
        &pool,
        config.id,
        "abc-1",
        "gid://shopify/Product/1",
        Some("gid://shopify/ProductVariant/11"),
        &serde_json::json!({ "title": "Old" }),
    )
    .await
    .unwrap();
    let updated = upsert_tracked_product(
        &pool,
        config.id,
        " ABC-1 ",
        "gid://shopify/Product/1",
        None,
        &serde_json::json!({ "title": "New" }),
    )
    .await
    .unwrap();

    let rows = list_tracked_products(&pool, config.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(updated.sku, " ABC-1 ");
    assert_eq!(
        updated.remote_variant_id.as_deref(),
        Some("gid://shopify/ProductVariant/11")
    );
    assert_eq!(updated.last_payload["title"], "New");

    assert!(delete_tracked_product(&pool, config.id, "Abc-1").await.unwrap());
    assert!(!delete_tracked_product(&pool, config.id, "abc-1").await.unwrap());
}

// ---------------------------------------------------------------------------
// sync_logs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn sync_log_lifecycle_sets_end_time_on_terminal(pool: sqlx::PgPool) {
    let config = insert_sync_config(&pool, &make_new_config("acme", true))
        .await
        .unwrap();
    let log = create_sync_log(&pool, config.id, "Product sync started")
        .await
        .unwrap();
    assert_eq!(log.status(), Some(SyncLogStatus::Started));

    update_sync_log(
        &pool,
        log.id,
        &SyncLogUpdate::phase(SyncLogStatus::Processing, "Fetched 3 products from source"),
    )
    .await
    .unwrap();
    let mid = get_sync_log(&pool, log.id).await.unwrap();
    assert!(mid.end_time.is_none());
    assert_eq!(mid.items_processed, 0);

    update_sync_log(
        &pool,
        log.id,
        &SyncLogUpdate {
            status: Some(SyncLogStatus::Completed),
            message: Some("done".to_string()),
            items_processed: Some(3),
            items_succeeded: Some(3),
            items_failed: Some(0),
        },
    )
    .await
    .unwrap();
    let done = get_sync_log(&pool, log.id).await.unwrap();
    assert!(done.end_time.is_some());
    assert_eq!(done.items_succeeded, 3);

    let last_ok = get_last_successful_sync(&pool, config.id).await.unwrap();
    assert_eq!(last_ok.map(|r| r.id), Some(log.id));
    assert!(get_last_failed_sync(&pool, config.id).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn failed_runs_are_reported_separately(pool: sqlx::PgPool) {
    let config = insert_sync_config(&pool, &make_new_config("acme", true))
        .await
        .unwrap();
    let log = create_sync_log(&pool, config.id, "Product sync started")
        .await
        .unwrap();
    update_sync_log(
        &pool,
        log.id,
        &SyncLogUpdate::phase(SyncLogStatus::Failed, "Sync failed: boom"),
    )
    .await
    .unwrap();

    assert!(get_last_successful_sync(&pool, config.id).await.unwrap().is_none());
    let failed = get_last_failed_sync(&pool, config.id).await.unwrap().unwrap();
    assert_eq!(failed.message.as_deref(), Some("Sync failed: boom"));

    let all = list_sync_logs(&pool, None, 10).await.unwrap();
    assert_eq!(all.len(), 1);
    let other = list_sync_logs(&pool, Some(uuid::Uuid::new_v4()), 10)
        .await
        .unwrap();
    assert!(other.is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a live Postgres at DATABASE_URL"]
async fn updating_missing_log_is_not_found(pool: sqlx::PgPool) {
    let err = update_sync_log(
        &pool,
        uuid::Uuid::new_v4(),
        &SyncLogUpdate::phase(SyncLogStatus::Processing, "x"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DbError::NotFound));
}
