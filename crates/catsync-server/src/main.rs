mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use catsync_engine::{RunCoordinator, SyncEngine};
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(catsync_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = catsync_db::PoolConfig::from_app_config(&config);
    let pool = catsync_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = catsync_db::run_migrations(&pool).await?;
    tracing::info!(applied, env = %config.env, "database ready");

    seed_configs(&pool, &config).await;

    let engine = Arc::new(SyncEngine::from_app_config(&config, pool)?);
    let coordinator = RunCoordinator::for_engine(engine);

    match coordinator.retry_failed_syncs().await {
        Ok(n) => tracing::info!(started = n, "startup retry check finished"),
        Err(e) => tracing::error!(error = %e, "startup retry check failed"),
    }
    scheduler::run_schedule_check(&coordinator).await;

    let mut jobs = scheduler::build_scheduler(coordinator.clone(), &config.schedule_cron).await?;

    shutdown_signal().await;
    jobs.shutdown().await?;

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    let in_flight = coordinator.in_flight();
    if !in_flight.is_empty() {
        tracing::info!(
            runs = in_flight.len(),
            grace_secs = grace.as_secs(),
            "waiting for in-flight syncs"
        );
    }
    if !coordinator.wait_idle(grace).await {
        tracing::warn!(
            runs = coordinator.in_flight().len(),
            "shutdown grace period elapsed with syncs still running"
        );
    }
    tracing::info!("shutdown complete");
    Ok(())
}

/// Upserts the configurations in the seed file, if one exists. A bad seed
/// file is logged and skipped so stored configurations still run.
async fn seed_configs(pool: &PgPool, config: &catsync_core::AppConfig) {
    let path = config.configs_path.as_path();
    if !path.exists() {
        tracing::info!(path = %path.display(), "no configuration seed file; skipping seed");
        return;
    }
    let file = match catsync_core::load_sync_configs(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "invalid configuration seed file");
            return;
        }
    };
    match catsync_db::seed_sync_configs(pool, &file.configs).await {
        Ok(n) => tracing::info!(seeded = n, path = %path.display(), "seeded sync configurations"),
        Err(e) => tracing::error!(error = %e, "failed to seed sync configurations"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, no longer scheduling syncs");
}
