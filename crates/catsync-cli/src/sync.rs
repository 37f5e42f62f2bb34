//! `sync` and `logs` handlers.

use std::sync::Arc;

use catsync_engine::{
    PgStore, RunCoordinator, RunOptions, RunSummary, SyncEngine, SyncLogEntry, SyncLogStore,
    DEFAULT_LIMIT,
};
use chrono::Utc;
use clap::Subcommand;
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum SyncCommands {
    /// Reconcile one configuration now
    Run {
        #[arg(long)]
        config: Uuid,
        /// Process only the first records of the feed and skip deletes
        #[arg(long)]
        limited: bool,
        /// Record cap for a limited run (implies --limited)
        #[arg(long)]
        limit: Option<usize>,
        /// Write every create and update set through bulk jobs
        #[arg(long)]
        bulk: bool,
    },
    /// Delete duplicate products across the whole catalog
    Cleanup,
    /// List configurations due for a run
    Due {
        /// Run each due configuration in turn
        #[arg(long)]
        run: bool,
    },
}

impl SyncCommands {
    /// Options for `sync run`; `None` for the other commands.
    pub(crate) fn run_options(&self) -> Option<RunOptions> {
        let SyncCommands::Run {
            limited,
            limit,
            bulk,
            ..
        } = self
        else {
            return None;
        };
        Some(RunOptions {
            limited: *limited || limit.is_some(),
            limit: limit.unwrap_or(DEFAULT_LIMIT),
            use_bulk: *bulk,
        })
    }
}

pub(crate) async fn run(
    pool: sqlx::PgPool,
    config: &catsync_core::AppConfig,
    command: SyncCommands,
) -> anyhow::Result<()> {
    let options = command.run_options();
    let engine = Arc::new(SyncEngine::from_app_config(config, pool)?);
    let coordinator = RunCoordinator::for_engine(Arc::clone(&engine));

    match command {
        SyncCommands::Run { config: id, .. } => {
            let options = options.unwrap_or_default();
            let summary = coordinator
                .run_now(id, options)
                .await
                .ok_or_else(|| anyhow::anyhow!("a sync for {id} is already running"))??;
            print_summary(id, &summary);
        }
        SyncCommands::Cleanup => {
            let summary = engine.cleanup_duplicates(None).await?;
            println!(
                "scanned {} products: {} duplicate groups, {} deleted, {} errors",
                summary.total_scanned, summary.duplicate_groups, summary.deleted, summary.errors
            );
        }
        SyncCommands::Due { run } => {
            let due = coordinator.due_configs(Utc::now()).await?;
            if due.is_empty() {
                println!("no configurations due");
                return Ok(());
            }
            for config in &due {
                println!("{}  {}", config.id, config.name);
            }
            if run {
                let mut failures = 0usize;
                for config in &due {
                    match coordinator.run_now(config.id, RunOptions::default()).await {
                        Some(Ok(summary)) => print_summary(config.id, &summary),
                        Some(Err(e)) => {
                            failures += 1;
                            eprintln!("{}: sync failed: {e}", config.name);
                        }
                        None => {}
                    }
                }
                if failures > 0 {
                    anyhow::bail!("{failures} of {} due syncs failed", due.len());
                }
            }
        }
    }
    Ok(())
}

fn print_summary(config_id: Uuid, summary: &RunSummary) {
    println!(
        "sync {config_id}: {} created, {} updated, {} deleted, {} failed, {} skipped, {} duplicates removed",
        summary.created,
        summary.updated,
        summary.deleted,
        summary.failed,
        summary.skipped,
        summary.duplicates_removed
    );
    if let Some(log_id) = summary.sync_log_id {
        println!("sync log: {log_id}");
    }
}

pub(crate) async fn run_logs(
    pool: &sqlx::PgPool,
    config_id: Option<Uuid>,
    limit: usize,
) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    let logs = SyncLogStore::recent(&store, config_id, limit).await?;
    if logs.is_empty() {
        println!("no sync runs recorded");
        return Ok(());
    }

    println!(
        "{:<22}{:<23}{:>6}{:>6}{:>6}  MESSAGE",
        "STARTED", "STATUS", "ITEMS", "OK", "FAIL"
    );
    for log in &logs {
        println!("{}", format_log_row(log));
    }
    Ok(())
}

pub(crate) fn format_log_row(log: &SyncLogEntry) -> String {
    let message = log.message.as_deref().unwrap_or("");
    let message = if message.chars().count() > 60 {
        format!("{}...", message.chars().take(60).collect::<String>())
    } else {
        message.to_string()
    };
    let started = log.start_time.format("%Y-%m-%d %H:%M:%S").to_string();
    format!(
        "{:<22}{:<23}{:>6}{:>6}{:>6}  {}",
        started,
        log.status.as_str(),
        log.items_processed,
        log.items_succeeded,
        log.items_failed,
        message
    )
}
