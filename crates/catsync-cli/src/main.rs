mod configs;
mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::configs::ConfigsCommands;
use crate::sync::SyncCommands;

#[derive(Debug, Parser)]
#[command(name = "catsync-cli")]
#[command(about = "Catalog feed sync command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Inspect and remove stored sync configurations
    Configs {
        #[command(subcommand)]
        command: ConfigsCommands,
    },
    /// Run reconciliation and duplicate cleanup
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Show recent sync runs
    Logs {
        /// Only runs for this configuration
        #[arg(long)]
        config: Option<Uuid>,
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
    /// Upsert configurations from the seed file (by name)
    Seed {
        /// Seed file; defaults to `CATSYNC_CONFIGS_PATH`
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("catsync-cli: no command given; see --help");
        return Ok(());
    };

    let config = catsync_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = catsync_db::PoolConfig::from_app_config(&config);
    let pool = catsync_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => run_db(&pool, &config, command).await,
        Commands::Configs { command } => configs::run(&pool, command).await,
        Commands::Sync { command } => sync::run(pool, &config, command).await,
        Commands::Logs { config: config_id, limit } => sync::run_logs(&pool, config_id, limit).await,
    }
}

async fn run_db(
    pool: &sqlx::PgPool,
    config: &catsync_core::AppConfig,
    command: DbCommands,
) -> anyhow::Result<()> {
    match command {
        DbCommands::Ping => {
            catsync_db::ping(pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = catsync_db::run_migrations(pool).await?;
            println!("migrations up to date ({applied} applied)");
        }
        DbCommands::Seed { path } => {
            let path = path.unwrap_or_else(|| config.configs_path.clone());
            let file = catsync_core::load_sync_configs(&path)?;
            let seeded = catsync_db::seed_sync_configs(pool, &file.configs).await?;
            println!("seeded {seeded} sync configurations from {}", path.display());
        }
    }
    Ok(())
}
