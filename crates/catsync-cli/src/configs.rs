//! `configs` sub-commands: read-only listing plus delete.

use catsync_core::SyncConfiguration;
use catsync_engine::{ConfigStore, PgStore};
use clap::Subcommand;
use uuid::Uuid;

#[derive(Debug, Subcommand)]
pub enum ConfigsCommands {
    /// List every stored configuration
    List,
    /// Print one configuration as JSON (password redacted)
    Show {
        #[arg(long)]
        config: Uuid,
    },
    /// Delete a configuration with its tracking rows and logs
    Delete {
        #[arg(long)]
        config: Uuid,
    },
}

pub(crate) async fn run(pool: &sqlx::PgPool, command: ConfigsCommands) -> anyhow::Result<()> {
    let store = PgStore::new(pool.clone());
    match command {
        ConfigsCommands::List => list(&store).await,
        ConfigsCommands::Show { config } => show(&store, config).await,
        ConfigsCommands::Delete { config } => {
            if ConfigStore::delete(&store, config).await? {
                println!("deleted configuration {config}");
                Ok(())
            } else {
                anyhow::bail!("configuration {config} not found")
            }
        }
    }
}

async fn list(store: &PgStore) -> anyhow::Result<()> {
    let configs = ConfigStore::list(store).await?;
    if configs.is_empty() {
        println!("no sync configurations; run `db seed` first");
        return Ok(());
    }

    println!(
        "{:<38}{:<7}{:<8}{:<7}NAME",
        "ID", "SOURCE", "EVERY", "ACTIVE"
    );
    for config in &configs {
        let id = config.id.to_string();
        let every = format!("{}h", config.sync_frequency_hours);
        println!(
            "{:<38}{:<7}{:<8}{:<7}{}",
            id,
            config.source_type.as_str(),
            every,
            if config.is_active { "yes" } else { "no" },
            config.name
        );
    }
    Ok(())
}

async fn show(store: &PgStore, id: Uuid) -> anyhow::Result<()> {
    let config = ConfigStore::get(store, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("configuration {id} not found"))?;
    println!("{}", serde_json::to_string_pretty(&redacted(config))?);
    Ok(())
}

pub(crate) fn redacted(mut config: SyncConfiguration) -> SyncConfiguration {
    if config.credentials.password.is_some() {
        config.credentials.password = Some("[redacted]".to_string());
    }
    config
}
