use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so tests can drive it with a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var).ok().filter(|v| !v.trim().is_empty())
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
    };

    // Concurrency caps of zero would stall every run, so they are rejected here.
    let parse_positive = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let raw = or_default(var, default);
        match raw.parse::<usize>() {
            Ok(0) => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            Ok(n) => Ok(n),
            Err(e) => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            }),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("CATSYNC_ENV", "development"));
    let log_level = or_default("CATSYNC_LOG_LEVEL", "info");
    let configs_path = PathBuf::from(or_default(
        "CATSYNC_CONFIGS_PATH",
        "./config/sync_configs.yaml",
    ));

    let shopify_shop_domain = optional("SHOPIFY_SHOP_DOMAIN");
    let shopify_access_token = optional("SHOPIFY_ADMIN_ACCESS_TOKEN");
    let shopify_api_version = or_default("SHOPIFY_API_VERSION", "2024-10");
    let user_agent = or_default("CATSYNC_USER_AGENT", "catsync/0.1 (catalog-sync)");

    let db_max_connections = parse_u32("CATSYNC_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("CATSYNC_DB_MIN_CONNECTIONS", "1")?;
    let db_acquire_timeout_secs = parse_u64("CATSYNC_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let api_request_timeout_secs = parse_u64("CATSYNC_API_REQUEST_TIMEOUT_SECS", "30")?;
    let api_max_concurrency = parse_positive("CATSYNC_API_MAX_CONCURRENCY", "5")?;
    let api_max_retries = parse_u32("CATSYNC_API_MAX_RETRIES", "3")?;
    let api_retry_backoff_base_ms = parse_u64("CATSYNC_API_RETRY_BACKOFF_BASE_MS", "1000")?;
    let direct_concurrency = parse_positive("CATSYNC_DIRECT_CONCURRENCY", "2")?;

    let feed_max_concurrency = parse_positive("CATSYNC_FEED_MAX_CONCURRENCY", "2")?;
    let feed_request_timeout_secs = parse_u64("CATSYNC_FEED_REQUEST_TIMEOUT_SECS", "120")?;

    let bulk_threshold = parse_positive("CATSYNC_BULK_THRESHOLD", "10")?;
    let bulk_poll_interval_secs = parse_u64("CATSYNC_BULK_POLL_INTERVAL_SECS", "5")?;
    let bulk_max_poll_attempts = parse_u32("CATSYNC_BULK_MAX_POLL_ATTEMPTS", "120")?;

    let schedule_cron = or_default("CATSYNC_SCHEDULE_CRON", "0 0 * * * *");
    let shutdown_grace_secs = parse_u64("CATSYNC_SHUTDOWN_GRACE_SECS", "60")?;

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        configs_path,
        shopify_shop_domain,
        shopify_access_token,
        shopify_api_version,
        user_agent,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        api_request_timeout_secs,
        api_max_concurrency,
        api_max_retries,
        api_retry_backoff_base_ms,
        direct_concurrency,
        feed_max_concurrency,
        feed_request_timeout_secs,
        bulk_threshold,
        bulk_poll_interval_secs,
        bulk_max_poll_attempts,
        schedule_cron,
        shutdown_grace_secs,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
