use std::path::PathBuf;

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub configs_path: PathBuf,
    pub shopify_shop_domain: Option<String>,
    pub shopify_access_token: Option<String>,
    pub shopify_api_version: String,
    pub user_agent: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub api_request_timeout_secs: u64,
    pub api_max_concurrency: usize,
    pub api_max_retries: u32,
    pub api_retry_backoff_base_ms: u64,
    pub direct_concurrency: usize,
    pub feed_max_concurrency: usize,
    pub feed_request_timeout_secs: u64,
    pub bulk_threshold: usize,
    pub bulk_poll_interval_secs: u64,
    pub bulk_max_poll_attempts: u32,
    pub schedule_cron: String,
    pub shutdown_grace_secs: u64,
}

impl AppConfig {
    /// Returns the shop domain and Admin API token, failing when either is unset.
    ///
    /// Database-only commands never call this, so both values stay optional at load time.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingEnvVar`] naming the first absent variable.
    pub fn shopify_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let domain = self
            .shopify_shop_domain
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("SHOPIFY_SHOP_DOMAIN".to_string()))?;
        let token = self
            .shopify_access_token
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("SHOPIFY_ADMIN_ACCESS_TOKEN".to_string()))?;
        Ok((domain, token))
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("configs_path", &self.configs_path)
            .field("database_url", &"[redacted]")
            .field("shopify_shop_domain", &self.shopify_shop_domain)
            .field(
                "shopify_access_token",
                &self.shopify_access_token.as_ref().map(|_| "[redacted]"),
            )
            .field("shopify_api_version", &self.shopify_api_version)
            .field("user_agent", &self.user_agent)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("api_request_timeout_secs", &self.api_request_timeout_secs)
            .field("api_max_concurrency", &self.api_max_concurrency)
            .field("api_max_retries", &self.api_max_retries)
            .field("api_retry_backoff_base_ms", &self.api_retry_backoff_base_ms)
            .field("direct_concurrency", &self.direct_concurrency)
            .field("feed_max_concurrency", &self.feed_max_concurrency)
            .field("feed_request_timeout_secs", &self.feed_request_timeout_secs)
            .field("bulk_threshold", &self.bulk_threshold)
            .field("bulk_poll_interval_secs", &self.bulk_poll_interval_secs)
            .field("bulk_max_poll_attempts", &self.bulk_max_poll_attempts)
            .field("schedule_cron", &self.schedule_cron)
            .field("shutdown_grace_secs", &self.shutdown_grace_secs)
            .finish()
    }
}
