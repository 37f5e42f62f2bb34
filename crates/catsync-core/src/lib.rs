pub mod app_config;
pub mod config;
pub mod seed_file;
pub mod sku;
pub mod sync_config;
pub mod sync_log;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use seed_file::{load_sync_configs, SyncConfigsFile};
pub use sku::{sku_key, SKU_CANDIDATES};
pub use sync_config::{
    AttributeBaseType, AttributeType, CustomAttributeMapping, FieldMapping, MappingEntry,
    MappingKind, NewSyncConfiguration, Scope, SourceCredentials, SourceType, SyncConfigPatch,
    SyncConfiguration, TargetField, DEFAULT_NAMESPACE, DEFAULT_SYNC_FREQUENCY_HOURS,
};
pub use sync_log::{SyncLogStatus, SyncLogUpdate};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read sync configs file {path}: {source}")]
    ConfigsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse sync configs file: {0}")]
    ConfigsFileParse(#[from] serde_yaml::Error),

    #[error("invalid {context}: {source}")]
    InvalidJson {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("validation error: {0}")]
    Validation(String),
}
