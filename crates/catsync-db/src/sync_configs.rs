//! Database operations for `sync_configurations`.

use catsync_core::{
    ConfigError, CustomAttributeMapping, FieldMapping, NewSyncConfiguration, SourceCredentials,
    SourceType, SyncConfiguration,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

const SELECT_COLUMNS: &str = "id, name, source_type, credentials, field_mapping, custom_attributes, \
     sync_frequency_hours, is_active, created_at, updated_at";

// ---------------------------------------------------------------------------
// Row type
// ---------------------------------------------------------------------------

/// A row from the `sync_configurations` table. JSON columns are kept raw so a
/// malformed row surfaces as a configuration error for that config only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncConfigRow {
    pub id: Uuid,
    pub name: String,
    pub source_type: String,
    pub credentials: serde_json::Value,
    pub field_mapping: serde_json::Value,
    pub custom_attributes: serde_json::Value,
    pub sync_frequency_hours: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncConfigRow {
    /// Decodes the JSON columns into a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any column does not decode or the result fails validation.
    pub fn to_configuration(&self) -> Result<SyncConfiguration, ConfigError> {
        let source_type = self.source_type.parse::<SourceType>()?;
        let credentials: SourceCredentials = decode(&self.credentials, "credentials")?;
        let field_mapping: FieldMapping = decode(&self.field_mapping, "field_mapping")?;
        let custom_attributes: Vec<CustomAttributeMapping> =
            decode(&self.custom_attributes, "custom_attributes")?;
        let sync_frequency_hours = u32::try_from(self.sync_frequency_hours).map_err(|_| {
            ConfigError::Validation(format!(
                "sync_frequency_hours {} is negative",
                self.sync_frequency_hours
            ))
        })?;

        let config = SyncConfiguration {
            id: self.id,
            name: self.name.clone(),
            source_type,
            credentials,
            field_mapping,
            custom_attributes,
            sync_frequency_hours,
            is_active: self.is_active,
        };
        config.validate()?;
        Ok(config)
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    value: &serde_json::Value,
    context: &str,
) -> Result<T, ConfigError> {
    serde_json::from_value(value.clone()).map_err(|source| ConfigError::InvalidJson {
        context: context.to_string(),
        source,
    })
}

pub(crate) struct EncodedColumns {
    pub(crate) credentials: serde_json::Value,
    pub(crate) field_mapping: serde_json::Value,
    pub(crate) custom_attributes: serde_json::Value,
    pub(crate) sync_frequency_hours: i32,
}

pub(crate) fn encode_columns(
    credentials: &SourceCredentials,
    field_mapping: &FieldMapping,
    custom_attributes: &[CustomAttributeMapping],
    sync_frequency_hours: u32,
) -> Result<EncodedColumns, DbError> {
    let encode = |context: &'static str, result: Result<serde_json::Value, serde_json::Error>| {
        result.map_err(|source| DbError::Encode { context, source })
    };
    Ok(EncodedColumns {
        credentials: encode("credentials", serde_json::to_value(credentials))?,
        field_mapping: encode("field_mapping", serde_json::to_value(field_mapping))?,
        custom_attributes: encode("custom_attributes", serde_json::to_value(custom_attributes))?,
        sync_frequency_hours: i32::try_from(sync_frequency_hours).unwrap_or(i32::MAX),
    })
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Returns every configuration ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sync_configs(pool: &PgPool) -> Result<Vec<SyncConfigRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncConfigRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM sync_configurations ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns configurations with `is_active = true`, ordered by name.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_active_sync_configs(pool: &PgPool) -> Result<Vec<SyncConfigRow>, DbError> {
    let rows = sqlx::query_as::<_, SyncConfigRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM sync_configurations WHERE is_active = true ORDER BY name"
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetches one configuration by id, or `None` when it does not exist.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_config(pool: &PgPool, id: Uuid) -> Result<Option<SyncConfigRow>, DbError> {
    let row = sqlx::query_as::<_, SyncConfigRow>(&format!(
        "SELECT {SELECT_COLUMNS} FROM sync_configurations WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Inserts a new configuration with a freshly generated id.
///
/// # Errors
///
/// Returns [`DbError::Encode`] if a JSON column cannot be encoded, or
/// [`DbError::Sqlx`] if the insert fails (including a duplicate name).
pub async fn insert_sync_config(
    pool: &PgPool,
    config: &NewSyncConfiguration,
) -> Result<SyncConfigRow, DbError> {
    let cols = encode_columns(
        &config.credentials,
        &config.field_mapping,
        &config.custom_attributes,
        config.sync_frequency_hours,
    )?;

    let row = sqlx::query_as::<_, SyncConfigRow>(&format!(
        "INSERT INTO sync_configurations \
             (id, name, source_type, credentials, field_mapping, custom_attributes, \
              sync_frequency_hours, is_active) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {SELECT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&config.name)
    .bind(config.source_type.as_str())
    .bind(&cols.credentials)
    .bind(&cols.field_mapping)
    .bind(&cols.custom_attributes)
    .bind(cols.sync_frequency_hours)
    .bind(config.is_active)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Replaces every mutable column of an existing configuration.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row has `config.id`, [`DbError::Encode`]
/// if a JSON column cannot be encoded, or [`DbError::Sqlx`] if the update fails.
pub async fn update_sync_config(
    pool: &PgPool,
    config: &SyncConfiguration,
) -> Result<SyncConfigRow, DbError> {
    let cols = encode_columns(
        &config.credentials,
        &config.field_mapping,
        &config.custom_attributes,
        config.sync_frequency_hours,
    )?;

    let row = sqlx::query_as::<_, SyncConfigRow>(&format!(
        "UPDATE sync_configurations SET \
             name = $2, source_type = $3, credentials = $4, field_mapping = $5, \
             custom_attributes = $6, sync_frequency_hours = $7, is_active = $8, \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {SELECT_COLUMNS}"
    ))
    .bind(config.id)
    .bind(&config.name)
    .bind(config.source_type.as_str())
    .bind(&cols.credentials)
    .bind(&cols.field_mapping)
    .bind(&cols.custom_attributes)
    .bind(cols.sync_frequency_hours)
    .bind(config.is_active)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Deletes a configuration; tracking rows and logs cascade. Returns whether a
/// row was removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_sync_config(pool: &PgPool, id: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM sync_configurations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(field_mapping: serde_json::Value) -> SyncConfigRow {
        SyncConfigRow {
            id: Uuid::new_v4(),
            name: "acme".to_string(),
            source_type: "ftp".to_string(),
            credentials: json!({
                "ftpHost": "ftp.acme.test",
                "ftpPort": 21,
                "filePath": "/products.json"
            }),
            field_mapping,
            custom_attributes: json!([]),
            sync_frequency_hours: 12,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn row_decodes_into_configuration() {
        let cfg = row(json!({ "title": "Name", "variant.sku": "Code" }))
            .to_configuration()
            .unwrap();
        assert_eq!(cfg.sync_frequency_hours, 12);
        assert_eq!(cfg.credentials.host, "ftp.acme.test");
        assert_eq!(cfg.field_mapping.entries().len(), 2);
    }

    #[test]
    fn row_with_unknown_target_is_config_error() {
        let err = row(json!({ "colour": "Colour" }))
            .to_configuration()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidJson { ref context, .. } if context == "field_mapping"));
    }

    #[test]
    fn row_with_unknown_source_type_is_rejected() {
        let mut r = row(json!({}));
        r.source_type = "sftp".to_string();
        assert!(r.to_configuration().is_err());
    }
}
