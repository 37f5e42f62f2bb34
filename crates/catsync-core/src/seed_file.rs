use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::sync_config::NewSyncConfiguration;
use crate::ConfigError;

#[derive(Debug, Deserialize)]
pub struct SyncConfigsFile {
    pub configs: Vec<NewSyncConfiguration>,
}

/// Load and validate sync configurations from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_sync_configs(path: &Path) -> Result<SyncConfigsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ConfigsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: SyncConfigsFile = serde_yaml::from_str(&content)?;
    validate_configs(&file)?;

    Ok(file)
}

fn validate_configs(file: &SyncConfigsFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();

    for config in &file.configs {
        config.validate()?;

        if !seen_names.insert(config.name.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate configuration name: '{}'",
                config.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync_config::{SourceType, TargetField};

    const SAMPLE: &str = r"
configs:
  - name: acme-erp
    source_type: ftp
    credentials:
      host: ftp.acme.test
      port: 21
      user: sync
      password: secret
      file_path: /exports/products.json
      data_path: data.products
    field_mapping:
      title: Name
      variant.sku: ItemCode
      variant.price: Price
    custom_attributes:
      - source_key: Material
        key: material
        type: single_line_text_field
    sync_frequency_hours: 12
";

    #[test]
    fn parses_sample_yaml() {
        let file: SyncConfigsFile = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(file.configs.len(), 1);
        let cfg = &file.configs[0];
        assert_eq!(cfg.source_type, SourceType::Ftp);
        assert_eq!(cfg.sync_frequency_hours, 12);
        assert!(cfg.is_active);
        assert_eq!(cfg.field_mapping.source_for(TargetField::Sku), Some("ItemCode"));
        assert!(validate_configs(&file).is_ok());
    }

    #[test]
    fn rejects_duplicate_names_case_insensitively() {
        let mut file: SyncConfigsFile = serde_yaml::from_str(SAMPLE).unwrap();
        let mut copy = file.configs[0].clone();
        copy.name = "ACME-ERP".to_string();
        file.configs.push(copy);

        let err = validate_configs(&file).unwrap_err();
        assert!(err.to_string().contains("duplicate configuration name"));
    }

    #[test]
    fn load_sync_configs_from_repo_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("sync_configs.yaml");
        let result = load_sync_configs(&path);
        assert!(result.is_ok(), "failed to load sync_configs.yaml: {result:?}");
        assert!(!result.unwrap().configs.is_empty());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_sync_configs(Path::new("/nonexistent/sync_configs.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigsFileIo { .. }));
    }
}
