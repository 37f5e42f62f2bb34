//! Sync configuration model: where a feed lives and how its records map onto catalog entities.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::ConfigError;

pub const DEFAULT_NAMESPACE: &str = "custom";
pub const DEFAULT_SYNC_FREQUENCY_HOURS: u32 = 24;

const VARIANT_PREFIX: &str = "variant.";
const LEGACY_PREFIX: &str = "FIELD_";
const MIN_ATTRIBUTE_KEY_LEN: usize = 2;

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Transport used to download the feed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Ftp,
    Http,
    #[serde(rename = "file")]
    LocalFile,
}

impl SourceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Ftp => "ftp",
            SourceType::Http => "http",
            SourceType::LocalFile => "file",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ftp" => Ok(SourceType::Ftp),
            "http" | "https" => Ok(SourceType::Http),
            "file" => Ok(SourceType::LocalFile),
            other => Err(ConfigError::Validation(format!(
                "unsupported source type '{other}'"
            ))),
        }
    }
}

/// Connection parameters for the feed source. Accepts both snake_case and the
/// legacy camelCase `ftp*` key names.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCredentials {
    #[serde(default, alias = "ftpHost")]
    pub host: String,
    #[serde(default, alias = "ftpPort", deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
    #[serde(default, alias = "ftpUser", alias = "username")]
    pub user: Option<String>,
    #[serde(default, alias = "ftpPassword")]
    pub password: Option<String>,
    #[serde(default, alias = "filePath")]
    pub file_path: String,
    /// Dot-separated path to the record array inside the downloaded document.
    #[serde(default, alias = "dataPath", skip_serializing_if = "Option::is_none")]
    pub data_path: Option<String>,
}

impl fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("file_path", &self.file_path)
            .field("data_path", &self.data_path)
            .finish()
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u64),
        Text(String),
    }

    match Option::<RawPort>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawPort::Number(n)) => u16::try_from(n)
            .map(Some)
            .map_err(|_| de::Error::custom(format!("port {n} is out of range"))),
        Some(RawPort::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(RawPort::Text(s)) => s
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|e| de::Error::custom(format!("invalid port '{s}': {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Field mapping
// ---------------------------------------------------------------------------

/// Which half of the platform payload a target field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Entity,
    Variant,
}

/// A platform field a feed value can be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetField {
    Title,
    DescriptionHtml,
    Vendor,
    ProductType,
    Handle,
    Tags,
    Status,
    SeoTitle,
    SeoDescription,
    TemplateSuffix,
    Sku,
    Barcode,
    Price,
    CompareAtPrice,
    InventoryPolicy,
    InventoryQuantity,
    Weight,
    WeightUnit,
    Cost,
}

impl TargetField {
    #[must_use]
    pub fn scope(self) -> Scope {
        match self {
            TargetField::Sku
            | TargetField::Barcode
            | TargetField::Price
            | TargetField::CompareAtPrice
            | TargetField::InventoryPolicy
            | TargetField::InventoryQuantity
            | TargetField::Weight
            | TargetField::WeightUnit
            | TargetField::Cost => Scope::Variant,
            _ => Scope::Entity,
        }
    }

    /// Canonical name; variant fields carry the `variant.` prefix.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetField::Title => "title",
            TargetField::DescriptionHtml => "description_html",
            TargetField::Vendor => "vendor",
            TargetField::ProductType => "product_type",
            TargetField::Handle => "handle",
            TargetField::Tags => "tags",
            TargetField::Status => "status",
            TargetField::SeoTitle => "seo_title",
            TargetField::SeoDescription => "seo_description",
            TargetField::TemplateSuffix => "template_suffix",
            TargetField::Sku => "variant.sku",
            TargetField::Barcode => "variant.barcode",
            TargetField::Price => "variant.price",
            TargetField::CompareAtPrice => "variant.compare_at_price",
            TargetField::InventoryPolicy => "variant.inventory_policy",
            TargetField::InventoryQuantity => "variant.inventory_quantity",
            TargetField::Weight => "variant.weight",
            TargetField::WeightUnit => "variant.weight_unit",
            TargetField::Cost => "variant.cost",
        }
    }

    fn entity_from_name(name: &str) -> Option<Self> {
        Some(match name {
            "title" => TargetField::Title,
            "description_html" | "descriptionHtml" | "description" => TargetField::DescriptionHtml,
            "vendor" => TargetField::Vendor,
            "product_type" | "productType" => TargetField::ProductType,
            "handle" => TargetField::Handle,
            "tags" => TargetField::Tags,
            "status" => TargetField::Status,
            "seo_title" | "seoTitle" => TargetField::SeoTitle,
            "seo_description" | "seoDescription" => TargetField::SeoDescription,
            "template_suffix" | "templateSuffix" => TargetField::TemplateSuffix,
            _ => return None,
        })
    }

    fn variant_from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sku" => TargetField::Sku,
            "barcode" => TargetField::Barcode,
            "price" => TargetField::Price,
            "compare_at_price" | "compareAtPrice" => TargetField::CompareAtPrice,
            "inventory_policy" | "inventoryPolicy" => TargetField::InventoryPolicy,
            "inventory_quantity" | "inventoryQuantity" => TargetField::InventoryQuantity,
            "weight" => TargetField::Weight,
            "weight_unit" | "weightUnit" => TargetField::WeightUnit,
            "cost" => TargetField::Cost,
            _ => return None,
        })
    }
}

impl fmt::Display for TargetField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetField {
    type Err = String;

    /// Accepts `variant.<name>`, plain entity names, and the legacy
    /// `FIELD_<NAME>` form where the scope is inferred from the name.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw.trim();
        let parsed = if let Some(rest) = name.strip_prefix(VARIANT_PREFIX) {
            Self::variant_from_name(rest)
        } else if let Some(rest) = name.strip_prefix(LEGACY_PREFIX) {
            let lowered = rest.to_ascii_lowercase();
            Self::variant_from_name(&lowered).or_else(|| Self::entity_from_name(&lowered))
        } else {
            Self::entity_from_name(name)
        };
        parsed.ok_or_else(|| format!("unknown mapping target '{name}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub target: TargetField,
    /// Feed field name the value is read from.
    pub source: String,
}

/// Target field → feed field mapping, kept in document order.
///
/// Serialized as a plain map. Entries whose feed field is null or blank are
/// dropped on load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMapping(Vec<MappingEntry>);

impl FieldMapping {
    #[must_use]
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self(entries)
    }

    #[must_use]
    pub fn entries(&self) -> &[MappingEntry] {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Feed field mapped onto `target`, if any.
    #[must_use]
    pub fn source_for(&self, target: TargetField) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.target == target)
            .map(|e| e.source.as_str())
    }
}

impl Serialize for FieldMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(entry.target.as_str(), &entry.source)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMappingVisitor;

        impl<'de> Visitor<'de> for FieldMappingVisitor {
            type Value = FieldMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of platform field to feed field")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::new();
                while let Some((target, source)) = access.next_entry::<String, Option<String>>()? {
                    let Some(source) = source.filter(|s| !s.trim().is_empty()) else {
                        continue;
                    };
                    let target = target.parse::<TargetField>().map_err(de::Error::custom)?;
                    entries.push(MappingEntry { target, source });
                }
                Ok(FieldMapping(entries))
            }
        }

        deserializer.deserialize_map(FieldMappingVisitor)
    }
}

// ---------------------------------------------------------------------------
// Custom attributes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeBaseType {
    SingleLineText,
    MultiLineText,
    Integer,
    Decimal,
    Boolean,
    Json,
    Url,
    Date,
    DateTime,
    Other(String),
}

impl AttributeBaseType {
    fn parse(name: &str) -> Self {
        match name {
            "single_line_text_field" => AttributeBaseType::SingleLineText,
            "multi_line_text_field" => AttributeBaseType::MultiLineText,
            "number_integer" => AttributeBaseType::Integer,
            "number_decimal" => AttributeBaseType::Decimal,
            "boolean" => AttributeBaseType::Boolean,
            "json" => AttributeBaseType::Json,
            "url" => AttributeBaseType::Url,
            "date" => AttributeBaseType::Date,
            "date_time" => AttributeBaseType::DateTime,
            other => AttributeBaseType::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            AttributeBaseType::SingleLineText => "single_line_text_field",
            AttributeBaseType::MultiLineText => "multi_line_text_field",
            AttributeBaseType::Integer => "number_integer",
            AttributeBaseType::Decimal => "number_decimal",
            AttributeBaseType::Boolean => "boolean",
            AttributeBaseType::Json => "json",
            AttributeBaseType::Url => "url",
            AttributeBaseType::Date => "date",
            AttributeBaseType::DateTime => "date_time",
            AttributeBaseType::Other(name) => name,
        }
    }
}

/// Platform metafield type, e.g. `number_integer` or `list.single_line_text_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AttributeType {
    pub base: AttributeBaseType,
    pub list: bool,
}

impl Default for AttributeType {
    fn default() -> Self {
        Self {
            base: AttributeBaseType::SingleLineText,
            list: false,
        }
    }
}

impl From<&str> for AttributeType {
    fn from(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }
        match raw.strip_prefix("list.") {
            Some(base) => Self {
                base: AttributeBaseType::parse(base),
                list: true,
            },
            None => Self {
                base: AttributeBaseType::parse(raw),
                list: false,
            },
        }
    }
}

impl From<String> for AttributeType {
    fn from(raw: String) -> Self {
        Self::from(raw.as_str())
    }
}

impl From<AttributeType> for String {
    fn from(t: AttributeType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.list {
            write!(f, "list.{}", self.base.as_str())
        } else {
            f.write_str(self.base.as_str())
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingKind {
    #[default]
    Single,
    #[serde(alias = "dynamic_from_array", alias = "derivedFromArray")]
    DerivedFromArray,
}

/// One custom-attribute rule. `key` applies to [`MappingKind::Single`]; the
/// `array_*_source` fields apply to [`MappingKind::DerivedFromArray`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAttributeMapping {
    #[serde(alias = "sourceKey")]
    pub source_key: String,
    #[serde(default = "default_namespace", alias = "metafieldNamespace")]
    pub namespace: String,
    #[serde(default, alias = "metafieldKey")]
    pub key: String,
    #[serde(default, rename = "type", alias = "metafieldType")]
    pub attr_type: AttributeType,
    #[serde(default, alias = "mappingType", alias = "mappingKind")]
    pub mapping_kind: MappingKind,
    #[serde(default, alias = "arrayKeySource", skip_serializing_if = "Option::is_none")]
    pub array_key_source: Option<String>,
    #[serde(default, alias = "arrayValueSource", skip_serializing_if = "Option::is_none")]
    pub array_value_source: Option<String>,
}

impl CustomAttributeMapping {
    /// Namespace to send, falling back to [`DEFAULT_NAMESPACE`] when blank.
    #[must_use]
    pub fn effective_namespace(&self) -> &str {
        if self.namespace.trim().is_empty() {
            DEFAULT_NAMESPACE
        } else {
            &self.namespace
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_frequency() -> u32 {
    DEFAULT_SYNC_FREQUENCY_HOURS
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A persisted sync configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfiguration {
    pub id: Uuid,
    pub name: String,
    pub source_type: SourceType,
    pub credentials: SourceCredentials,
    #[serde(default)]
    pub field_mapping: FieldMapping,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttributeMapping>,
    #[serde(default = "default_frequency")]
    pub sync_frequency_hours: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl SyncConfiguration {
    /// Checks the rules a run depends on before any remote call is made.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_parts(
            &self.name,
            self.source_type,
            &self.credentials,
            &self.field_mapping,
            &self.custom_attributes,
            self.sync_frequency_hours,
        )
    }
}

/// A configuration that has not been stored yet (seed files, CLI input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSyncConfiguration {
    pub name: String,
    pub source_type: SourceType,
    pub credentials: SourceCredentials,
    #[serde(default)]
    pub field_mapping: FieldMapping,
    #[serde(default)]
    pub custom_attributes: Vec<CustomAttributeMapping>,
    #[serde(default = "default_frequency")]
    pub sync_frequency_hours: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl NewSyncConfiguration {
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_parts(
            &self.name,
            self.source_type,
            &self.credentials,
            &self.field_mapping,
            &self.custom_attributes,
            self.sync_frequency_hours,
        )
    }

    #[must_use]
    pub fn into_configuration(self, id: Uuid) -> SyncConfiguration {
        SyncConfiguration {
            id,
            name: self.name,
            source_type: self.source_type,
            credentials: self.credentials,
            field_mapping: self.field_mapping,
            custom_attributes: self.custom_attributes,
            sync_frequency_hours: self.sync_frequency_hours,
            is_active: self.is_active,
        }
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfigPatch {
    pub name: Option<String>,
    pub source_type: Option<SourceType>,
    pub credentials: Option<SourceCredentials>,
    pub field_mapping: Option<FieldMapping>,
    pub custom_attributes: Option<Vec<CustomAttributeMapping>>,
    pub sync_frequency_hours: Option<u32>,
    pub is_active: Option<bool>,
}

impl SyncConfigPatch {
    /// Applies the patch to `config` and re-validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the patched configuration is invalid;
    /// `config` is left unchanged in that case.
    pub fn apply_to(self, config: &SyncConfiguration) -> Result<SyncConfiguration, ConfigError> {
        let mut next = config.clone();
        if let Some(name) = self.name {
            next.name = name;
        }
        if let Some(source_type) = self.source_type {
            next.source_type = source_type;
        }
        if let Some(credentials) = self.credentials {
            next.credentials = credentials;
        }
        if let Some(field_mapping) = self.field_mapping {
            next.field_mapping = field_mapping;
        }
        if let Some(custom_attributes) = self.custom_attributes {
            next.custom_attributes = custom_attributes;
        }
        if let Some(hours) = self.sync_frequency_hours {
            next.sync_frequency_hours = hours;
        }
        if let Some(active) = self.is_active {
            next.is_active = active;
        }
        next.validate()?;
        Ok(next)
    }
}

fn validate_parts(
    name: &str,
    source_type: SourceType,
    credentials: &SourceCredentials,
    field_mapping: &FieldMapping,
    custom_attributes: &[CustomAttributeMapping],
    sync_frequency_hours: u32,
) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "configuration name must be non-empty".to_string(),
        ));
    }

    if sync_frequency_hours == 0 {
        return Err(ConfigError::Validation(format!(
            "configuration '{name}' has sync_frequency_hours 0; must be at least 1"
        )));
    }

    if credentials.file_path.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "configuration '{name}' has no credentials.file_path"
        )));
    }

    if source_type != SourceType::LocalFile && credentials.host.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "configuration '{name}' uses a {source_type} source but has no credentials.host"
        )));
    }

    let mut seen_targets = HashSet::new();
    for entry in field_mapping.entries() {
        if !seen_targets.insert(entry.target) {
            return Err(ConfigError::Validation(format!(
                "configuration '{name}' maps '{}' more than once",
                entry.target
            )));
        }
    }

    for attr in custom_attributes {
        if attr.source_key.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "configuration '{name}' has a custom attribute with an empty source_key"
            )));
        }
        match attr.mapping_kind {
            MappingKind::Single => {
                if attr.key.trim().chars().count() < MIN_ATTRIBUTE_KEY_LEN {
                    return Err(ConfigError::Validation(format!(
                        "configuration '{name}': custom attribute key '{}' must be at least {MIN_ATTRIBUTE_KEY_LEN} characters",
                        attr.key
                    )));
                }
            }
            MappingKind::DerivedFromArray => {
                let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
                if !has(&attr.array_key_source) || !has(&attr.array_value_source) {
                    return Err(ConfigError::Validation(format!(
                        "configuration '{name}': derived attribute from '{}' needs array_key_source and array_value_source",
                        attr.source_key
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "sync_config_test.rs"]
mod tests;
