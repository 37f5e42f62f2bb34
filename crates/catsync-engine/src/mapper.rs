//! Feed record → platform entity mapping.
//!
//! [`map_record`] is pure: no I/O, no clock, no randomness. Anything that
//! cannot be represented faithfully (a missing field, an unparseable price,
//! an empty attribute) is omitted rather than sent as a blank that would
//! overwrite a value already on the platform.

use std::collections::HashSet;
use std::str::FromStr;

use catsync_core::{
    AttributeBaseType, AttributeType, CustomAttributeMapping, MappingKind, SyncConfiguration,
    TargetField, SKU_CANDIDATES,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Map, Value};

/// Single-line text attribute values and list items are capped at this many characters.
pub const SINGLE_LINE_MAX_CHARS: usize = 255;
const MIN_ATTRIBUTE_KEY_LEN: usize = 2;
const UNTITLED_PRODUCT: &str = "Untitled Product";
const DEFAULT_OPTION_NAME: &str = "Title";
const DEFAULT_OPTION_VALUE: &str = "Default Title";

/// A typed, namespaced extension field attached to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomAttribute {
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub attr_type: String,
    pub value: String,
}

/// Product-level fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityData {
    pub title: Option<String>,
    pub description_html: Option<String>,
    pub vendor: Option<String>,
    pub product_type: Option<String>,
    pub handle: Option<String>,
    pub tags: Vec<String>,
    pub status: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub template_suffix: Option<String>,
    pub attributes: Vec<CustomAttribute>,
}

/// Default-variant fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantData {
    pub sku: String,
    pub barcode: Option<String>,
    pub price: Option<String>,
    pub compare_at_price: Option<String>,
    pub inventory_policy: Option<String>,
    pub inventory_quantity: Option<i64>,
    pub weight: Option<String>,
    pub weight_unit: Option<String>,
    pub cost: Option<String>,
}

/// One feed record in platform shape. Always carries a non-empty SKU.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedEntity {
    pub sku: String,
    pub entity: EntityData,
    pub variant: VariantData,
    /// The untouched feed record, kept for the tracking table.
    pub record: Value,
}

/// Why a record was left out of reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAnObject,
    MissingSku,
}

/// Remote ids an update targets.
#[derive(Debug, Clone, Copy)]
pub struct UpdateTarget<'a> {
    pub product_id: &'a str,
    pub variant_id: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Feed value access
// ---------------------------------------------------------------------------

/// Reads `field` from a record: the literal key first, then a dotted path.
#[must_use]
pub fn lookup<'a>(record: &'a Value, field: &str) -> Option<&'a Value> {
    let direct = record.get(field).filter(|v| !v.is_null());
    if direct.is_some() || !field.contains('.') {
        return direct;
    }
    let mut current = record;
    for segment in field.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Scalar rendered as trimmed text; `None` for null, blank, or structured values.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_owned(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    (!is_blank_marker(&text)).then_some(text)
}

fn is_blank_marker(text: &str) -> bool {
    let t = text.trim();
    t.is_empty() || t == "null" || t == "undefined"
}

/// Resolves a record's SKU: the mapped `variant.sku` source first, then the
/// conventional candidate names in priority order.
#[must_use]
pub fn resolve_sku(record: &Value, config: &SyncConfiguration) -> Option<String> {
    config
        .field_mapping
        .source_for(TargetField::Sku)
        .into_iter()
        .chain(SKU_CANDIDATES.iter().copied())
        .find_map(|field| lookup(record, field).and_then(scalar_text))
}

// ---------------------------------------------------------------------------
// Field formatting
// ---------------------------------------------------------------------------

fn format_decimal(value: &Value) -> Option<String> {
    let text = scalar_text(value)?;
    Decimal::from_str(text.trim_start_matches('$'))
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
        .map(|d| d.to_string())
}

fn format_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .and_then(|f| Decimal::try_from(f).ok())
                .filter(|d| d.fract().is_zero())
                .and_then(|d| i64::try_from(d).ok())
        }),
        Value::String(s) => {
            let t = s.trim();
            t.parse::<i64>().ok().or_else(|| {
                Decimal::from_str(t)
                    .ok()
                    .filter(|d| d.fract().is_zero())
                    .and_then(|d| i64::try_from(d).ok())
            })
        }
        _ => None,
    }
}

fn format_tags(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        other => scalar_text(other)
            .map(|s| s.split(',').map(str::to_owned).collect())
            .unwrap_or_default(),
    };
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|t| t.trim().to_owned())
        .filter(|t| !is_blank_marker(t) && seen.insert(t.to_lowercase()))
        .collect()
}

fn format_status(value: &Value) -> Option<String> {
    let upper = scalar_text(value)?.to_uppercase();
    matches!(upper.as_str(), "ACTIVE" | "DRAFT" | "ARCHIVED").then_some(upper)
}

fn format_inventory_policy(value: &Value) -> Option<String> {
    let upper = scalar_text(value)?.to_uppercase();
    matches!(upper.as_str(), "DENY" | "CONTINUE").then_some(upper)
}

fn format_weight_unit(value: &Value) -> Option<String> {
    let unit = match scalar_text(value)?.to_lowercase().as_str() {
        "g" | "gram" | "grams" => "GRAMS",
        "kg" | "kilogram" | "kilograms" => "KILOGRAMS",
        "oz" | "ounce" | "ounces" => "OUNCES",
        "lb" | "lbs" | "pound" | "pounds" => "POUNDS",
        _ => return None,
    };
    Some(unit.to_owned())
}

fn format_boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().and_then(|i| match i {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Elements of a list-typed source: a JSON array, a string holding a JSON
/// array, a comma-delimited string, or a lone scalar.
fn list_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => {
            let t = s.trim();
            if t.starts_with('[') {
                if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(t) {
                    return items;
                }
            }
            t.split(',').map(|p| Value::String(p.trim().to_owned())).collect()
        }
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

fn format_scalar(value: &Value, base: &AttributeBaseType) -> Option<String> {
    match base {
        AttributeBaseType::SingleLineText => {
            scalar_text(value).map(|t| truncate_chars(&t, SINGLE_LINE_MAX_CHARS))
        }
        AttributeBaseType::Integer => format_integer(value).map(|i| i.to_string()),
        AttributeBaseType::Decimal => format_decimal(value),
        AttributeBaseType::Boolean => format_boolean(value).map(|b| b.to_string()),
        AttributeBaseType::Json => match value {
            Value::Object(_) | Value::Array(_) => Some(value.to_string()),
            Value::String(s) => {
                let t = s.trim();
                if t.starts_with('{') || t.starts_with('[') {
                    serde_json::from_str::<Value>(t).ok().map(|v| v.to_string())
                } else if is_blank_marker(t) {
                    None
                } else {
                    Some(Value::String(t.to_owned()).to_string())
                }
            }
            Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
            Value::Null => None,
        },
        AttributeBaseType::MultiLineText
        | AttributeBaseType::Url
        | AttributeBaseType::Date
        | AttributeBaseType::DateTime
        | AttributeBaseType::Other(_) => scalar_text(value),
    }
}

/// Formats a feed value for an attribute of type `attr_type`.
///
/// Lists become a JSON array: numbers for numeric lists, strings otherwise.
/// Returns `None` when nothing usable remains.
#[must_use]
pub fn format_attribute_value(value: &Value, attr_type: &AttributeType) -> Option<String> {
    let formatted = if attr_type.list {
        let items: Vec<Value> = list_items(value)
            .iter()
            .filter_map(|item| {
                let text = format_scalar(item, &attr_type.base)?;
                Some(match attr_type.base {
                    AttributeBaseType::Integer | AttributeBaseType::Decimal => {
                        serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
                    }
                    _ => Value::String(text),
                })
            })
            .collect();
        if items.is_empty() {
            return None;
        }
        Value::Array(items).to_string()
    } else {
        format_scalar(value, &attr_type.base)?
    };
    (!is_blank_marker(&formatted)).then_some(formatted)
}

/// Lower-cases and replaces every character outside `[a-z0-9_]` with `_`.
#[must_use]
pub fn slugify_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn map_attributes(record: &Value, rules: &[CustomAttributeMapping]) -> Vec<CustomAttribute> {
    let mut out: Vec<CustomAttribute> = Vec::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut push = |attr: CustomAttribute, out: &mut Vec<CustomAttribute>| {
        if seen.insert((attr.namespace.clone(), attr.key.clone())) {
            out.push(attr);
        }
    };

    for rule in rules {
        let namespace = rule.effective_namespace().to_owned();
        let Some(source) = lookup(record, &rule.source_key) else {
            continue;
        };
        match rule.mapping_kind {
            MappingKind::Single => {
                let key = rule.key.trim();
                if key.chars().count() < MIN_ATTRIBUTE_KEY_LEN {
                    continue;
                }
                if let Some(value) = format_attribute_value(source, &rule.attr_type) {
                    push(
                        CustomAttribute {
                            namespace,
                            key: key.to_owned(),
                            attr_type: rule.attr_type.to_string(),
                            value,
                        },
                        &mut out,
                    );
                }
            }
            MappingKind::DerivedFromArray => {
                let (Some(key_field), Some(value_field)) = (
                    rule.array_key_source.as_deref(),
                    rule.array_value_source.as_deref(),
                ) else {
                    continue;
                };
                let Value::Array(elements) = source else {
                    continue;
                };
                for element in elements {
                    let Some(key) = lookup(element, key_field)
                        .and_then(scalar_text)
                        .map(|k| slugify_key(&k))
                        .filter(|k| k.chars().count() >= MIN_ATTRIBUTE_KEY_LEN)
                    else {
                        continue;
                    };
                    let Some(value) = lookup(element, value_field)
                        .and_then(|v| format_attribute_value(v, &rule.attr_type))
                    else {
                        continue;
                    };
                    push(
                        CustomAttribute {
                            namespace: namespace.clone(),
                            key,
                            attr_type: rule.attr_type.to_string(),
                            value,
                        },
                        &mut out,
                    );
                }
            }
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Maps one feed record through `config`.
///
/// # Errors
///
/// Returns a [`SkipReason`] when the record is not an object or has no
/// resolvable SKU; such records are excluded from reconciliation.
pub fn map_record(record: &Value, config: &SyncConfiguration) -> Result<MappedEntity, SkipReason> {
    if !record.is_object() {
        return Err(SkipReason::NotAnObject);
    }
    let sku = resolve_sku(record, config).ok_or(SkipReason::MissingSku)?;

    let mut entity = EntityData::default();
    let mut variant = VariantData {
        sku: sku.clone(),
        ..VariantData::default()
    };

    for entry in config.field_mapping.entries() {
        let Some(value) = lookup(record, &entry.source) else {
            continue;
        };
        match entry.target {
            TargetField::Title => entity.title = scalar_text(value),
            TargetField::DescriptionHtml => entity.description_html = scalar_text(value),
            TargetField::Vendor => entity.vendor = scalar_text(value),
            TargetField::ProductType => entity.product_type = scalar_text(value),
            TargetField::Handle => entity.handle = scalar_text(value),
            TargetField::Tags => entity.tags = format_tags(value),
            TargetField::Status => entity.status = format_status(value),
            TargetField::SeoTitle => entity.seo_title = scalar_text(value),
            TargetField::SeoDescription => entity.seo_description = scalar_text(value),
            TargetField::TemplateSuffix => entity.template_suffix = scalar_text(value),
            // Resolved above so the SKU always matches the business key.
            TargetField::Sku => {}
            TargetField::Barcode => variant.barcode = scalar_text(value),
            TargetField::Price => variant.price = format_decimal(value),
            TargetField::CompareAtPrice => variant.compare_at_price = format_decimal(value),
            TargetField::InventoryPolicy => {
                variant.inventory_policy = format_inventory_policy(value);
            }
            TargetField::InventoryQuantity => variant.inventory_quantity = format_integer(value),
            TargetField::Weight => variant.weight = format_decimal(value),
            TargetField::WeightUnit => variant.weight_unit = format_weight_unit(value),
            TargetField::Cost => variant.cost = format_decimal(value),
        }
    }

    entity.attributes = map_attributes(record, &config.custom_attributes);

    Ok(MappedEntity {
        sku,
        entity,
        variant,
        record: record.clone(),
    })
}

// ---------------------------------------------------------------------------
// productSet input
// ---------------------------------------------------------------------------

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<&String>) {
    if let Some(v) = value {
        map.insert(key.to_owned(), Value::String(v.clone()));
    }
}

impl MappedEntity {
    /// Builds a `ProductSetInput`: a product with one default variant.
    ///
    /// Creates (`target == None`) get a placeholder title, `ACTIVE` status,
    /// and a `DENY` inventory policy when the feed omits them; updates only
    /// send what the feed supplied. `location_id` enables an initial
    /// inventory quantity on create.
    #[must_use]
    pub fn product_set_input(
        &self,
        target: Option<UpdateTarget<'_>>,
        location_id: Option<&str>,
    ) -> Value {
        let creating = target.is_none();
        let e = &self.entity;
        let v = &self.variant;

        let mut product = Map::new();
        if let Some(t) = target {
            product.insert("id".to_owned(), json!(t.product_id));
        }
        match (&e.title, creating) {
            (Some(title), _) => {
                product.insert("title".to_owned(), json!(title));
            }
            (None, true) => {
                product.insert("title".to_owned(), json!(UNTITLED_PRODUCT));
            }
            (None, false) => {}
        }
        insert_opt(&mut product, "descriptionHtml", e.description_html.as_ref());
        insert_opt(&mut product, "vendor", e.vendor.as_ref());
        insert_opt(&mut product, "productType", e.product_type.as_ref());
        insert_opt(&mut product, "handle", e.handle.as_ref());
        insert_opt(&mut product, "templateSuffix", e.template_suffix.as_ref());
        if !e.tags.is_empty() {
            product.insert("tags".to_owned(), json!(e.tags));
        }
        match (&e.status, creating) {
            (Some(status), _) => {
                product.insert("status".to_owned(), json!(status));
            }
            (None, true) => {
                product.insert("status".to_owned(), json!("ACTIVE"));
            }
            (None, false) => {}
        }
        if e.seo_title.is_some() || e.seo_description.is_some() {
            let mut seo = Map::new();
            insert_opt(&mut seo, "title", e.seo_title.as_ref());
            insert_opt(&mut seo, "description", e.seo_description.as_ref());
            product.insert("seo".to_owned(), Value::Object(seo));
        }
        if !e.attributes.is_empty() {
            product.insert("metafields".to_owned(), json!(e.attributes));
        }
        product.insert(
            "productOptions".to_owned(),
            json!([{ "name": DEFAULT_OPTION_NAME, "values": [{ "name": DEFAULT_OPTION_VALUE }] }]),
        );

        let mut variant = Map::new();
        if let Some(id) = target.and_then(|t| t.variant_id) {
            variant.insert("id".to_owned(), json!(id));
        }
        variant.insert("sku".to_owned(), json!(v.sku));
        insert_opt(&mut variant, "barcode", v.barcode.as_ref());
        insert_opt(&mut variant, "price", v.price.as_ref());
        insert_opt(&mut variant, "compareAtPrice", v.compare_at_price.as_ref());
        match (&v.inventory_policy, creating) {
            (Some(policy), _) => {
                variant.insert("inventoryPolicy".to_owned(), json!(policy));
            }
            (None, true) => {
                variant.insert("inventoryPolicy".to_owned(), json!("DENY"));
            }
            (None, false) => {}
        }

        let mut item = Map::new();
        item.insert("tracked".to_owned(), json!(true));
        insert_opt(&mut item, "cost", v.cost.as_ref());
        if let Some(weight) = &v.weight {
            item.insert(
                "measurement".to_owned(),
                json!({ "weight": {
                    "value": serde_json::from_str::<Value>(weight).unwrap_or(json!(weight)),
                    "unit": v.weight_unit.as_deref().unwrap_or("KILOGRAMS"),
                }}),
            );
        }
        variant.insert("inventoryItem".to_owned(), Value::Object(item));

        if let (true, Some(quantity), Some(location)) =
            (creating, v.inventory_quantity, location_id)
        {
            variant.insert(
                "inventoryQuantities".to_owned(),
                json!([{ "locationId": location, "name": "available", "quantity": quantity }]),
            );
        }
        variant.insert(
            "optionValues".to_owned(),
            json!([{ "optionName": DEFAULT_OPTION_NAME, "name": DEFAULT_OPTION_VALUE }]),
        );

        product.insert("variants".to_owned(), json!([Value::Object(variant)]));
        Value::Object(product)
    }
}

#[cfg(test)]
#[path = "mapper_test.rs"]
mod tests;
