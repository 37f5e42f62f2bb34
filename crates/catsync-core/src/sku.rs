//! Business-key helpers shared by the resolver, categorizer, and tracking store.

/// Feed field names tried, in priority order, when a record carries no mapped SKU.
pub const SKU_CANDIDATES: &[&str] = &["sku", "SKU", "variant.sku", "productCode"];

/// Normalized form of a SKU used for every comparison and persisted key.
///
/// Trims surrounding whitespace and lower-cases, so `" AB-1 "` and `"ab-1"`
/// address the same catalog entry.
#[must_use]
pub fn sku_key(sku: &str) -> String {
    sku.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sku_key_trims_and_lowercases() {
        assert_eq!(sku_key("  AbC-001 "), "abc-001");
    }

    #[test]
    fn sku_key_is_idempotent() {
        let once = sku_key("Widget-9");
        assert_eq!(sku_key(&once), once);
    }

    #[test]
    fn candidates_start_with_lowercase_sku() {
        assert_eq!(SKU_CANDIDATES.first(), Some(&"sku"));
    }
}
