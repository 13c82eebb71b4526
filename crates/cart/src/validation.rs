//! Option validation engine.
//!
//! Pure functions over line items and their product option schemas. An item
//! is complete iff every required option in its product's schema has a
//! present, non-blank value; whitespace-only values count as blank.
//! Orphaned items (no resolvable product) are excluded from the completeness
//! gate and surfaced separately as requiring removal, since they can never
//! become complete.

use sea_fennel_core::ItemId;
use serde::Serialize;

use crate::types::CartLineItem;

/// Required-but-unfilled options for a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemGaps {
    /// The incomplete item.
    pub item_id: ItemId,
    /// Display names of the missing required options, in schema order.
    pub missing_options: Vec<String>,
}

/// Cart-level aggregation of per-item gaps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckoutReport {
    /// Items with required options still unfilled.
    pub gaps: Vec<ItemGaps>,
    /// Orphaned items; never listed in `gaps`, must be removed before
    /// checkout can proceed.
    pub needs_removal: Vec<ItemId>,
}

impl CheckoutReport {
    /// Whether every item with a resolvable product is complete.
    #[must_use]
    pub fn is_checkout_eligible(&self) -> bool {
        self.gaps.is_empty()
    }
}

/// Display names of required options that are missing or blank.
///
/// Returns an empty list for orphaned items; they are handled by the
/// needs-removal listing instead.
#[must_use]
pub fn missing_required_options(item: &CartLineItem) -> Vec<String> {
    let Some(product) = item.product.as_ref() else {
        return Vec::new();
    };
    product
        .options
        .iter()
        .filter(|option| option.required)
        .filter(|option| {
            item.selected_options
                .get(&option.name)
                .is_none_or(|value| value.trim().is_empty())
        })
        .map(|option| option.display_name().to_string())
        .collect()
}

/// Whether an item can be checked out.
///
/// For items with a resolvable product this is exactly
/// `missing_required_options(item).is_empty()`; orphaned items are never
/// complete.
#[must_use]
pub fn is_complete(item: &CartLineItem) -> bool {
    !item.is_orphaned() && missing_required_options(item).is_empty()
}

/// Aggregate per-item gaps and orphans across the whole cart.
#[must_use]
pub fn checkout_report(items: &[CartLineItem]) -> CheckoutReport {
    let mut report = CheckoutReport::default();
    for item in items {
        if item.is_orphaned() {
            report.needs_removal.push(item.id);
            continue;
        }
        let missing_options = missing_required_options(item);
        if !missing_options.is_empty() {
            report.gaps.push(ItemGaps {
                item_id: item.id,
                missing_options,
            });
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attachments, OptionField, OptionKind, ProductSnapshot};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sea_fennel_core::ProductId;
    use std::collections::BTreeMap;

    fn required_option(name: &str, label: Option<&str>) -> OptionField {
        OptionField {
            name: name.to_string(),
            label: label.map(String::from),
            kind: OptionKind::Select,
            required: true,
            allowed_values: Vec::new(),
            placeholder: None,
        }
    }

    fn item_with_options(id: i64, options: Vec<OptionField>) -> CartLineItem {
        CartLineItem {
            id: ItemId::new(id),
            product_id: ProductId::new(id),
            quantity: 1,
            selected_options: BTreeMap::new(),
            options_pricing: BTreeMap::new(),
            attachments: Attachments::default(),
            product: Some(ProductSnapshot {
                id: ProductId::new(id),
                title: format!("Product {id}"),
                price: Decimal::from(10),
                stock: None,
                options,
            }),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_completeness_matches_missing_options() {
        let mut item = item_with_options(1, vec![required_option("size", Some("Size"))]);
        assert!(!is_complete(&item));
        assert_eq!(missing_required_options(&item), vec!["Size".to_string()]);

        item.selected_options
            .insert("size".to_string(), "M".to_string());
        assert!(is_complete(&item));
        assert!(missing_required_options(&item).is_empty());
    }

    #[test]
    fn test_whitespace_counts_as_blank() {
        let mut item = item_with_options(1, vec![required_option("engraving", None)]);
        item.selected_options
            .insert("engraving".to_string(), "   ".to_string());
        assert_eq!(
            missing_required_options(&item),
            vec!["engraving".to_string()]
        );
        assert!(!is_complete(&item));
    }

    #[test]
    fn test_optional_options_never_gate() {
        let mut option = required_option("gift-note", None);
        option.required = false;
        let item = item_with_options(1, vec![option]);
        assert!(is_complete(&item));
    }

    #[test]
    fn test_clearing_a_required_option_flips_back_to_incomplete() {
        let mut item = item_with_options(1, vec![required_option("size", None)]);
        item.selected_options
            .insert("size".to_string(), "M".to_string());
        assert!(is_complete(&item));

        item.selected_options
            .insert("size".to_string(), String::new());
        assert!(!is_complete(&item));
    }

    #[test]
    fn test_orphans_go_to_needs_removal_not_gaps() {
        let mut orphan = item_with_options(1, vec![required_option("size", None)]);
        orphan.product = None;
        let incomplete = item_with_options(2, vec![required_option("color", None)]);

        let report = checkout_report(&[orphan, incomplete]);
        assert_eq!(report.needs_removal, vec![ItemId::new(1)]);
        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps.first().map(|g| g.item_id), Some(ItemId::new(2)));
        assert!(!report.is_checkout_eligible());
    }

    #[test]
    fn test_empty_cart_is_eligible() {
        assert!(checkout_report(&[]).is_checkout_eligible());
    }
}
