//! Domain types for the cart engine.
//!
//! These types provide a clean, ergonomic API separate from the raw wire
//! payloads exchanged with the remote cart store.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_fennel_core::{ItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

// =============================================================================
// Identity
// =============================================================================

/// The key under which a cart is addressed: a single shared anonymous cart,
/// or a per-user cart.
///
/// Identity switches exactly once per sign-in/sign-out transition; a switch
/// forces a full resynchronization, never an incremental merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum CartIdentity {
    /// Shared anonymous cart.
    Guest,
    /// Cart of an authenticated user.
    User(UserId),
}

impl CartIdentity {
    /// Namespace key used for remote addressing and local cache partitioning.
    #[must_use]
    pub fn namespace(&self) -> String {
        match self {
            Self::Guest => "guest".to_string(),
            Self::User(id) => format!("user:{id}"),
        }
    }

    /// Whether this is the anonymous identity.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }
}

impl std::fmt::Display for CartIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.namespace())
    }
}

// =============================================================================
// Product Option Schema
// =============================================================================

/// Control type of a configurable product option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionKind {
    /// Dropdown selection from `allowed_values`.
    Select,
    /// Free-form text.
    Text,
    /// Numeric input.
    Number,
    /// Radio group over `allowed_values`.
    Radio,
}

/// A configurable option defined on a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionField {
    /// Option key (e.g., "engraving").
    pub name: String,
    /// Display label shown to shoppers; falls back to `name`.
    pub label: Option<String>,
    /// Control type.
    pub kind: OptionKind,
    /// Whether checkout is blocked while this option is unfilled.
    pub required: bool,
    /// Permitted values for select/radio options.
    #[serde(default)]
    pub allowed_values: Vec<String>,
    /// Placeholder text for text/number inputs.
    pub placeholder: Option<String>,
}

impl OptionField {
    /// Name shown in validation messages and option controls.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

/// Read-only product data attached to a cart line.
///
/// Absent from a [`CartLineItem`] when the backing product was deleted
/// server-side after being added to the cart (the orphaned state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    /// Product ID.
    pub id: ProductId,
    /// Product title.
    pub title: String,
    /// Base unit price.
    pub price: Decimal,
    /// Advisory stock count; the remote store is the final authority.
    pub stock: Option<u32>,
    /// Ordered configurable-option schema.
    #[serde(default)]
    pub options: Vec<OptionField>,
}

// =============================================================================
// Cart Line Items
// =============================================================================

/// Per-item attachments: uploaded image references plus a free-text note.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachments {
    /// Image references (resolution is an external concern).
    #[serde(default)]
    pub images: Vec<String>,
    /// Free-text note.
    #[serde(default)]
    pub text: String,
}

/// A line item in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    /// Server-assigned line item ID.
    pub id: ItemId,
    /// Referenced product.
    pub product_id: ProductId,
    /// Quantity, always at least 1.
    pub quantity: u32,
    /// Chosen values for configurable options, keyed by option name.
    #[serde(default)]
    pub selected_options: BTreeMap<String, String>,
    /// Per-option price surcharges, keyed by option name (non-negative).
    #[serde(default)]
    pub options_pricing: BTreeMap<String, Decimal>,
    /// Image/note attachments.
    #[serde(default)]
    pub attachments: Attachments,
    /// Product snapshot; `None` when the product was deleted server-side.
    pub product: Option<ProductSnapshot>,
    /// Last server-confirmed modification time.
    pub updated_at: DateTime<Utc>,
}

impl CartLineItem {
    /// Whether the referenced product no longer resolves.
    ///
    /// Orphaned items are displayable but excluded from totals and the
    /// checkout gate; they can only be removed.
    #[must_use]
    pub const fn is_orphaned(&self) -> bool {
        self.product.is_none()
    }

    /// Unit price including option surcharges, `None` when orphaned.
    #[must_use]
    pub fn unit_price(&self) -> Option<Decimal> {
        let product = self.product.as_ref()?;
        let surcharges: Decimal = self.options_pricing.values().copied().sum();
        Some(product.price + surcharges)
    }

    /// Line total (`unit_price * quantity`), `None` when orphaned.
    #[must_use]
    pub fn line_total(&self) -> Option<Decimal> {
        Some(self.unit_price()? * Decimal::from(self.quantity))
    }
}

// =============================================================================
// Derived Snapshot & Persisted Counters
// =============================================================================

/// Derived cart aggregate, never stored.
///
/// Computed only over items whose product still resolves; orphaned items
/// contribute to neither field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Sum of quantities.
    pub total_item_count: u64,
    /// Sum of line totals.
    pub total_value: Decimal,
}

impl CartSnapshot {
    /// Compute the aggregate over a line-item list.
    #[must_use]
    pub fn compute(items: &[CartLineItem]) -> Self {
        let mut total_item_count = 0_u64;
        let mut total_value = Decimal::ZERO;
        for item in items {
            if let Some(line_total) = item.line_total() {
                total_item_count += u64::from(item.quantity);
                total_value += line_total;
            }
        }
        Self {
            total_item_count,
            total_value,
        }
    }
}

/// Best-known cart counters, persisted per identity namespace.
///
/// Refreshed eagerly on every mutation and periodically resynced from the
/// remote store; never diverges from the last fetched snapshot by more than
/// one unacknowledged mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    /// Last known total item count.
    pub last_cart_count: u64,
    /// Last known total cart value.
    pub last_cart_value: Decimal,
}

impl SyncCounters {
    /// Counters matching a derived snapshot.
    #[must_use]
    pub const fn from_snapshot(snapshot: CartSnapshot) -> Self {
        Self {
            last_cart_count: snapshot.total_item_count,
            last_cart_value: snapshot.total_value,
        }
    }
}

// =============================================================================
// Write Payloads
// =============================================================================

/// Configurable-field portion of an item write.
///
/// The remote store replaces rather than patches, so every write re-sends
/// all three maps together, merged with the just-changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemWriteDetails {
    /// Full selected-options map.
    pub selected_options: BTreeMap<String, String>,
    /// Full option-surcharge map.
    pub options_pricing: BTreeMap<String, Decimal>,
    /// Full attachments.
    pub attachments: Attachments,
}

/// Full-state write payload for a cart line.
///
/// Guest carts do not support per-item configurable options server-side, so
/// guest writes carry only the quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemWrite {
    /// New quantity.
    pub quantity: u32,
    /// Configurable fields; omitted for guest identities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ItemWriteDetails>,
}

impl ItemWrite {
    /// Build the write payload appropriate for an identity.
    #[must_use]
    pub fn for_identity(identity: CartIdentity, item: &CartLineItem) -> Self {
        let details = if identity.is_guest() {
            None
        } else {
            Some(ItemWriteDetails {
                selected_options: item.selected_options.clone(),
                options_pricing: item.options_pricing.clone(),
                attachments: item.attachments.clone(),
            })
        };
        Self {
            quantity: item.quantity,
            details,
        }
    }
}

/// Payload for adding a product to the cart; the store assigns the item ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    /// Product to add.
    pub product_id: ProductId,
    /// Initial quantity, at least 1.
    pub quantity: u32,
    /// Initial option selections (ignored for guest carts).
    #[serde(default)]
    pub selected_options: BTreeMap<String, String>,
    /// Initial option surcharges (ignored for guest carts).
    #[serde(default)]
    pub options_pricing: BTreeMap<String, Decimal>,
    /// Initial attachments (ignored for guest carts).
    #[serde(default)]
    pub attachments: Attachments,
}

impl NewItem {
    /// A plain quantity-only addition.
    #[must_use]
    pub fn of(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity: quantity.max(1),
            selected_options: BTreeMap::new(),
            options_pricing: BTreeMap::new(),
            attachments: Attachments::default(),
        }
    }

    /// Strip fields the guest cart endpoint does not accept.
    #[must_use]
    pub fn reduced(mut self) -> Self {
        self.selected_options.clear();
        self.options_pricing.clear();
        self.attachments = Attachments::default();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: i64, price: Decimal) -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId::new(id),
            title: format!("Product {id}"),
            price,
            stock: None,
            options: Vec::new(),
        }
    }

    fn item(id: i64, price: Decimal, quantity: u32) -> CartLineItem {
        CartLineItem {
            id: ItemId::new(id),
            product_id: ProductId::new(id),
            quantity,
            selected_options: BTreeMap::new(),
            options_pricing: BTreeMap::new(),
            attachments: Attachments::default(),
            product: Some(snapshot(id, price)),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_namespace_keys() {
        assert_eq!(CartIdentity::Guest.namespace(), "guest");
        assert_eq!(
            CartIdentity::User(UserId::new(42)).namespace(),
            "user:42"
        );
    }

    #[test]
    fn test_snapshot_includes_option_surcharges() {
        let mut a = item(1, Decimal::from(100), 2);
        a.options_pricing.insert("gift-wrap".to_string(), Decimal::from(5));
        // (100 + 5) * 2
        let snap = CartSnapshot::compute(&[a]);
        assert_eq!(snap.total_item_count, 2);
        assert_eq!(snap.total_value, Decimal::from(210));
    }

    #[test]
    fn test_snapshot_excludes_orphans() {
        let a = item(1, Decimal::from(100), 2);
        let mut b = item(2, Decimal::from(50), 1);
        b.product = None;
        let snap = CartSnapshot::compute(&[a, b]);
        assert_eq!(snap.total_item_count, 2);
        assert_eq!(snap.total_value, Decimal::from(200));
    }

    #[test]
    fn test_incomplete_items_still_count_toward_totals() {
        // Required options gate checkout, not the value computation.
        let a = item(1, Decimal::from(100), 2);
        let mut b = item(2, Decimal::from(50), 1);
        if let Some(product) = b.product.as_mut() {
            product.options.push(OptionField {
                name: "size".to_string(),
                label: None,
                kind: OptionKind::Select,
                required: true,
                allowed_values: vec!["S".to_string(), "M".to_string()],
                placeholder: None,
            });
        }
        let snap = CartSnapshot::compute(&[a, b]);
        assert_eq!(snap.total_value, Decimal::from(250));
        assert_eq!(snap.total_item_count, 3);
    }

    #[test]
    fn test_guest_write_is_quantity_only() {
        let mut it = item(1, Decimal::from(10), 3);
        it.selected_options
            .insert("size".to_string(), "M".to_string());
        let guest = ItemWrite::for_identity(CartIdentity::Guest, &it);
        assert!(guest.details.is_none());
        assert_eq!(guest.quantity, 3);

        let user = ItemWrite::for_identity(CartIdentity::User(UserId::new(1)), &it);
        let details = user.details.expect("full payload for users");
        assert_eq!(details.selected_options.get("size").map(String::as_str), Some("M"));
    }
}
