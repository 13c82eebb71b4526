//! Integration test support for the cart engine.
//!
//! Provides an in-memory [`MemoryCartStore`] double with fetch counting,
//! write-failure injection, and fetch delays, plus builders for products,
//! option schemas, and a fully wired engine over [`MemoryCache`].
//!
//! The tests themselves live under `tests/`:
//!
//! - `cart_sync` - counter fan-out, coalesced syncs, identity transitions
//! - `cart_workflows` - optimistic mutations, rollback, debounced notes
//! - `cart_validation` - required-option gating and checkout eligibility

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use secrecy::SecretString;

use sea_fennel_cart::{
    Attachments, CartConfig, CartIdentity, CartLineItem, CartStoreConfig, CartSyncManager,
    CartWorkflows, ItemWrite, MemoryCache, NewItem, OptionField, OptionKind, ProductCatalog,
    ProductSnapshot, RemoteCartStore, StoreError,
};
use sea_fennel_core::{ItemId, ProductId};

// =============================================================================
// MemoryCartStore
// =============================================================================

/// In-memory remote store double.
///
/// Carts are keyed by identity namespace, exactly like the HTTP store's
/// endpoints. Cheaply cloneable via `Arc`; clones observe the same carts.
#[derive(Clone, Default)]
pub struct MemoryCartStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    carts: Mutex<HashMap<String, Vec<CartLineItem>>>,
    products: Mutex<HashMap<ProductId, ProductSnapshot>>,
    next_id: AtomicI64,
    fetch_count: AtomicUsize,
    fail_writes: AtomicBool,
    fail_fetches: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product so added items resolve a snapshot.
    pub fn register_product(&self, product: ProductSnapshot) {
        self.inner
            .products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product.id, product);
    }

    /// Delete a product; items referencing it become orphaned on the next
    /// fetch.
    pub fn delete_product(&self, id: ProductId) {
        self.inner
            .products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        let mut carts = self
            .inner
            .carts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for items in carts.values_mut() {
            for item in items.iter_mut().filter(|item| item.product_id == id) {
                item.product = None;
            }
        }
    }

    /// Place items directly into an identity's cart.
    pub fn seed_cart(&self, identity: CartIdentity, items: Vec<CartLineItem>) {
        self.inner
            .carts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(identity.namespace(), items);
    }

    /// Current stored items for an identity.
    #[must_use]
    pub fn stored_items(&self, identity: CartIdentity) -> Vec<CartLineItem> {
        self.inner
            .carts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&identity.namespace())
            .cloned()
            .unwrap_or_default()
    }

    /// How many fetches have been issued so far.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.fetch_count.load(Ordering::SeqCst)
    }

    /// Make every write fail with a 503 rejection.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every fetch fail with a 503 rejection.
    pub fn set_fail_fetches(&self, fail: bool) {
        self.inner.fail_fetches.store(fail, Ordering::SeqCst);
    }

    /// Hold each fetch for a duration before answering.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self
            .inner
            .fetch_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                status: 503,
                message: "injected write failure".to_string(),
            });
        }
        Ok(())
    }

    fn with_cart<T>(
        &self,
        identity: CartIdentity,
        f: impl FnOnce(&mut Vec<CartLineItem>) -> T,
    ) -> T {
        let mut carts = self
            .inner
            .carts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(carts.entry(identity.namespace()).or_default())
    }
}

impl RemoteCartStore for MemoryCartStore {
    async fn fetch_cart(&self, identity: CartIdentity) -> Result<Vec<CartLineItem>, StoreError> {
        let delay = *self
            .inner
            .fetch_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.inner.fail_fetches.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected {
                status: 503,
                message: "injected fetch failure".to_string(),
            });
        }
        Ok(self.stored_items(identity))
    }

    async fn add_item(
        &self,
        identity: CartIdentity,
        item: NewItem,
    ) -> Result<CartLineItem, StoreError> {
        self.check_writes()?;
        let product = self
            .inner
            .products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item.product_id)
            .cloned();
        let line = CartLineItem {
            id: ItemId::new(self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1),
            product_id: item.product_id,
            quantity: item.quantity.max(1),
            selected_options: item.selected_options,
            options_pricing: item.options_pricing,
            attachments: item.attachments,
            product,
            updated_at: Utc::now(),
        };
        self.with_cart(identity, |items| items.push(line.clone()));
        Ok(line)
    }

    async fn update_item(
        &self,
        identity: CartIdentity,
        id: ItemId,
        write: ItemWrite,
    ) -> Result<(), StoreError> {
        self.check_writes()?;
        self.with_cart(identity, |items| {
            let Some(item) = items.iter_mut().find(|item| item.id == id) else {
                return Err(StoreError::NotFound(format!("item {id}")));
            };
            item.quantity = write.quantity;
            if let Some(details) = write.details {
                item.selected_options = details.selected_options;
                item.options_pricing = details.options_pricing;
                item.attachments = details.attachments;
            }
            item.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn remove_item(&self, identity: CartIdentity, id: ItemId) -> Result<(), StoreError> {
        self.check_writes()?;
        self.with_cart(identity, |items| {
            let before = items.len();
            items.retain(|item| item.id != id);
            if items.len() == before {
                return Err(StoreError::NotFound(format!("item {id}")));
            }
            Ok(())
        })
    }

    async fn clear_cart(&self, identity: CartIdentity) -> Result<(), StoreError> {
        self.check_writes()?;
        self.with_cart(identity, Vec::clear);
        Ok(())
    }
}

impl ProductCatalog for MemoryCartStore {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, StoreError> {
        Ok(self
            .inner
            .products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

// =============================================================================
// Builders
// =============================================================================

/// A cart config with short delays suitable for paused-clock tests.
#[must_use]
pub fn test_cart_config() -> CartConfig {
    CartConfig {
        store: CartStoreConfig {
            base_url: "http://127.0.0.1:9/api".parse().expect("url"),
            access_token: SecretString::from("integration-test-token"),
            request_timeout: Duration::from_secs(5),
            relaxed_timeout: Duration::from_secs(15),
            retry_delay: Duration::from_millis(250),
        },
        cache_path: "unused-cart-cache.json".into(),
        note_debounce: Duration::from_millis(1000),
        resync_interval: Duration::from_secs(60),
        login_settle_delay: Duration::ZERO,
        add_min_interval: Duration::from_millis(500),
    }
}

/// A manager and workflows wired over an in-memory cache.
#[must_use]
pub fn engine(
    store: MemoryCartStore,
) -> (
    CartSyncManager<MemoryCartStore, MemoryCache>,
    CartWorkflows<MemoryCartStore, MemoryCache>,
) {
    let config = test_cart_config();
    let manager = CartSyncManager::new(store, MemoryCache::new(), &config);
    let workflows = CartWorkflows::new(manager.clone(), &config);
    (manager, workflows)
}

/// A product without configurable options.
#[must_use]
pub fn product(id: i64, price: Decimal) -> ProductSnapshot {
    ProductSnapshot {
        id: ProductId::new(id),
        title: format!("Product {id}"),
        price,
        stock: None,
        options: Vec::new(),
    }
}

/// A product carrying an option schema.
#[must_use]
pub fn product_with_options(id: i64, price: Decimal, options: Vec<OptionField>) -> ProductSnapshot {
    ProductSnapshot {
        options,
        ..product(id, price)
    }
}

/// A required free-text option.
#[must_use]
pub fn required_option(name: &str) -> OptionField {
    OptionField {
        name: name.to_string(),
        label: None,
        kind: OptionKind::Text,
        required: true,
        allowed_values: Vec::new(),
        placeholder: None,
    }
}

/// An optional free-text option.
#[must_use]
pub fn optional_option(name: &str) -> OptionField {
    OptionField {
        required: false,
        ..required_option(name)
    }
}

/// A line item referencing a product snapshot (or orphaned when `None`).
#[must_use]
pub fn line_item(id: i64, product: Option<ProductSnapshot>, quantity: u32) -> CartLineItem {
    CartLineItem {
        id: ItemId::new(id),
        product_id: product
            .as_ref()
            .map_or_else(|| ProductId::new(id), |p| p.id),
        quantity,
        selected_options: BTreeMap::new(),
        options_pricing: BTreeMap::new(),
        attachments: Attachments::default(),
        product,
        updated_at: Utc::now(),
    }
}
