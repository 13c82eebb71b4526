//! Cart mutation workflows.
//!
//! Every workflow follows the same three-phase contract:
//!
//! 1. **Optimistic local apply** - mutate the in-memory item list
//!    immediately so every surface reflects the action with zero latency.
//! 2. **Remote write** - send the *full* current state of the affected
//!    fields (the store replaces rather than patches, so option edits
//!    re-send options, pricing, and attachments together).
//! 3. **Reconciliation or rollback** - on success refresh aggregate
//!    counters through the sync manager; on failure either revert the
//!    optimistic change (removal, clear) or keep it and surface a warning
//!    (quantity, options, note - those writes are safe to re-attempt).
//!
//! Workflows never propagate errors as panics or `Err` to surfaces; the
//! outcome enum says what happened.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use sea_fennel_core::{ItemId, ProductId};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::cache::{LocalCache, keys};
use crate::config::CartConfig;
use crate::debounce::Debouncer;
use crate::error::StoreError;
use crate::store::RemoteCartStore;
use crate::sync::CartSyncManager;
use crate::types::{CartLineItem, CartSnapshot, ItemWrite, NewItem};
use crate::validation::{self, CheckoutReport};

/// What a mutation workflow did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Remote write confirmed; counters refreshed.
    Committed,
    /// Remote write failed but the optimistic value was kept locally;
    /// retrying the same mutation is safe.
    AppliedLocally {
        /// User-facing failure description.
        error: String,
    },
    /// Remote write failed and the optimistic change was reverted.
    RolledBack {
        /// User-facing failure description.
        error: String,
    },
    /// The item is not in the cart.
    NoSuchItem,
}

impl MutationOutcome {
    /// Whether the remote store confirmed the mutation.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }
}

/// Errors from the add-to-cart workflow.
#[derive(Debug, Error)]
pub enum AddItemError {
    /// The minimum interval between submissions has not elapsed.
    #[error("add-to-cart submitted too soon after the previous one")]
    TooSoon,
    /// The remote store refused or was unreachable.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Proof that the user confirmed the blocking yes/no prompt before a cart
/// clear. Clearing is irreversible and affects every line item, so the
/// workflow refuses to run without it.
#[derive(Debug)]
pub struct ClearConfirmation(());

impl ClearConfirmation {
    /// Construct after an explicit user confirmation.
    #[must_use]
    pub const fn confirmed() -> Self {
        Self(())
    }
}

/// Mutation workflows over the shared cart state.
///
/// Cheaply cloneable via `Arc`; clones share debouncers and guards.
pub struct CartWorkflows<S, C> {
    inner: Arc<WorkflowsInner<S, C>>,
}

impl<S, C> Clone for CartWorkflows<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct WorkflowsInner<S, C> {
    manager: CartSyncManager<S, C>,
    note_debouncers: Mutex<HashMap<ItemId, Arc<Debouncer>>>,
    note_debounce: Duration,
    add_min_interval: Duration,
    last_add: Mutex<Option<Instant>>,
}

impl<S: RemoteCartStore, C: LocalCache> CartWorkflows<S, C> {
    /// Create workflows over a sync manager.
    pub fn new(manager: CartSyncManager<S, C>, config: &CartConfig) -> Self {
        Self {
            inner: Arc::new(WorkflowsInner {
                manager,
                note_debouncers: Mutex::new(HashMap::new()),
                note_debounce: config.note_debounce,
                add_min_interval: config.add_min_interval,
                last_add: Mutex::new(None),
            }),
        }
    }

    /// The manager these workflows mutate through.
    #[must_use]
    pub fn manager(&self) -> &CartSyncManager<S, C> {
        &self.inner.manager
    }

    /// Validation report over the current item list.
    #[must_use]
    pub fn checkout_report(&self) -> CheckoutReport {
        validation::checkout_report(&self.inner.manager.items())
    }

    // =========================================================================
    // Shared Phases
    // =========================================================================

    /// Recompute counters from the optimistic list and fan out so other
    /// surfaces repaint before the remote write resolves.
    async fn refresh_local_counters(&self) {
        let snapshot = CartSnapshot::compute(&self.inner.manager.items());
        self.inner
            .manager
            .update_cart(snapshot.total_item_count, snapshot.total_value)
            .await;
    }

    /// Phase two and three for non-destructive edits: full-payload write of
    /// the item's current state, reconcile on success. Failed writes keep
    /// the optimistic value (re-attempting is safe), except when the store
    /// says the item no longer exists, in which case a re-fetch drops the
    /// stale item.
    async fn write_current(&self, id: ItemId) -> MutationOutcome {
        let manager = &self.inner.manager;
        let identity = manager.identity();
        let Some(item) = manager.state().item(id) else {
            return MutationOutcome::NoSuchItem;
        };
        let write = ItemWrite::for_identity(identity, &item);
        match manager.store().update_item(identity, id, write).await {
            Ok(()) => {
                manager.sync_with_server().await;
                MutationOutcome::Committed
            }
            Err(e) => {
                warn!(item_id = %id, error = %e, "item write failed; keeping optimistic value");
                if matches!(e, StoreError::NotFound(_)) {
                    manager.sync_with_server().await;
                }
                MutationOutcome::AppliedLocally {
                    error: e.to_string(),
                }
            }
        }
    }

    // =========================================================================
    // Quantity
    // =========================================================================

    /// Set an item's quantity. Floor-clamped at 1 (removal is a distinct
    /// action); the product's stock count is advisory only, the remote
    /// store remains the final authority.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn set_quantity(&self, id: ItemId, quantity: u32) -> MutationOutcome {
        let quantity = quantity.max(1);
        let Some((_, updated)) = self
            .inner
            .manager
            .state()
            .update_item(id, |item| item.quantity = quantity)
        else {
            return MutationOutcome::NoSuchItem;
        };
        if let Some(stock) = updated.product.as_ref().and_then(|p| p.stock) {
            if quantity > stock {
                warn!(item_id = %id, quantity, stock, "quantity exceeds advisory stock count");
            }
        }
        self.refresh_local_counters().await;
        self.write_current(id).await
    }

    // =========================================================================
    // Removal & Clear
    // =========================================================================

    /// Remove an item. On remote failure the optimistic removal is reverted
    /// and exactly one error outcome is returned.
    #[instrument(skip(self), fields(item_id = %id))]
    pub async fn remove_item(&self, id: ItemId) -> MutationOutcome {
        let manager = &self.inner.manager;
        let Some((index, removed)) = manager.state().remove_item(id) else {
            return MutationOutcome::NoSuchItem;
        };
        self.refresh_local_counters().await;

        let identity = manager.identity();
        match manager.store().remove_item(identity, id).await {
            Ok(()) => {
                manager.sync_with_server().await;
                MutationOutcome::Committed
            }
            Err(e) => {
                manager.state().insert_at(index, removed);
                self.refresh_local_counters().await;
                warn!(item_id = %id, error = %e, "item removal failed; restored item");
                MutationOutcome::RolledBack {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Clear the whole cart. Requires explicit confirmation; restores the
    /// full list on remote failure.
    #[instrument(skip(self, _confirmation))]
    pub async fn clear_cart(&self, _confirmation: ClearConfirmation) -> MutationOutcome {
        let manager = &self.inner.manager;
        let previous = manager.state().take_all();
        self.refresh_local_counters().await;

        let identity = manager.identity();
        match manager.store().clear_cart(identity).await {
            Ok(()) => {
                manager.sync_with_server().await;
                MutationOutcome::Committed
            }
            Err(e) => {
                manager.state().replace_all(previous);
                self.refresh_local_counters().await;
                warn!(error = %e, "cart clear failed; restored items");
                MutationOutcome::RolledBack {
                    error: e.to_string(),
                }
            }
        }
    }

    // =========================================================================
    // Option & Attachment Edits
    // =========================================================================

    /// Set a configurable option value (and its surcharge, when the option
    /// carries one). The remote write re-sends all configurable fields
    /// merged with this change; a per-product draft is persisted for
    /// prefill.
    #[instrument(skip(self, value), fields(item_id = %id, option = %name))]
    pub async fn set_option(
        &self,
        id: ItemId,
        name: &str,
        value: String,
        surcharge: Option<Decimal>,
    ) -> MutationOutcome {
        let manager = &self.inner.manager;
        let Some((_, updated)) = manager.state().update_item(id, |item| {
            item.selected_options.insert(name.to_string(), value);
            if let Some(surcharge) = surcharge {
                item.options_pricing.insert(name.to_string(), surcharge);
            }
        }) else {
            return MutationOutcome::NoSuchItem;
        };

        self.save_option_draft(&updated).await;
        // Surcharge edits move the cart value.
        self.refresh_local_counters().await;
        self.write_current(id).await
    }

    /// Replace an item's image attachments.
    #[instrument(skip(self, images), fields(item_id = %id))]
    pub async fn set_attachments(&self, id: ItemId, images: Vec<String>) -> MutationOutcome {
        if self
            .inner
            .manager
            .state()
            .update_item(id, |item| item.attachments.images = images)
            .is_none()
        {
            return MutationOutcome::NoSuchItem;
        }
        self.write_current(id).await
    }

    async fn save_option_draft(&self, item: &CartLineItem) {
        let manager = &self.inner.manager;
        let namespace = manager.identity().namespace();
        let key = keys::option_draft(&namespace, item.product_id);
        match serde_json::to_value(&item.selected_options) {
            Ok(value) => {
                if let Err(e) = manager.cache().put(key, value).await {
                    warn!(error = %e, "failed to persist option draft");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize option draft"),
        }
    }

    /// Draft option selections persisted for a product in the active
    /// namespace, used to pre-fill option selectors on revisit.
    pub async fn option_draft(
        &self,
        product_id: ProductId,
    ) -> Option<std::collections::BTreeMap<String, String>> {
        let manager = &self.inner.manager;
        let namespace = manager.identity().namespace();
        let key = keys::option_draft(&namespace, product_id);
        let value = manager.cache().get(&key).await?;
        serde_json::from_value(value).ok()
    }

    // =========================================================================
    // Free-Text Notes (debounced)
    // =========================================================================

    fn note_debouncer(&self, id: ItemId) -> Arc<Debouncer> {
        let mut debouncers = self
            .inner
            .note_debouncers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            debouncers
                .entry(id)
                .or_insert_with(|| Arc::new(Debouncer::new(self.inner.note_debounce))),
        )
    }

    /// Edit an item's free-text note. The local apply is immediate and
    /// un-debounced; the remote write fires after the inactivity window,
    /// carrying whatever the note says at that moment.
    ///
    /// Returns `false` when the item is not in the cart.
    #[instrument(skip(self, text), fields(item_id = %id))]
    pub fn set_note(&self, id: ItemId, text: String) -> bool {
        if self
            .inner
            .manager
            .state()
            .update_item(id, |item| item.attachments.text = text)
            .is_none()
        {
            return false;
        }
        let workflows = self.clone();
        self.note_debouncer(id).schedule(async move {
            workflows.write_current(id).await;
        });
        true
    }

    /// Write a pending note immediately (surface teardown).
    pub async fn flush_note(&self, id: ItemId) -> MutationOutcome {
        self.note_debouncer(id).cancel();
        self.write_current(id).await
    }

    /// Drop a pending note write without sending it.
    pub fn cancel_pending_note(&self, id: ItemId) -> bool {
        self.note_debouncer(id).cancel()
    }

    // =========================================================================
    // Add To Cart
    // =========================================================================

    /// Add a product to the cart. Guarded by a minimum-interval check
    /// against rapid double submission; guest identities send the reduced
    /// quantity-only payload.
    ///
    /// # Errors
    ///
    /// Returns [`AddItemError::TooSoon`] when submitted within the guard
    /// interval, or the store error when the remote write fails (nothing
    /// was applied locally in that case).
    #[instrument(skip(self, item), fields(product_id = %item.product_id))]
    pub async fn add_item(&self, item: NewItem) -> Result<CartLineItem, AddItemError> {
        {
            let mut last_add = self
                .inner
                .last_add
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            if let Some(previous) = *last_add {
                if now.duration_since(previous) < self.inner.add_min_interval {
                    return Err(AddItemError::TooSoon);
                }
            }
            *last_add = Some(now);
        }

        let manager = &self.inner.manager;
        let identity = manager.identity();
        let item = if identity.is_guest() {
            item.reduced()
        } else {
            item
        };

        let confirmed = manager.store().add_item(identity, item).await?;
        manager.state().push(confirmed.clone());
        self.refresh_local_counters().await;
        manager.sync_with_server().await;
        Ok(confirmed)
    }
}
