//! Cart synchronization manager.
//!
//! The single source of truth for "what does the cart currently look like",
//! reachable from any surface without prop-drilling. Explicitly constructed
//! and dependency-injected (held on the application state and cloned into
//! handlers); there is no hidden global instance.
//!
//! The manager reconciles the local persistent cache with the remote cart
//! store, deduplicates redundant counter writes, and drives the notification
//! channel. It never propagates fetch failures to callers: surfaces may call
//! [`CartSyncManager::sync_with_server`] speculatively from any mount.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use rust_decimal::Decimal;
use sea_fennel_core::UserId;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument, warn};

use crate::cache::{LocalCache, keys};
use crate::config::CartConfig;
use crate::error::StoreError;
use crate::events::{CartEvent, EventBus, ListenerHandle};
use crate::state::CartState;
use crate::store::RemoteCartStore;
use crate::types::{CartIdentity, CartLineItem, CartSnapshot, NewItem, SyncCounters};

/// Coordinator for cart counters, identity transitions, and fan-out.
///
/// Cheaply cloneable via `Arc`; one instance per process, constructed at
/// application root.
pub struct CartSyncManager<S, C> {
    inner: Arc<SyncInner<S, C>>,
}

impl<S, C> Clone for CartSyncManager<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct SyncInner<S, C> {
    store: S,
    cache: C,
    state: CartState,
    events: EventBus,
    identity: RwLock<CartIdentity>,
    /// In-flight guard: concurrent syncs coalesce onto one remote fetch.
    sync_gate: tokio::sync::Mutex<()>,
    login_settle_delay: Duration,
}

impl<S: RemoteCartStore, C: LocalCache> CartSyncManager<S, C> {
    /// Create a manager starting on the guest identity.
    pub fn new(store: S, cache: C, config: &CartConfig) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                cache,
                state: CartState::new(),
                events: EventBus::new(),
                identity: RwLock::new(CartIdentity::Guest),
                sync_gate: tokio::sync::Mutex::new(()),
                login_settle_delay: config.login_settle_delay,
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The currently active identity.
    pub fn identity(&self) -> CartIdentity {
        *self
            .inner
            .identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the in-memory item list.
    #[must_use]
    pub fn items(&self) -> Vec<CartLineItem> {
        self.inner.state.items()
    }

    /// Best-known counters as currently shown on the badge.
    #[must_use]
    pub fn counters(&self) -> SyncCounters {
        self.inner.events.current()
    }

    pub(crate) fn state(&self) -> &CartState {
        &self.inner.state
    }

    pub(crate) fn store(&self) -> &S {
        &self.inner.store
    }

    pub(crate) fn cache(&self) -> &C {
        &self.inner.cache
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe to typed cart events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.inner.events.subscribe()
    }

    /// Smallest-grain counter signal for badge surfaces.
    #[must_use]
    pub fn badge(&self) -> watch::Receiver<SyncCounters> {
        self.inner.events.badge()
    }

    /// Register a callback invoked on every successful counter change.
    ///
    /// The returned handle de-registers the listener; a panicking listener
    /// is isolated and logged, never propagated.
    pub fn add_update_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(SyncCounters) + Send + Sync + 'static,
    {
        self.inner.events.add_listener(Arc::new(listener))
    }

    // =========================================================================
    // Counters
    // =========================================================================

    /// Counters persisted for the active identity, read straight from the
    /// local cache (fast first paint at mount time).
    pub async fn cached_counters(&self) -> SyncCounters {
        let key = keys::counters(&self.identity().namespace());
        match self.inner.cache.get(&key).await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => SyncCounters::default(),
        }
    }

    /// Push cached counters onto the badge without a remote fetch.
    pub async fn hydrate(&self) {
        let cached = self.cached_counters().await;
        self.apply_counters(cached).await;
    }

    /// Record new counters. Idempotent: repeated identical calls produce
    /// zero observable effects beyond the first. Returns whether anything
    /// changed.
    pub async fn update_cart(&self, count: u64, value: Decimal) -> bool {
        self.apply_counters(SyncCounters {
            last_cart_count: count,
            last_cart_value: value,
        })
        .await
    }

    async fn apply_counters(&self, next: SyncCounters) -> bool {
        if next == self.counters() {
            return false;
        }
        let key = keys::counters(&self.identity().namespace());
        match serde_json::to_value(next) {
            Ok(value) => {
                if let Err(e) = self.inner.cache.put(key, value).await {
                    // Persisting is best-effort; the in-memory value and the
                    // fan-out still happen.
                    warn!(error = %e, "failed to persist cart counters");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize cart counters"),
        }
        self.inner.events.emit_updated(next);
        true
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Fetch the authoritative cart, reconcile local state, refresh
    /// counters.
    ///
    /// Concurrent calls coalesce: a call arriving while a sync is in flight
    /// never issues a duplicate fetch; it waits for the in-flight sync and
    /// returns its resolved counters. Fetch failures are logged and the last
    /// known counters returned, so this is safe to call speculatively.
    #[instrument(skip(self))]
    pub async fn sync_with_server(&self) -> SyncCounters {
        let Ok(_guard) = self.inner.sync_gate.try_lock() else {
            // Coalesce onto the in-flight sync.
            drop(self.inner.sync_gate.lock().await);
            return self.counters();
        };

        let identity = self.identity();
        let at_fetch = self.inner.state.seq_table();
        match self.inner.store.fetch_cart(identity).await {
            Ok(items) => {
                self.inner.state.reconcile(items, &at_fetch);
                let snapshot = CartSnapshot::compute(&self.inner.state.items());
                self.apply_counters(SyncCounters::from_snapshot(snapshot))
                    .await;
                self.counters()
            }
            Err(e) => {
                warn!(error = %e, "cart sync failed; returning last known counters");
                self.counters()
            }
        }
    }

    /// Keep counters fresh in the background. Runs one sync immediately,
    /// then one per interval. Spawned by the binary.
    pub async fn run_periodic_resync(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sync_with_server().await;
        }
    }

    // =========================================================================
    // Identity Transitions
    // =========================================================================

    /// Swap identity: drop the old identity's in-memory items, announce the
    /// transition, and pre-seed the badge from the new namespace's cache so
    /// no residual counts from the previous identity are ever rendered.
    async fn transition_identity(&self, next: CartIdentity) {
        {
            let mut identity = self
                .inner
                .identity
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            *identity = next;
        }
        self.inner.state.take_all();
        self.inner.events.emit_identity_changed(next);
        self.hydrate().await;
    }

    /// Handle a sign-in: wait briefly for identity propagation, switch to
    /// the user's cart, and force a full sync.
    ///
    /// Guest and user carts are never merged here; see
    /// [`CartSyncManager::migrate_guest_items`].
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn sync_after_login(&self, user_id: UserId) -> SyncCounters {
        tokio::time::sleep(self.inner.login_settle_delay).await;
        self.transition_identity(CartIdentity::User(user_id)).await;
        self.sync_with_server().await
    }

    /// Handle a sign-out: clear the signed-in namespace's cache entries and
    /// re-sync to the guest cart.
    #[instrument(skip(self))]
    pub async fn sync_after_logout(&self) -> SyncCounters {
        let previous = self.identity();
        if !previous.is_guest() {
            let namespace = previous.namespace();
            if let Err(e) = self.inner.cache.remove(&keys::counters(&namespace)).await {
                warn!(error = %e, "failed to drop cached counters on logout");
            }
            if let Err(e) = self
                .inner
                .cache
                .remove_prefix(&keys::draft_prefix(&namespace))
                .await
            {
                warn!(error = %e, "failed to drop option drafts on logout");
            }
        }
        self.transition_identity(CartIdentity::Guest).await;
        self.sync_with_server().await
    }

    /// Explicit guest-to-user cart migration (union policy): re-add each
    /// guest line to the user cart with a quantity-only payload, then clear
    /// the guest cart. Never invoked automatically by the login path; the
    /// caller is expected to have confirmed this with the user.
    ///
    /// Returns the number of migrated lines.
    ///
    /// # Errors
    ///
    /// Returns an error if any remote call fails; already-migrated lines are
    /// left in place (re-running the migration is safe).
    #[instrument(skip(self))]
    pub async fn migrate_guest_items(&self) -> Result<usize, StoreError> {
        let identity = self.identity();
        if identity.is_guest() {
            warn!("guest cart migration requires an authenticated identity");
            return Ok(0);
        }

        let guest_items = self.inner.store.fetch_cart(CartIdentity::Guest).await?;
        let mut migrated = 0_usize;
        for item in &guest_items {
            self.inner
                .store
                .add_item(identity, NewItem::of(item.product_id, item.quantity))
                .await?;
            migrated += 1;
        }
        if migrated > 0 {
            self.inner.store.clear_cart(CartIdentity::Guest).await?;
        }
        info!(migrated, "guest cart migrated");
        self.sync_with_server().await;
        Ok(migrated)
    }
}
