//! Application state shared across handlers.

use std::sync::Arc;

use sea_fennel_cart::{
    CacheError, CartSyncManager, CartWorkflows, HttpCartStore, HttpCatalog, JsonFileCache,
    StoreError,
};

use crate::config::StorefrontConfig;

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to open the local cart cache: {0}")]
    Cache(#[from] CacheError),
    #[error("failed to build the cart store client: {0}")]
    Store(#[from] StoreError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like the cart engine and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    manager: CartSyncManager<HttpCartStore, JsonFileCache>,
    workflows: CartWorkflows<HttpCartStore, JsonFileCache>,
    catalog: HttpCatalog,
}

impl AppState {
    /// Create a new application state, wiring the cart engine to the HTTP
    /// store and the file-backed cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache file cannot be read or the store URL
    /// is invalid.
    pub async fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let store = HttpCartStore::new(&config.cart.store)?;
        let cache = JsonFileCache::open(config.cart.cache_path.clone()).await?;
        let manager = CartSyncManager::new(store, cache, &config.cart);
        let workflows = CartWorkflows::new(manager.clone(), &config.cart);
        let catalog = HttpCatalog::new(&config.cart.store)?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                manager,
                workflows,
                catalog,
            }),
        })
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the cart synchronization manager.
    #[must_use]
    pub fn manager(&self) -> &CartSyncManager<HttpCartStore, JsonFileCache> {
        &self.inner.manager
    }

    /// Get a reference to the cart mutation workflows.
    #[must_use]
    pub fn workflows(&self) -> &CartWorkflows<HttpCartStore, JsonFileCache> {
        &self.inner.workflows
    }

    /// Get a reference to the product catalog client.
    #[must_use]
    pub fn catalog(&self) -> &HttpCatalog {
        &self.inner.catalog
    }
}
