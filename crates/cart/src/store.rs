//! Remote cart store and product catalog clients.
//!
//! The remote store is the authority for cart contents; this module only
//! speaks its JSON endpoints. Both collaborators are traits so the engine
//! can be exercised against in-memory doubles; the HTTP implementations use
//! `reqwest` with a bounded timeout plus a single relaxed-timeout retry on
//! transport failures. Product snapshots are cached with `moka`
//! (5-minute TTL).

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::Method;
use sea_fennel_core::{ItemId, ProductId};
use secrecy::ExposeSecret;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::config::CartStoreConfig;
use crate::error::StoreError;
use crate::types::{CartIdentity, CartLineItem, ItemWrite, NewItem, ProductSnapshot};

const PRODUCT_CACHE_CAPACITY: u64 = 1000;
const PRODUCT_CACHE_TTL: Duration = Duration::from_secs(300); // 5 minutes
const RETRY_JITTER_MS: u64 = 100;
const BODY_SNIPPET_LEN: usize = 200;

// =============================================================================
// Collaborator Traits
// =============================================================================

/// Authoritative per-identity cart storage.
///
/// Methods return `Send` futures so generic callers can spawn work that
/// performs remote writes (debounced note saves, periodic resync).
pub trait RemoteCartStore: Send + Sync + 'static {
    /// Fetch the authoritative line-item list for an identity.
    fn fetch_cart(
        &self,
        identity: CartIdentity,
    ) -> impl Future<Output = Result<Vec<CartLineItem>, StoreError>> + Send;

    /// Add a product; the store assigns the item ID.
    fn add_item(
        &self,
        identity: CartIdentity,
        item: NewItem,
    ) -> impl Future<Output = Result<CartLineItem, StoreError>> + Send;

    /// Replace the stored state of one line item.
    fn update_item(
        &self,
        identity: CartIdentity,
        id: ItemId,
        write: ItemWrite,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove one line item.
    fn remove_item(
        &self,
        identity: CartIdentity,
        id: ItemId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove every line item for an identity.
    fn clear_cart(
        &self,
        identity: CartIdentity,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Read-only product lookups, used for option schemas and prefill.
pub trait ProductCatalog: Send + Sync + 'static {
    /// Fetch a product snapshot. `Ok(None)` means the product no longer
    /// exists; line items referencing it are orphaned.
    fn product(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<ProductSnapshot>, StoreError>> + Send;
}

// =============================================================================
// HttpCartStore
// =============================================================================

/// HTTP client for the remote cart store.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct HttpCartStore {
    inner: Arc<HttpStoreInner>,
}

struct HttpStoreInner {
    /// First-attempt client with the strict timeout.
    client: reqwest::Client,
    /// Retry client with the relaxed timeout.
    relaxed: reqwest::Client,
    base_url: Url,
    access_token: secrecy::SecretString,
    retry_delay: Duration,
}

impl HttpCartStore {
    /// Create a new cart store client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be constructed or the
    /// base URL cannot carry path segments.
    pub fn new(config: &CartStoreConfig) -> Result<Self, StoreError> {
        if config.base_url.cannot_be_a_base() {
            return Err(StoreError::NotFound(format!(
                "cart store URL is not a base URL: {}",
                config.base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let relaxed = reqwest::Client::builder()
            .timeout(config.relaxed_timeout)
            .build()?;
        Ok(Self {
            inner: Arc::new(HttpStoreInner {
                client,
                relaxed,
                base_url: config.base_url.clone(),
                access_token: config.access_token.clone(),
                retry_delay: config.retry_delay,
            }),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.inner.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn dispatch(
        &self,
        client: &reqwest::Client,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let mut request = client
            .request(method, url)
            .bearer_auth(self.inner.access_token.expose_secret())
            .header("X-Request-Id", Uuid::new_v4().to_string());
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    /// Issue a request; on a transport failure, wait a jittered delay and
    /// retry exactly once with the relaxed-timeout client.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, StoreError> {
        match self
            .dispatch(&self.inner.client, method.clone(), url.clone(), body.as_ref())
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => {
                let jitter = {
                    use rand::Rng;
                    rand::rng().random_range(0..=RETRY_JITTER_MS)
                };
                warn!(error = %e, "cart store request failed, retrying once with relaxed timeout");
                tokio::time::sleep(self.inner.retry_delay + Duration::from_millis(jitter)).await;
                self.dispatch(&self.inner.relaxed, method, url, body.as_ref())
                    .await
                    .map_err(StoreError::Http)
            }
        }
    }

    /// Map status codes onto the error taxonomy and hand back the body.
    async fn triage(response: reqwest::Response) -> Result<String, StoreError> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(StoreError::RateLimited(retry_after));
        }

        let url_path = response.url().path().to_string();
        let body = response.text().await?;

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(url_path));
        }

        if !status.is_success() {
            warn!(
                status = %status,
                body = %body.chars().take(BODY_SNIPPET_LEN).collect::<String>(),
                "cart store returned non-success status"
            );
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: body.chars().take(BODY_SNIPPET_LEN).collect(),
            });
        }

        Ok(body)
    }

    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<T, StoreError> {
        let response = self.send(method, url, body).await?;
        let text = Self::triage(response).await?;
        serde_json::from_str(&text).map_err(|e| {
            warn!(
                error = %e,
                body = %text.chars().take(BODY_SNIPPET_LEN).collect::<String>(),
                "failed to parse cart store response"
            );
            StoreError::Parse(e)
        })
    }

    async fn execute_ack(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let response = self.send(method, url, body).await?;
        Self::triage(response).await?;
        Ok(())
    }
}

impl RemoteCartStore for HttpCartStore {
    #[instrument(skip(self), fields(identity = %identity))]
    async fn fetch_cart(&self, identity: CartIdentity) -> Result<Vec<CartLineItem>, StoreError> {
        let url = self.endpoint(&["carts", &identity.namespace()]);
        debug!("fetching cart");
        self.execute_json(Method::GET, url, None).await
    }

    #[instrument(skip(self, item), fields(identity = %identity, product_id = %item.product_id))]
    async fn add_item(
        &self,
        identity: CartIdentity,
        item: NewItem,
    ) -> Result<CartLineItem, StoreError> {
        let url = self.endpoint(&["carts", &identity.namespace(), "items"]);
        let body = serde_json::to_value(&item)?;
        self.execute_json(Method::POST, url, Some(body)).await
    }

    #[instrument(skip(self, write), fields(identity = %identity, item_id = %id))]
    async fn update_item(
        &self,
        identity: CartIdentity,
        id: ItemId,
        write: ItemWrite,
    ) -> Result<(), StoreError> {
        let url = self.endpoint(&["carts", &identity.namespace(), "items", &id.to_string()]);
        let body = serde_json::to_value(&write)?;
        self.execute_ack(Method::PUT, url, Some(body)).await
    }

    #[instrument(skip(self), fields(identity = %identity, item_id = %id))]
    async fn remove_item(&self, identity: CartIdentity, id: ItemId) -> Result<(), StoreError> {
        let url = self.endpoint(&["carts", &identity.namespace(), "items", &id.to_string()]);
        self.execute_ack(Method::DELETE, url, None).await
    }

    #[instrument(skip(self), fields(identity = %identity))]
    async fn clear_cart(&self, identity: CartIdentity) -> Result<(), StoreError> {
        let url = self.endpoint(&["carts", &identity.namespace()]);
        self.execute_ack(Method::DELETE, url, None).await
    }
}

// =============================================================================
// HttpCatalog
// =============================================================================

/// HTTP client for the product/category collaborator, with snapshot caching.
#[derive(Clone)]
pub struct HttpCatalog {
    inner: Arc<HttpCatalogInner>,
}

struct HttpCatalogInner {
    store: HttpCartStore,
    cache: Cache<ProductId, ProductSnapshot>,
}

impl HttpCatalog {
    /// Create a new catalog client sharing the cart store's connection
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &CartStoreConfig) -> Result<Self, StoreError> {
        let cache = Cache::builder()
            .max_capacity(PRODUCT_CACHE_CAPACITY)
            .time_to_live(PRODUCT_CACHE_TTL)
            .build();
        Ok(Self {
            inner: Arc::new(HttpCatalogInner {
                store: HttpCartStore::new(config)?,
                cache,
            }),
        })
    }
}

impl ProductCatalog for HttpCatalog {
    #[instrument(skip(self), fields(product_id = %id))]
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>, StoreError> {
        if let Some(snapshot) = self.inner.cache.get(&id).await {
            debug!("cache hit for product");
            return Ok(Some(snapshot));
        }

        let url = self
            .inner
            .store
            .endpoint(&["products", &id.to_string()]);
        let result: Result<ProductSnapshot, StoreError> =
            self.inner.store.execute_json(Method::GET, url, None).await;
        match result {
            Ok(snapshot) => {
                self.inner.cache.insert(id, snapshot.clone()).await;
                Ok(Some(snapshot))
            }
            // Deleted products are a valid state, not an error: items
            // referencing them become orphaned.
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn config(base: &str) -> CartStoreConfig {
        CartStoreConfig {
            base_url: base.parse().expect("url"),
            access_token: SecretString::from("test-token".to_string()),
            request_timeout: Duration::from_secs(5),
            relaxed_timeout: Duration::from_secs(15),
            retry_delay: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let store = HttpCartStore::new(&config("https://store.example/api/")).expect("client");
        assert_eq!(
            store.endpoint(&["carts", "guest"]).as_str(),
            "https://store.example/api/carts/guest"
        );
        assert_eq!(
            store.endpoint(&["carts", "user:7", "items", "3"]).as_str(),
            "https://store.example/api/carts/user:7/items/3"
        );
    }

    #[test]
    fn test_endpoint_without_trailing_slash() {
        let store = HttpCartStore::new(&config("https://store.example/api")).expect("client");
        assert_eq!(
            store.endpoint(&["products", "9"]).as_str(),
            "https://store.example/api/products/9"
        );
    }
}
