//! Local persistent cache surviving page reloads.
//!
//! Holds the last known cart counters and per-product option drafts, keyed
//! per identity namespace. All surfaces go through the synchronization
//! manager's API rather than hitting the cache directly, except counter
//! reads at mount time for fast first paint.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::CacheError;

/// Cache key layout, namespaced per [`crate::CartIdentity`].
pub mod keys {
    use sea_fennel_core::ProductId;

    /// Persisted [`crate::SyncCounters`] for an identity namespace.
    #[must_use]
    pub fn counters(namespace: &str) -> String {
        format!("counters:{namespace}")
    }

    /// Draft option selections for a product, used to pre-fill option
    /// selectors when a product page is revisited mid-session.
    #[must_use]
    pub fn option_draft(namespace: &str, product_id: ProductId) -> String {
        format!("draft:{namespace}:{product_id}")
    }

    /// Prefix matching every option draft in an identity namespace. The
    /// trailing separator keeps `user:7` from matching `user:70`.
    #[must_use]
    pub fn draft_prefix(namespace: &str) -> String {
        format!("draft:{namespace}:")
    }
}

/// Key-value store surviving process restarts.
///
/// Values are JSON so callers own their own schemas; the cache never
/// interprets what it stores.
pub trait LocalCache: Send + Sync + 'static {
    /// Read a value, `None` when absent.
    fn get(&self, key: &str) -> impl Future<Output = Option<serde_json::Value>> + Send;

    /// Write a value, replacing any previous one.
    fn put(
        &self,
        key: String,
        value: serde_json::Value,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Remove a single key (absent keys are fine).
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// Remove every key starting with `prefix`.
    fn remove_prefix(&self, prefix: &str) -> impl Future<Output = Result<(), CacheError>> + Send;
}

// =============================================================================
// JsonFileCache
// =============================================================================

/// File-backed cache: one JSON object per file, loaded on open and written
/// through on every change.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct JsonFileCache {
    inner: Arc<JsonFileCacheInner>,
}

struct JsonFileCacheInner {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, serde_json::Value>>,
}

impl JsonFileCache {
    /// Open a cache file, creating an empty cache when the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: PathBuf) -> Result<Self, CacheError> {
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            inner: Arc::new(JsonFileCacheInner {
                path,
                entries: RwLock::new(entries),
            }),
        })
    }

    /// Serialize the whole map while still holding the write lock, so
    /// concurrent writers cannot interleave file contents.
    async fn flush(
        &self,
        entries: &BTreeMap<String, serde_json::Value>,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        if let Some(parent) = self.inner.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.inner.path, bytes).await?;
        Ok(())
    }
}

impl LocalCache for JsonFileCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: String, value: serde_json::Value) -> Result<(), CacheError> {
        let mut entries = self.inner.entries.write().await;
        entries.insert(key, value);
        self.flush(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut entries = self.inner.entries.write().await;
        if entries.remove(key).is_some() {
            self.flush(&entries).await?;
        }
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let mut entries = self.inner.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        if entries.len() != before {
            self.flush(&entries).await?;
        }
        Ok(())
    }
}

// =============================================================================
// MemoryCache
// =============================================================================

/// In-memory cache for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<BTreeMap<String, serde_json::Value>>>,
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl LocalCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: String, value: serde_json::Value) -> Result<(), CacheError> {
        self.entries.write().await.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn remove_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}
