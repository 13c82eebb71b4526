//! Cart engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CART_STORE_URL` - Base URL of the remote cart store
//! - `CART_STORE_TOKEN` - Access token for the remote cart store
//!
//! ## Optional
//! - `CART_STORE_TIMEOUT_MS` - Request timeout (default: 5000)
//! - `CART_STORE_RELAXED_TIMEOUT_MS` - Timeout for the single retry (default: 15000)
//! - `CART_STORE_RETRY_DELAY_MS` - Base delay before the retry (default: 250)
//! - `CART_CACHE_PATH` - Local persistent cache file (default: cart-cache.json)
//! - `CART_NOTE_DEBOUNCE_MS` - Free-text note debounce window (default: 1000)
//! - `CART_RESYNC_INTERVAL_SECS` - Periodic resync interval (default: 60)
//! - `CART_LOGIN_SETTLE_MS` - Identity propagation wait after login (default: 150)
//! - `CART_ADD_MIN_INTERVAL_MS` - Minimum interval between add-to-cart calls (default: 500)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Remote cart store connection settings.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct CartStoreConfig {
    /// Base URL of the remote cart store.
    pub base_url: Url,
    /// Access token sent as a bearer credential.
    pub access_token: SecretString,
    /// Per-request timeout for the first attempt.
    pub request_timeout: Duration,
    /// Relaxed timeout used for the single retry after a transport failure.
    pub relaxed_timeout: Duration,
    /// Base delay before the retry (a small jitter is added).
    pub retry_delay: Duration,
}

impl std::fmt::Debug for CartStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStoreConfig")
            .field("base_url", &self.base_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .field("relaxed_timeout", &self.relaxed_timeout)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

/// Cart engine configuration.
#[derive(Debug, Clone)]
pub struct CartConfig {
    /// Remote store settings.
    pub store: CartStoreConfig,
    /// Local persistent cache file.
    pub cache_path: PathBuf,
    /// Inactivity window before a note edit is written remotely.
    pub note_debounce: Duration,
    /// Interval between periodic full resyncs.
    pub resync_interval: Duration,
    /// Wait for identity propagation before the post-login sync.
    pub login_settle_delay: Duration,
    /// Minimum interval between add-to-cart submissions.
    pub add_min_interval: Duration,
}

impl CartConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let base_url = get_required_env("CART_STORE_URL")?
            .parse::<Url>()
            .map_err(|e| ConfigError::InvalidEnvVar("CART_STORE_URL".to_string(), e.to_string()))?;
        let access_token = SecretString::from(get_required_env("CART_STORE_TOKEN")?);

        Ok(Self {
            store: CartStoreConfig {
                base_url,
                access_token,
                request_timeout: get_millis("CART_STORE_TIMEOUT_MS", 5000)?,
                relaxed_timeout: get_millis("CART_STORE_RELAXED_TIMEOUT_MS", 15_000)?,
                retry_delay: get_millis("CART_STORE_RETRY_DELAY_MS", 250)?,
            },
            cache_path: PathBuf::from(get_env_or_default("CART_CACHE_PATH", "cart-cache.json")),
            note_debounce: get_millis("CART_NOTE_DEBOUNCE_MS", 1000)?,
            resync_interval: get_secs("CART_RESYNC_INTERVAL_SECS", 60)?,
            login_settle_delay: get_millis("CART_LOGIN_SETTLE_MS", 150)?,
            add_min_interval: get_millis("CART_ADD_MIN_INTERVAL_MS", 500)?,
        })
    }
}

fn get_required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn get_env_or_default(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_millis(name: &str, default: u64) -> Result<Duration, ConfigError> {
    parse_u64(name, default).map(Duration::from_millis)
}

fn get_secs(name: &str, default: u64) -> Result<Duration, ConfigError> {
    parse_u64(name, default).map(Duration::from_secs)
}

fn parse_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
