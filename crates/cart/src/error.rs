//! Error types for the cart engine.
//!
//! The taxonomy follows the reconciliation design: transport failures are
//! retried once then surfaced; authoritative rejects are never retried, and
//! a not-found reject triggers a corrective re-fetch; validation failures
//! never reach the remote store at all.

use thiserror::Error;

/// Errors from the remote cart store or product catalog.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP transport failed (timeout, unreachable, connection reset).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote store rejected the request with a non-success status.
    #[error("remote store rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limited by the remote store.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

impl StoreError {
    /// Whether this failure is a transport fault eligible for the single
    /// relaxed-timeout retry.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_))
    }
}

/// Errors from the local persistent cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache file contents could not be (de)serialized.
    #[error("JSON error: {0}")]
    Serde(#[from] serde_json::Error),
}
