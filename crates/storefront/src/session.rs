//! Session middleware configuration.
//!
//! Identity issuance (registration, credentials) lives in an external
//! service; the storefront only keeps the signed-in user ID resident in the
//! session so cart requests can resolve their identity.

use sea_fennel_core::UserId;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "sf_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Session key holding the signed-in user ID.
pub const USER_ID_KEY: &str = "user_id";

/// Create the session layer with an in-memory store.
#[must_use]
pub fn create_session_layer() -> SessionManagerLayer<MemoryStore> {
    let store = MemoryStore::default();

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

/// The signed-in user, `None` for guests.
pub async fn current_user(session: &Session) -> Option<UserId> {
    session
        .get::<i64>(USER_ID_KEY)
        .await
        .ok()
        .flatten()
        .map(UserId::new)
}
