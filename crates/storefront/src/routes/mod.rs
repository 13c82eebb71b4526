//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                    - Health check
//!
//! # Cart
//! GET    /cart                      - Cart page (items, totals, validation report)
//! GET    /cart/count                - Cart count badge (cached counters, background refresh)
//! GET    /cart/sync                 - Force a full sync
//! POST   /cart/items                - Add to cart
//! PUT    /cart/items/{id}/quantity  - Set quantity
//! PUT    /cart/items/{id}/option    - Set a configurable option
//! PUT    /cart/items/{id}/note      - Edit free-text note (debounced write)
//! POST   /cart/items/{id}/note/flush - Flush a pending note write
//! PUT    /cart/items/{id}/attachments - Replace image attachments
//! DELETE /cart/items/{id}           - Remove item
//! DELETE /cart                      - Clear cart (requires confirmation)
//!
//! # Checkout
//! GET    /checkout                  - Checkout gate (refuses while ineligible)
//!
//! # Auth hooks
//! POST   /auth/login                - Record sign-in, switch cart identity
//! POST   /auth/logout               - Record sign-out, back to guest cart
//! POST   /auth/migrate-cart         - Explicit guest-to-user cart migration
//!
//! # Products
//! GET    /products/{id}             - Product snapshot plus option drafts
//! ```

pub mod auth;
pub mod cart;
pub mod products;

use axum::{
    Router,
    routing::{delete, get, post, put},
};

use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).delete(cart::clear))
        .route("/count", get(cart::count))
        .route("/sync", get(cart::sync))
        .route("/items", post(cart::add))
        .route("/items/{id}", delete(cart::remove))
        .route("/items/{id}/quantity", put(cart::set_quantity))
        .route("/items/{id}/option", put(cart::set_option))
        .route("/items/{id}/note", put(cart::set_note))
        .route("/items/{id}/note/flush", post(cart::flush_note))
        .route("/items/{id}/attachments", put(cart::set_attachments))
}

/// Create the auth hook routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/migrate-cart", post(auth::migrate_guest_cart))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart_routes())
        .route("/checkout", get(cart::checkout))
        .nest("/auth", auth_routes())
        .route("/products/{id}", get(products::show))
}
