//! Authentication hook handlers.
//!
//! Credential verification happens in an external identity service; these
//! handlers only record the verified user in the session and drive the cart
//! engine's identity transitions.

use axum::{Json, extract::State, http::StatusCode};
use sea_fennel_cart::SyncCounters;
use sea_fennel_core::UserId;
use serde::Deserialize;
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::session::{USER_ID_KEY, current_user};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Verified user ID handed back by the identity service.
    pub user_id: i64,
}

/// Record a sign-in and switch the cart to the user's namespace.
#[instrument(skip(state, session, request))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SyncCounters>> {
    session
        .insert(USER_ID_KEY, request.user_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let counters = state
        .manager()
        .sync_after_login(UserId::new(request.user_id))
        .await;
    Ok(Json(counters))
}

/// Record a sign-out and switch the cart back to the guest namespace.
#[instrument(skip(state, session))]
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<Json<SyncCounters>> {
    session
        .remove::<i64>(USER_ID_KEY)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(state.manager().sync_after_logout().await))
}

/// Explicitly migrate guest cart lines into the signed-in user's cart.
/// Requires an authenticated session; never runs as part of login.
#[instrument(skip(state, session))]
pub async fn migrate_guest_cart(
    State(state): State<AppState>,
    session: Session,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    if current_user(&session).await.is_none() {
        return Err(AppError::Unauthorized(
            "guest cart migration requires a signed-in user".to_string(),
        ));
    }

    let migrated = state.manager().migrate_guest_items().await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "migrated": migrated,
            "counters": state.manager().counters(),
        })),
    ))
}
