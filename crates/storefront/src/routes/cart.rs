//! Cart route handlers.
//!
//! Every mutation goes through the workflow layer: the handler returns as
//! soon as the remote write resolves, and the response reports whether the
//! optimistic value was committed, kept locally, or rolled back. Counter
//! fan-out to other surfaces happens inside the engine, not here.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rust_decimal::Decimal;
use sea_fennel_cart::{
    AddItemError, CartLineItem, CartSnapshot, CheckoutReport, ClearConfirmation, MutationOutcome,
    SyncCounters,
};
use sea_fennel_core::ItemId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::state::AppState;

// =============================================================================
// View Types
// =============================================================================

/// Cart page payload.
#[derive(Serialize)]
pub struct CartView {
    pub items: Vec<CartLineItem>,
    pub snapshot: CartSnapshot,
    pub report: CheckoutReport,
    pub checkout_eligible: bool,
}

/// Mutation response payload.
#[derive(Serialize)]
pub struct OutcomeView {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub counters: SyncCounters,
}

fn outcome_response(state: &AppState, outcome: MutationOutcome) -> Response {
    let counters = state.manager().counters();
    let (status, view) = match outcome {
        MutationOutcome::Committed => (
            StatusCode::OK,
            OutcomeView {
                outcome: "committed",
                error: None,
                counters,
            },
        ),
        MutationOutcome::AppliedLocally { error } => (
            StatusCode::OK,
            OutcomeView {
                outcome: "applied_locally",
                error: Some(error),
                counters,
            },
        ),
        MutationOutcome::RolledBack { error } => (
            StatusCode::BAD_GATEWAY,
            OutcomeView {
                outcome: "rolled_back",
                error: Some(error),
                counters,
            },
        ),
        MutationOutcome::NoSuchItem => (
            StatusCode::NOT_FOUND,
            OutcomeView {
                outcome: "no_such_item",
                error: None,
                counters,
            },
        ),
    };
    (status, Json(view)).into_response()
}

// =============================================================================
// Read Handlers
// =============================================================================

/// Cart page: items, totals, and the validation report.
#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>) -> Json<CartView> {
    state.manager().sync_with_server().await;
    let items = state.manager().items();
    let snapshot = CartSnapshot::compute(&items);
    let report = state.workflows().checkout_report();
    let checkout_eligible = report.is_checkout_eligible();
    Json(CartView {
        items,
        snapshot,
        report,
        checkout_eligible,
    })
}

/// Cart count badge: answers from the last known counters immediately and
/// refreshes in the background, so badge paint never waits on the network.
#[instrument(skip(state))]
pub async fn count(State(state): State<AppState>) -> Json<SyncCounters> {
    let counters = state.manager().counters();
    let manager = state.manager().clone();
    tokio::spawn(async move {
        manager.sync_with_server().await;
    });
    Json(counters)
}

/// Force a full sync and return the resolved counters.
#[instrument(skip(state))]
pub async fn sync(State(state): State<AppState>) -> Json<SyncCounters> {
    Json(state.manager().sync_with_server().await)
}

// =============================================================================
// Mutation Handlers
// =============================================================================

/// Add a product to the cart.
#[instrument(skip(state, item))]
pub async fn add(
    State(state): State<AppState>,
    Json(item): Json<sea_fennel_cart::NewItem>,
) -> Result<Response> {
    match state.workflows().add_item(item).await {
        Ok(item) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "item": item,
                "counters": state.manager().counters(),
            })),
        )
            .into_response()),
        Err(AddItemError::TooSoon) => Err(AppError::RateLimited),
        Err(AddItemError::Store(e)) => Err(AppError::Store(e)),
    }
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

/// Set an item's quantity.
#[instrument(skip(state))]
pub async fn set_quantity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<QuantityRequest>,
) -> Response {
    let outcome = state
        .workflows()
        .set_quantity(ItemId::new(id), request.quantity)
        .await;
    outcome_response(&state, outcome)
}

/// Remove an item.
#[instrument(skip(state))]
pub async fn remove(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let outcome = state.workflows().remove_item(ItemId::new(id)).await;
    outcome_response(&state, outcome)
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    /// Must be `true`; the client is responsible for the blocking prompt.
    pub confirm: bool,
}

/// Clear the whole cart after client-side confirmation.
#[instrument(skip(state, request))]
pub async fn clear(
    State(state): State<AppState>,
    Json(request): Json<ClearRequest>,
) -> Result<Response> {
    if !request.confirm {
        return Err(AppError::BadRequest(
            "cart clear requires confirmation".to_string(),
        ));
    }
    let outcome = state
        .workflows()
        .clear_cart(ClearConfirmation::confirmed())
        .await;
    Ok(outcome_response(&state, outcome))
}

#[derive(Debug, Deserialize)]
pub struct OptionRequest {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub surcharge: Option<Decimal>,
}

/// Set a configurable option value on an item.
#[instrument(skip(state, request))]
pub async fn set_option(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<OptionRequest>,
) -> Response {
    let outcome = state
        .workflows()
        .set_option(
            ItemId::new(id),
            &request.name,
            request.value,
            request.surcharge,
        )
        .await;
    outcome_response(&state, outcome)
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub text: String,
}

/// Edit an item's free-text note (remote write is debounced).
#[instrument(skip(state, request))]
pub async fn set_note(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<NoteRequest>,
) -> Result<StatusCode> {
    if state.workflows().set_note(ItemId::new(id), request.text) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(AppError::NotFound(format!("cart item {id}")))
    }
}

/// Write a pending note immediately.
#[instrument(skip(state))]
pub async fn flush_note(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let outcome = state.workflows().flush_note(ItemId::new(id)).await;
    outcome_response(&state, outcome)
}

#[derive(Debug, Deserialize)]
pub struct AttachmentsRequest {
    pub images: Vec<String>,
}

/// Replace an item's image attachments.
#[instrument(skip(state, request))]
pub async fn set_attachments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<AttachmentsRequest>,
) -> Response {
    let outcome = state
        .workflows()
        .set_attachments(ItemId::new(id), request.images)
        .await;
    outcome_response(&state, outcome)
}

// =============================================================================
// Checkout Gate
// =============================================================================

/// Checkout entry point. Refuses with the validation report while any item
/// has unfilled required options or any orphaned item remains.
#[instrument(skip(state))]
pub async fn checkout(State(state): State<AppState>) -> Response {
    state.manager().sync_with_server().await;
    let report = state.workflows().checkout_report();
    if !report.is_checkout_eligible() || !report.needs_removal.is_empty() {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "error": "cart is not ready for checkout",
                "report": report,
            })),
        )
            .into_response();
    }
    Json(json!({
        "ok": true,
        "snapshot": CartSnapshot::compute(&state.manager().items()),
    }))
    .into_response()
}
