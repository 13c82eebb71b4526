//! Product route handlers.
//!
//! Serves the option schema a product page renders its selectors from,
//! together with any draft selections persisted for the active identity.

use axum::{
    Json,
    extract::{Path, State},
};
use sea_fennel_cart::ProductCatalog;
use sea_fennel_core::ProductId;
use serde_json::json;
use tracing::instrument;

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Product detail: snapshot plus persisted option drafts for prefill.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>> {
    let product_id = ProductId::new(id);
    let Some(product) = state.catalog().product(product_id).await? else {
        return Err(AppError::NotFound(format!("product {id}")));
    };
    let draft = state.workflows().option_draft(product_id).await;
    Ok(Json(json!({
        "product": product,
        "draft": draft,
    })))
}
