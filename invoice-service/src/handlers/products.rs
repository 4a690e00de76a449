use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{FindProductParams, SearchParams};
use crate::startup::AppState;

const TYPEAHEAD_LIMIT: i64 = 10;

/// Active product by exact name; the form uses this to prefill price
/// and tax rate.
pub async fn find_product(
    State(state): State<AppState>,
    Query(params): Query<FindProductParams>,
) -> Result<impl IntoResponse, AppError> {
    let name = params.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Product name is required"
        )));
    }

    let product = state
        .store
        .get_active_product_by_name(name)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No active product named '{}'", name)))?;
    Ok(Json(product))
}

/// Full product history, active rows first.
pub async fn product_history(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let products = state.store.product_history().await?;
    Ok(Json(products))
}

/// Active-product typeahead: name substring match, first ten by name.
pub async fn product_suggestions(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let search = params.search.unwrap_or_default();
    let products = state
        .store
        .search_products(search.trim(), TYPEAHEAD_LIMIT)
        .await?;
    Ok(Json(products))
}
