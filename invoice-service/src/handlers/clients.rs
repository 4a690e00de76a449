use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::dtos::SearchParams;
use crate::startup::AppState;

const TYPEAHEAD_LIMIT: i64 = 10;

/// Client typeahead: name substring match, first ten by name.
pub async fn search_clients(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let search = params.search.unwrap_or_default();
    let clients = state
        .store
        .search_clients(search.trim(), TYPEAHEAD_LIMIT)
        .await?;
    Ok(Json(clients))
}
