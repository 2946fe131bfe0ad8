use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::error::AppError;
use crate::utils::state::AppState;

/// GET /v2/garbage
///
/// Dry-run collection: lists the blobs a removal would reclaim, with their
/// sizes. 503 while another collection run is in flight.
pub async fn get_garbage_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let listing = state.coordinator.get_garbage().await?;
    Ok(Json(listing))
}

/// DELETE /v2/garbage
///
/// Destructive collection. 503 while another run is in flight.
pub async fn delete_garbage_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.coordinator.delete_garbage().await?;
    Ok(StatusCode::OK)
}
