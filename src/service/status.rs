use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;

use crate::error::AppError;
use crate::utils::state::AppState;

/// GET /v2/status
///
/// Liveness is probed against the upstream registry on every read; the
/// collection fields come from the persisted ledger.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let is_alive = state.registry.is_alive().await;
    state.ledger.set_is_alive(is_alive);
    Ok(Json(state.ledger.snapshot()))
}
