use std::sync::Arc;

use axum::extract::{Request, State};
use axum::response::Response;

use crate::error::AppError;
use crate::utils::state::AppState;

/// Fallback: everything the agent does not serve itself is relayed to the
/// registry's own API.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, AppError> {
    state.registry.proxy(request).await
}
