use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use crate::error::AppError;
use crate::utils::state::AppState;

/// GET /v2/{repo}/manifests/{tag}/summary
pub async fn manifest_summary_handler(
    State(state): State<Arc<AppState>>,
    Path((repo, tag)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state.registry.manifest_summary(&repo, &tag).await?;
    Ok(Json(summary))
}
