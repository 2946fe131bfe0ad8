use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::service::garbage::{delete_garbage_handler, get_garbage_handler};
use crate::service::manifest::manifest_summary_handler;
use crate::service::proxy::proxy_handler;
use crate::service::status::status_handler;
use crate::utils::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v2/status", get(status_handler))
        .route(
            "/v2/garbage",
            get(get_garbage_handler).delete(delete_garbage_handler),
        )
        .route(
            "/v2/{repo}/manifests/{tag}/summary",
            get(manifest_summary_handler),
        )
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
