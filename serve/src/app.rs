//! Router and shared state.

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use refract::{Pipeline, StorageDriver};

use crate::config::ServeConfig;
use crate::handlers;
use crate::middleware::access_guard;

/// Shared state, cloned per request via `Arc`.
pub(crate) struct AppState {
    pub(crate) pipeline: Arc<Pipeline>,
    /// Direct storage handle for the upload API (writes originals without
    /// running a transform).
    pub(crate) storage: Arc<dyn StorageDriver>,
    pub(crate) config: ServeConfig,
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/image/fetch/*path", get(handlers::fetch_image))
        .route("/image/upload/*path", get(handlers::upload_image))
        .route("/v1_0/image/upload", post(handlers::api_upload))
        .route("/up", get(handlers::up))
        .route("/robots.txt", get(handlers::robots))
        .layer(from_fn_with_state(Arc::clone(&state), access_guard))
        .with_state(state)
}
