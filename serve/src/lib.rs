//! HTTP surface for refract (axum).
//!
//! Routes: `GET /image/fetch/{filters}/{url}`, `GET /image/upload/{filters}/
//! {filename}`, `POST /v1_0/image/upload` (multipart), plus `/up` and
//! `/robots.txt`. Every image route runs through the access guard
//! (host/referer checks) and a request timing log.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`build_router`],
//! [`ServeConfig`].

mod app;
mod config;
mod handlers;
mod middleware;

pub use config::ServeConfig;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use refract::{Pipeline, StorageDriver};

use app::AppState;

/// Builds the router over an already-wired pipeline. Exposed so embedders
/// and tests can drive the service without binding a socket.
pub fn build_router(
    config: ServeConfig,
    pipeline: Arc<Pipeline>,
    storage: Arc<dyn StorageDriver>,
) -> axum::Router {
    app::router(Arc::new(AppState {
        pipeline,
        storage,
        config,
    }))
}

/// Serves on an existing listener. Used by tests (bind 127.0.0.1:0, then
/// pass the listener in).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    config: ServeConfig,
    pipeline: Arc<Pipeline>,
    storage: Arc<dyn StorageDriver>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("listening on http://{}", addr);
    let router = build_router(config, pipeline, storage);
    axum::serve(listener, router).await?;
    Ok(())
}

/// Binds `0.0.0.0:<config.port>` and serves until the process exits.
pub async fn run_serve(
    config: ServeConfig,
    pipeline: Arc<Pipeline>,
    storage: Arc<dyn StorageDriver>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    run_serve_on_listener(listener, config, pipeline, storage).await
}
