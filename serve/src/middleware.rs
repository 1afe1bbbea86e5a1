//! Access guard: host validation, referer allow-list, request timing log.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use url::Url;

use crate::app::AppState;

pub(crate) async fn access_guard(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    // Host pinning: when a domain is configured, anything else is a 404.
    if let Some(domain) = &state.config.domain {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok());
        if host != Some(domain.as_str()) {
            return (StatusCode::NOT_FOUND, "Not Found").into_response();
        }
    }

    // Referer allow-list. An empty/absent referer is always allowed (local
    // development and direct loads); a present one must suffix-match.
    if !state.config.allowed_referers.is_empty() {
        let referer = request
            .headers()
            .get(header::REFERER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if !referer.is_empty() && !referer_allowed(referer, &state.config.allowed_referers) {
            return (StatusCode::FORBIDDEN, "Referer not allowed").into_response();
        }
    }

    let start = Instant::now();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        %path,
        status = response.status().as_u16(),
        "request"
    );
    response
}

fn referer_allowed(referer: &str, allowed: &[String]) -> bool {
    let Some(host) = Url::parse(referer).ok().and_then(|u| u.host_str().map(str::to_string))
    else {
        return false;
    };
    allowed
        .iter()
        .any(|domain| !domain.is_empty() && host.ends_with(domain.as_str()))
}
