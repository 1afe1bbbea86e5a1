//! Request handlers: fetch/upload image routes and the upload API.

use axum::extract::{Multipart, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use refract::{content_hash, Namespace, PipelineError, Rendered, RequestKind};

use crate::app::AppState;

pub(crate) async fn fetch_image(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    transform(state, uri, headers, "/image/fetch/", RequestKind::Fetch).await
}

pub(crate) async fn upload_image(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    transform(state, uri, headers, "/image/upload/", RequestKind::Upload).await
}

async fn transform(
    state: Arc<AppState>,
    uri: Uri,
    headers: HeaderMap,
    prefix: &str,
    kind: RequestKind,
) -> Response {
    // Work on the raw (still percent-encoded) path so the directive parser
    // owns all decoding; keep the query string, it is part of the source URL.
    let raw = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let Some(fragment) = raw.strip_prefix(prefix) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let accepts_webp = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("image/webp"));

    match state.pipeline.handle(fragment, kind, accepts_webp).await {
        Ok(rendered) => image_response(rendered, state.config.cdn_ttl),
        Err(error) => error_response(error),
    }
}

fn image_response(rendered: Rendered, cdn_ttl: u64) -> Response {
    (
        [
            (
                header::CACHE_CONTROL,
                format!("public, max-age={}", cdn_ttl),
            ),
            (
                header::CONTENT_TYPE,
                rendered.format.content_type().to_string(),
            ),
        ],
        rendered.bytes,
    )
        .into_response()
}

fn error_response(error: PipelineError) -> Response {
    let (status, body) = match &error {
        PipelineError::BadRequest(_) => (StatusCode::BAD_REQUEST, "Bad request"),
        PipelineError::NotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
        PipelineError::DomainParse(_)
        | PipelineError::Upstream(_)
        | PipelineError::ExtractInfo(_)
        | PipelineError::Processing(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    };
    warn!(%error, status = status.as_u16(), "request failed");
    (status, body).into_response()
}

pub(crate) async fn up() -> &'static str {
    "up"
}

pub(crate) async fn robots() -> &'static str {
    "User-Agent: *\nAllow: /\n"
}

/// JSON body of the upload API.
#[derive(Serialize)]
pub(crate) struct UploadApiResponse {
    pub url: String,
    pub error: String,
}

fn api_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(UploadApiResponse {
            url: String::new(),
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// `POST /v1_0/image/upload`: stores a multipart `file` field under the
/// `upload/` namespace and returns the public transform URL for it.
pub(crate) async fn api_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let Some(file_name) = field.file_name().map(str::to_string) else {
                return api_error(StatusCode::BAD_REQUEST, "file field has no filename");
            };
            match field.bytes().await {
                Ok(bytes) => upload = Some((file_name, bytes.to_vec())),
                Err(error) => {
                    warn!(%error, "cannot read upload body");
                    return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
                }
            }
            break;
        }
    }
    let Some((file_name, bytes)) = upload else {
        return api_error(StatusCode::BAD_REQUEST, "missing file field");
    };
    let Some(name) = diverse_name(&file_name) else {
        return api_error(StatusCode::BAD_REQUEST, "invalid filename");
    };

    let hash = content_hash(&name);
    if state.storage.read(&hash, Namespace::Upload).await.is_ok() {
        return api_error(StatusCode::BAD_REQUEST, "image already exists");
    }
    if let Err(error) = state.storage.write(&bytes, &hash, Namespace::Upload).await {
        warn!(%error, "upload write failed");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
    }

    let url = format!(
        "https://{}/image/upload/f_auto/{}",
        state.config.public_domain, name
    );
    Json(UploadApiResponse {
        url,
        error: String::new(),
    })
    .into_response()
}

/// Salts an uploaded filename with a short random suffix so repeated
/// uploads of the same name get distinct identities: `cat.jpg` →
/// `cat-1a2b3c4d.jpg`. Requires a `stem.ext` shape.
fn diverse_name(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    let id = uuid::Uuid::new_v4().simple().to_string();
    Some(format!("{}-{}.{}", stem, &id[..8], ext))
}
