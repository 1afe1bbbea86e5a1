//! End-to-end router tests over an in-memory pipeline: no sockets, no
//! network, real codec.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

use refract::{
    Codec, Fetcher, MemoryDriver, Pipeline, RasterCodec, StaticFetcher, StorageDriver,
    ThrottleRegistry,
};
use serve::ServeConfig;

const IMG_URL: &str = "http://origin.example/cat.png";

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        width,
        height,
        image::Rgba([200, 60, 20, 255]),
    ));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

struct TestApp {
    router: Router,
    fetcher: Arc<StaticFetcher>,
}

async fn test_app(config: ServeConfig) -> TestApp {
    let storage: Arc<MemoryDriver> = Arc::new(MemoryDriver::new());
    let fetcher = Arc::new(StaticFetcher::new().insert(IMG_URL, png_bytes(40, 20)));
    let pipeline = Pipeline::new(
        storage.clone() as Arc<dyn StorageDriver>,
        Arc::new(RasterCodec),
        fetcher.clone() as Arc<dyn Fetcher>,
        ThrottleRegistry::new(4, 2),
    )
    .await
    .unwrap();
    let router = serve::build_router(
        config,
        Arc::new(pipeline),
        storage as Arc<dyn StorageDriver>,
    );
    TestApp { router, fetcher }
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec(), content_type)
}

#[tokio::test]
async fn fetch_transforms_then_serves_from_cache() {
    let app = test_app(ServeConfig::default()).await;
    let uri = format!("/image/fetch/w_10,h_5,f_png/{}", IMG_URL);

    let (status, body, content_type) = get(&app.router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert_eq!(RasterCodec.probe(&body).unwrap(), (10, 5));
    assert_eq!(app.fetcher.calls(), 1);

    // Let the fire-and-forget derived write land, then hit again.
    tokio::task::yield_now().await;
    let (status, cached_body, _) = get(&app.router, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cached_body, body);
    assert_eq!(app.fetcher.calls(), 1);
}

#[tokio::test]
async fn cache_control_carries_configured_ttl() {
    let config = ServeConfig {
        cdn_ttl: 120,
        ..ServeConfig::default()
    };
    let app = test_app(config).await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/image/fetch/w_10,f_png/{}", IMG_URL))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok()),
        Some("public, max-age=120")
    );
}

#[tokio::test]
async fn malformed_directive_is_bad_request() {
    let app = test_app(ServeConfig::default()).await;
    for bad in ["h_pp", "c_fake", "f_fake"] {
        let (status, _, _) = get(&app.router, &format!("/image/fetch/{}/{}", bad, IMG_URL)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "directive {}", bad);
    }
}

#[tokio::test]
async fn missing_origin_image_is_not_found() {
    let app = test_app(ServeConfig::default()).await;
    let (status, _, _) = get(
        &app.router,
        "/image/fetch/w_10/http://origin.example/missing.png",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn post_on_fetch_route_is_method_not_allowed() {
    let app = test_app(ServeConfig::default()).await;
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/image/fetch/w_10/{}", IMG_URL))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn health_and_robots() {
    let app = test_app(ServeConfig::default()).await;
    let (status, body, _) = get(&app.router, "/up").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"up");

    let (status, body, _) = get(&app.router, "/robots.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Allow: /"));
}

#[tokio::test]
async fn host_pinning_rejects_other_hosts() {
    let config = ServeConfig {
        domain: Some("img.example.com".to_string()),
        ..ServeConfig::default()
    };
    let app = test_app(config).await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/up")
                .header(header::HOST, "evil.example.org")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/up")
                .header(header::HOST, "img.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn disallowed_referer_is_forbidden() {
    let config = ServeConfig {
        allowed_referers: vec!["friendly.example".to_string()],
        ..ServeConfig::default()
    };
    let app = test_app(config).await;

    let request = |referer: Option<&str>| {
        let mut builder = Request::builder().uri("/up");
        if let Some(referer) = referer {
            builder = builder.header(header::REFERER, referer);
        }
        builder.body(Body::empty()).unwrap()
    };

    let response = app
        .router
        .clone()
        .oneshot(request(Some("https://stranger.example/page")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router
        .clone()
        .oneshot(request(Some("https://www.friendly.example/page")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Empty referer is always allowed.
    let response = app.router.clone().oneshot(request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_api_then_transform_roundtrip() {
    let app = test_app(ServeConfig::default()).await;

    // Hand-rolled multipart body with a single `file` field.
    let boundary = "refract-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"file\"; filename=\"cat.png\"\r\n",
    );
    body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
    body.extend_from_slice(&png_bytes(30, 30));
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1_0/image/upload")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "");
    let url = json["url"].as_str().unwrap();
    let name = url.rsplit('/').next().unwrap().to_string();
    assert!(name.starts_with("cat-") && name.ends_with(".png"));

    // The stored original can now be transformed through the upload route.
    let (status, bytes, _) =
        get(&app.router, &format!("/image/upload/w_6,h_6,f_png/{}", name)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(RasterCodec.probe(&bytes).unwrap(), (6, 6));
}
