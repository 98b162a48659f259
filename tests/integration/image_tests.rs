//! Image request integration tests.
//!
//! Tests verify:
//! - Region, size, rotation and quality processing through the router
//! - Format negotiation for 1.x requests without a format
//! - Engine restrictions (null engine) and generated sources
//! - Error statuses, bodies and headers
//! - Index pages, health check and CORS preflight

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use image::GenericImageView;
use tower::ServiceExt;

use iiif_server::derive::{EngineKind, MaxLimits};
use iiif_server::server::ServerSettings;
use iiif_server::version::ApiVersion;

use super::test_utils::{
    body_bytes, body_image, body_json, body_text, get, get_with, header, image_dir, TestServer,
};

// =============================================================================
// Image Processing
// =============================================================================

#[tokio::test]
async fn test_full_image_png() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get(&router, "/2.1_image/img/full/full/0/default.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(header(&response, "cache-control"), "public, max-age=3600");
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
    assert!(header(&response, "link").contains("level2.json"));

    let image = body_image(response).await;
    assert_eq!(image.dimensions(), (300, 200));
    // Pixel (10, 20) of the fixture
    assert_eq!(image.to_rgb8().get_pixel(10, 20).0, [10, 20, 30]);
}

#[tokio::test]
async fn test_region_and_size() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get(&router, "/2.1_image/img/100,50,40,30/full/0/default.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    let image = body_image(response).await;
    assert_eq!(image.dimensions(), (40, 30));
    assert_eq!(image.to_rgb8().get_pixel(0, 0).0, [100, 50, 150]);

    let response = get(&router, "/2.1_image/img/full/150,/0/default.jpg").await;
    assert_eq!(header(&response, "content-type"), "image/jpeg");
    assert_eq!(body_image(response).await.dimensions(), (150, 100));

    let response = get(&router, "/2.1_image/img/pct:50,50,50,50/pct:50/0/default.png").await;
    assert_eq!(body_image(response).await.dimensions(), (75, 50));

    let response = get(&router, "/2.1_image/img/square/!64,64/0/default.png").await;
    assert_eq!(body_image(response).await.dimensions(), (64, 64));
}

#[tokio::test]
async fn test_rotation_and_quality() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V3_0, EngineKind::Image, None)
        .router();

    let response = get(&router, "/3.0_image/img/full/max/90/default.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_image(response).await.dimensions(), (200, 300));

    let response = get(&router, "/3.0_image/img/full/max/!0/gray.png").await;
    let image = body_image(response).await.to_rgb8();
    assert_eq!(image.dimensions(), (300, 200));
    let [r, g, b] = image.get_pixel(120, 40).0;
    assert!(r == g && g == b);

    let response = get(&router, "/3.0_image/img/full/max/0/bitonal.png").await;
    let image = body_image(response).await.to_luma8();
    assert!(image.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
}

#[tokio::test]
async fn test_max_size_limits() {
    let dir = image_dir();
    let settings = ServerSettings {
        limits: MaxLimits::new(None, Some(150), None),
        ..ServerSettings::default()
    };
    let router = TestServer::with_settings(dir.path(), settings)
        .prefix(ApiVersion::V3_0, EngineKind::Image, None)
        .router();

    let response = get(&router, "/3.0_image/img/full/max/0/default.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_image(response).await.dimensions(), (150, 100));
}

// =============================================================================
// Format Negotiation
// =============================================================================

#[tokio::test]
async fn test_v1_format_from_accept() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V1_1, EngineKind::Image, None)
        .router();

    let response = get_with(
        &router,
        "/1.1_image/img/full/full/0/native",
        &[("accept", "text/html, image/png;q=0.9, image/jpeg;q=0.5")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");

    // No usable Accept falls back to jpg
    let response = get(&router, "/1.1_image/img/full/full/0/native").await;
    assert_eq!(header(&response, "content-type"), "image/jpeg");
}

// =============================================================================
// Engines
// =============================================================================

#[tokio::test]
async fn test_null_engine_passthrough() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V1_0, EngineKind::Null, None)
        .router();

    let response = get(&router, "/1.0_null/img/full/full/0/native").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    let original = std::fs::read(dir.path().join("img.png")).unwrap();
    assert_eq!(body_bytes(response).await.to_vec(), original);
    // The source survives the request
    assert!(dir.path().join("img.png").exists());

    let response = get(&router, "/1.0_null/img/full/100,/0/native").await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert!(body_text(response).await.contains("parameter=size"));

    let response = get(&router, "/1.0_null/img/full/full/0/native.png").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_generator_engine() {
    let dir = tempfile::tempdir().unwrap();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Gen, None)
        .router();

    let response = get(&router, "/2.1_gen/check/0,0,243,243/81,/0/default.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_image(response).await.dimensions(), (81, 81));

    let response = get(&router, "/2.1_gen/nothing/full/81,/0/default.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains(" sierpinski_carpet\n"));
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_bad_parameters() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get(&router, "/2.1_image/img/full/full/abc/default.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
    let body = body_text(response).await;
    assert!(body.starts_with("IIIF Image Server Error\n\n"));
    assert!(body.contains("parameter=rotation\ncode=400\n"));

    let response = get(&router, "/2.1_image/img/full/full/0/sepia.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("parameter=quality"));

    // Region entirely outside the image
    let response = get(&router, "/2.1_image/img/400,0,10,10/full/0/default.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&router, "/2.1_image/img/full/full/0/default.pdf").await;
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_oversized_output_is_413() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get(&router, "/2.1_image/img/full/pct:1000000/0/default.png").await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let response = get(&router, "/2.1_image/img/full/pct:1000000000000/0/default.png").await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    // The server keeps answering afterwards
    let response = get(&router, "/2.1_image/img/full/150,/0/default.png").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bad_paths() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get(&router, "/2.1_image/img/full/full/default.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let long = format!("/2.1_image/{}/full/full/0/default.png", "a".repeat(1100));
    let response = get(&router, &long).await;
    assert_eq!(response.status(), StatusCode::URI_TOO_LONG);

    // Degraded identifiers only exist under auth prefixes
    let response = get(&router, "/2.1_image/img-deg/full/full/0/default.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Ancillary Endpoints
// =============================================================================

#[tokio::test]
async fn test_index_pages() {
    let dir = image_dir();
    let settings = ServerSettings {
        include_osd: true,
        ..ServerSettings::default()
    };
    let router = TestServer::with_settings(dir.path(), settings)
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .prefix(ApiVersion::V3_0, EngineKind::Null, None)
        .router();

    let response = get(&router, "/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("/2.1_image/"));
    assert!(body.contains("/3.0_null/"));

    let body = body_text(get(&router, "/2.1_image/").await).await;
    assert!(body.contains("/2.1_image/img/info.json"));
    assert!(body.contains("/2.1_image/img/full/full/0/default"));
    assert!(body.contains("/2.1_image/img/osd.html"));

    let body = body_text(get(&router, "/3.0_null/").await).await;
    assert!(body.contains("/3.0_null/img/full/max/0/default"));
    assert!(!body.contains("256,256"));
}

#[tokio::test]
async fn test_osd_page() {
    let dir = image_dir();
    let settings = ServerSettings {
        include_osd: true,
        ..ServerSettings::default()
    };
    let router = TestServer::with_settings(dir.path(), settings)
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get(&router, "/2.1_image/img/osd.html").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "content-type").starts_with("text/html"));
    assert!(body_text(response).await.contains("info.json"));
}

#[tokio::test]
async fn test_health_check() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let json = body_json(get(&router, "/health").await).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_options_preflight() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/2.1_image/img/info.json")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
    assert_eq!(header(&response, "access-control-allow-methods"), "GET, OPTIONS");
    assert_eq!(
        header(&response, "access-control-allow-headers"),
        "Origin, Accept, Accept-Encoding, Authorization"
    );
}
