//! Info document integration tests.
//!
//! Tests verify:
//! - Version-specific JSON layout (2.1, 3.0) and the 1.0 XML form
//! - Tiles, sizes, limits and formats advertised per engine
//! - Content negotiation and response headers
//! - Base URI redirects and unknown identifiers

use axum::http::StatusCode;

use iiif_server::derive::{EngineKind, MaxLimits};
use iiif_server::info::ImageInfo;
use iiif_server::server::ServerSettings;
use iiif_server::version::{ApiVersion, ComplianceLevel};

use super::test_utils::{
    body_json, body_text, get, get_with, header, image_dir, TestServer,
};

// =============================================================================
// Version Layouts
// =============================================================================

#[tokio::test]
async fn test_info_v2_1() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get(&router, "/2.1_image/img/info.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/json");
    assert_eq!(header(&response, "cache-control"), "public, max-age=3600");
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
    assert_eq!(
        header(&response, "link"),
        "<http://iiif.io/api/image/2/level2.json>;rel=\"profile\""
    );

    let json = body_json(response).await;
    assert_eq!(json["@context"], "http://iiif.io/api/image/2/context.json");
    assert_eq!(json["@id"], "http://localhost/2.1_image/img");
    assert_eq!(json["protocol"], "http://iiif.io/api/image");
    assert_eq!(json["width"], 300);
    assert_eq!(json["height"], 200);
    assert_eq!(json["profile"][0], "http://iiif.io/api/image/2/level2.json");
    assert_eq!(
        json["profile"][1]["formats"],
        serde_json::json!(["jpg", "png", "gif", "webp", "tif"])
    );
    assert_eq!(json["tiles"][0]["width"], 512);
    assert_eq!(json["tiles"][0]["scaleFactors"], serde_json::json!([1]));
    assert_eq!(json["sizes"][0], serde_json::json!({"width": 300, "height": 200}));
    assert_eq!(json["sizes"][1], serde_json::json!({"width": 150, "height": 100}));
}

#[tokio::test]
async fn test_info_v3_0() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V3_0, EngineKind::Image, None)
        .router();

    let response = get_with(&router, "/3.0_image/img/info.json", &[("host", "example.org")]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["@context"], "http://iiif.io/api/image/3/context.json");
    assert_eq!(json["id"], "http://example.org/3.0_image/img");
    assert_eq!(json["type"], "ImageService3");
    assert_eq!(json["profile"], "level2");
    assert_eq!(json["extraFormats"], serde_json::json!(["gif", "webp", "tif"]));
    assert_eq!(json["extraQualities"], serde_json::json!(["bitonal"]));
}

#[tokio::test]
async fn test_info_round_trips_through_reader() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V3_0, EngineKind::Image, None)
        .router();

    let text = body_text(get(&router, "/3.0_image/img/info.json").await).await;
    let info = ImageInfo::from_json(&text, None).unwrap();
    assert_eq!(info.api_version, ApiVersion::V3_0);
    assert_eq!(info.level, ComplianceLevel::Level2);
    assert_eq!((info.width, info.height), (Some(300), Some(200)));
    assert_eq!(info.tiles[0].scale_factors, vec![1]);
}

#[tokio::test]
async fn test_info_v1_0_xml() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V1_0, EngineKind::Image, None)
        .router();

    let response = get(&router, "/1.0_image/img/info.xml").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "application/xml");
    // 1.0 has no Link header
    assert_eq!(header(&response, "link"), "");

    let body = body_text(response).await;
    assert!(body.contains("<identifier>http://localhost/1.0_image/img</identifier>"));
    assert!(body.contains("<width>300</width>"));
    assert!(body.contains("<height>200</height>"));
}

#[tokio::test]
async fn test_info_v1_0_errors_are_xml() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V1_0, EngineKind::Image, None)
        .router();

    let response = get(&router, "/1.0_image/missing/info.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header(&response, "content-type"), "application/xml");
    assert!(body_text(response).await.contains("<error xmlns="));
}

// =============================================================================
// Engines and Settings
// =============================================================================

#[tokio::test]
async fn test_info_null_engine_is_level0() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Null, None)
        .router();

    let response = get(&router, "/2.1_null/img/info.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header(&response, "link"),
        "<http://iiif.io/api/image/2/level0.json>;rel=\"profile\""
    );

    let json = body_json(response).await;
    assert_eq!(json["profile"], serde_json::json!(["http://iiif.io/api/image/2/level0.json"]));
    assert!(json.get("tiles").is_none());
    assert!(json.get("sizes").is_none());
}

#[tokio::test]
async fn test_info_generator_source() {
    let dir = tempfile::tempdir().unwrap();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Gen, None)
        .router();

    let json = body_json(get(&router, "/2.1_gen/check/info.json").await).await;
    assert_eq!(json["width"], 19683);
    assert_eq!(json["height"], 19683);
    assert_eq!(
        json["tiles"][0]["scaleFactors"],
        serde_json::json!([1, 2, 4, 8, 16, 32])
    );
}

#[tokio::test]
async fn test_info_configured_tiles_and_limits() {
    let dir = image_dir();
    let settings = ServerSettings {
        tile_width: 256,
        tile_height: 128,
        scale_factors: Some(vec![1, 2, 4]),
        limits: MaxLimits::new(Some(20000), Some(150), None),
        ..ServerSettings::default()
    };
    let router = TestServer::with_settings(dir.path(), settings)
        .prefix(ApiVersion::V2_0, EngineKind::Image, None)
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .prefix(ApiVersion::V3_0, EngineKind::Image, None)
        .router();

    let json = body_json(get(&router, "/2.1_image/img/info.json").await).await;
    assert_eq!(
        json["tiles"][0],
        serde_json::json!({"width": 256, "height": 128, "scaleFactors": [1, 2, 4]})
    );
    assert_eq!(json["profile"][1]["maxWidth"], 150);
    assert_eq!(json["profile"][1]["maxHeight"], 150);
    assert_eq!(json["profile"][1]["maxArea"], 20000);

    let json = body_json(get(&router, "/3.0_image/img/info.json").await).await;
    assert_eq!(json["maxWidth"], 150);
    assert_eq!(json["maxArea"], 20000);

    // Limits are advertised from 2.1
    let json = body_json(get(&router, "/2.0_image/img/info.json").await).await;
    assert!(json["profile"][1].get("maxWidth").is_none());
}

// =============================================================================
// Negotiation and Redirects
// =============================================================================

#[tokio::test]
async fn test_info_ld_json_negotiation() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get_with(
        &router,
        "/2.1_image/img/info.json",
        &[("accept", "application/json;q=0.5, application/ld+json")],
    )
    .await;
    assert_eq!(header(&response, "content-type"), "application/ld+json");

    let response = get_with(
        &router,
        "/2.1_image/img/info.json",
        &[("accept", "application/ld+json;q=0")],
    )
    .await;
    assert_eq!(header(&response, "content-type"), "application/json");
}

#[tokio::test]
async fn test_base_uri_redirects_to_info() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    for uri in ["/2.1_image/img", "/2.1_image/img/"] {
        let response = get(&router, uri).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        assert_eq!(header(&response, "location"), "/2.1_image/img/info.json");
    }
}

#[tokio::test]
async fn test_unknown_identifier_lists_available() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    let response = get(&router, "/2.1_image/nope/info.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(header(&response, "content-type"), "text/plain; charset=utf-8");
    let body = body_text(response).await;
    assert!(body.contains("Image resource 'nope' not found"));
    assert!(body.contains("\n img\n"));
}

#[tokio::test]
async fn test_info_unsupported_extension() {
    let dir = image_dir();
    let router = TestServer::new(dir.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    // XML info documents only exist in 1.0
    let response = get(&router, "/2.1_image/img/info.xml").await;
    assert!(response.status().is_client_error());
}
