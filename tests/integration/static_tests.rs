//! Static tile generator integration tests.
//!
//! Tests verify:
//! - Every tile and size advertised in the generated info.json exists
//! - Static tiles match what the server derives for the same requests

use axum::http::StatusCode;
use image::GenericImageView;

use iiif_server::derive::EngineKind;
use iiif_server::info::ImageInfo;
use iiif_server::static_tiles::{
    static_full_sizes, static_partial_tile_sizes, static_scale_factors, StaticGenerator,
    StaticOptions,
};
use iiif_server::version::ApiVersion;

use super::test_utils::{body_image, get, image_dir, TestServer};

fn options(dst: &std::path::Path) -> StaticOptions {
    StaticOptions {
        tilesize: 128,
        api_version: ApiVersion::V2_1,
        prefix: "http://example.org/tiles".to_string(),
        ..StaticOptions::new(dst)
    }
}

#[test]
fn test_static_info_lists_existing_tiles() {
    let src = image_dir();
    let dst = tempfile::tempdir().unwrap();
    let generator = StaticGenerator::new(options(dst.path()));

    let report = generator.generate(&src.path().join("img.png")).unwrap();
    assert_eq!(report.identifier, "img");
    assert_eq!(report.skipped, 0);

    let factors = static_scale_factors(300, 200, 128);
    assert_eq!(factors, vec![1, 2]);
    let expected = static_partial_tile_sizes(300, 200, 128, &factors).len()
        + static_full_sizes(300, 200, 128).len();
    assert_eq!(report.tiles.len(), expected);
    for tile in &report.tiles {
        assert!(dst.path().join(tile).is_file(), "missing {}", tile);
    }

    let text = std::fs::read_to_string(dst.path().join("img/info.json")).unwrap();
    let info = ImageInfo::from_json(&text, Some(ApiVersion::V2_1)).unwrap();
    assert_eq!(info.identifier.as_deref(), Some("http://example.org/tiles/img"));
    assert_eq!(info.tiles[0].width, 128);
    assert_eq!(info.tiles[0].scale_factors, vec![1, 2]);
    for size in &info.sizes {
        let path = format!("img/full/{},{}/0/default.jpg", size.width, size.height);
        assert!(dst.path().join(&path).is_file(), "missing {}", path);
    }
}

#[tokio::test]
async fn test_static_tiles_match_server() {
    let src = image_dir();
    let dst = tempfile::tempdir().unwrap();
    let report = StaticGenerator::new(options(dst.path()))
        .generate(&src.path().join("img.png"))
        .unwrap();

    let router = TestServer::new(src.path())
        .prefix(ApiVersion::V2_1, EngineKind::Image, None)
        .router();

    for tile in &report.tiles {
        let response = get(&router, &format!("/2.1_image/{}", tile)).await;
        assert_eq!(response.status(), StatusCode::OK, "{}", tile);
        let served = body_image(response).await;
        let written = image::open(dst.path().join(tile)).unwrap();
        assert_eq!(served.dimensions(), written.dimensions(), "{}", tile);
    }
}

#[test]
fn test_static_dryrun_reports_without_writing() {
    let src = image_dir();
    let dst = tempfile::tempdir().unwrap();
    let out = dst.path().join("out");
    let generator = StaticGenerator::new(StaticOptions {
        dryrun: true,
        ..options(&out)
    });

    let report = generator.generate(&src.path().join("img.png")).unwrap();
    assert!(!report.tiles.is_empty());
    assert!(!out.exists());
}
