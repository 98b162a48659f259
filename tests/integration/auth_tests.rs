//! Authentication integration tests.
//!
//! Tests verify:
//! - Degraded redirects for unauthenticated info and image requests
//! - The login, token and image access flow with cookies and tokens
//! - HTTP Basic login and logout
//! - Service descriptions in info documents
//! - postMessage token pages

use axum::http::StatusCode;

use iiif_server::auth::AuthPattern;
use iiif_server::derive::EngineKind;
use iiif_server::version::ApiVersion;

use super::test_utils::{
    body_image, body_json, body_text, get, get_with, header, image_dir, set_cookies, TestServer,
    COOKIE_PREFIX,
};

fn router_with(dir: &std::path::Path, version: ApiVersion, pattern: AuthPattern) -> axum::Router {
    TestServer::new(dir)
        .prefix(version, EngineKind::Image, Some(pattern))
        .router()
}

/// Log in and fetch a token; returns `(access cookie pair, token)`.
async fn authenticate(router: &axum::Router, prefix: &str) -> (String, String) {
    let response = get(router, &format!("/{}/login", prefix)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let account = set_cookies(&response).remove(0);
    assert!(account.starts_with(&format!("{}account=", COOKIE_PREFIX)));

    let response = get_with(router, &format!("/{}/token", prefix), &[("cookie", &account)]).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "set-cookie").contains("Max-Age=3600"));
    let access = set_cookies(&response).remove(0);
    assert!(access.starts_with(&format!("{}access=", COOKIE_PREFIX)));

    let json = body_json(response).await;
    assert_eq!(json["expiresIn"], 10);
    let token = json["accessToken"].as_str().unwrap().to_string();
    (access, token)
}

// =============================================================================
// Degraded Redirects
// =============================================================================

#[tokio::test]
async fn test_info_redirects_to_degraded() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V2_1, AuthPattern::Kiosk);

    let response = get(&router, "/2.1_image_kiosk/img/info.json").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(header(&response, "location"), "/2.1_image_kiosk/img-deg/info.json");

    // A token that was sent but is not valid is refused outright
    let response = get_with(
        &router,
        "/2.1_image_kiosk/img/info.json",
        &[("authorization", "Bearer not-a-token")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_degraded_info_describes_services() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V2_1, AuthPattern::Kiosk);

    let response = get(&router, "/2.1_image_kiosk/img-deg/info.json").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "cache-control"), "no-store");

    let json = body_json(response).await;
    assert_eq!(json["@id"], "http://localhost/2.1_image_kiosk/img-deg");
    assert_eq!(json["width"], 300);
    let service = &json["service"];
    assert_eq!(service["@id"], "http://localhost/2.1_image_kiosk/login");
    assert_eq!(service["profile"], "http://iiif.io/api/image/2/auth/kiosk");
    assert_eq!(service["label"], "Login to image server");
    // The only child is the token service, nested as an object
    assert_eq!(service["service"]["@id"], "http://localhost/2.1_image_kiosk/token");
    assert_eq!(service["service"]["profile"], "http://iiif.io/api/image/2/auth/token");
}

#[tokio::test]
async fn test_image_redirects_to_gray_degraded() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V3_0, AuthPattern::Clickthrough);

    let response = get(&router, "/3.0_image_clickthrough/img/full/100,/0/default.png").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        header(&response, "location"),
        "/3.0_image_clickthrough/img-deg/full/100,/0/default.png"
    );

    let response = get(&router, "/3.0_image_clickthrough/img-deg/full/100,/0/default.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    let image = body_image(response).await.to_rgb8();
    assert_eq!(image.dimensions(), (100, 67));
    assert!(image.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
}

// =============================================================================
// Access Flow
// =============================================================================

#[tokio::test]
async fn test_login_token_access_flow() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V3_0, AuthPattern::Kiosk);
    let (access, token) = authenticate(&router, "3.0_image_kiosk").await;

    let bearer = format!("Bearer {}", token);
    let response = get_with(
        &router,
        "/3.0_image_kiosk/img/info.json",
        &[("authorization", &bearer)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["id"], "http://localhost/3.0_image_kiosk/img");
    assert_eq!(json["service"]["profile"], "http://iiif.io/api/auth/1/kiosk");

    let response = get_with(
        &router,
        "/3.0_image_kiosk/img/full/max/0/default.png",
        &[("cookie", &access)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "cache-control"), "no-store");
    let image = body_image(response).await.to_rgb8();
    assert_eq!(image.get_pixel(10, 20).0, [10, 20, 30]);
}

#[tokio::test]
async fn test_token_without_account_cookie() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V2_1, AuthPattern::Clickthrough);

    let response = get(&router, "/2.1_image_clickthrough/token").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    let json = body_json(response).await;
    assert_eq!(json["error"], "missingCredentials");
    assert!(json.get("accessToken").is_none());

    // A forged account cookie is refused as well
    let forged = format!("{}account=clickthrough.00", COOKIE_PREFIX);
    let response = get_with(&router, "/2.1_image_clickthrough/token", &[("cookie", &forged)]).await;
    assert_eq!(body_json(response).await["error"], "missingCredentials");
}

#[tokio::test]
async fn test_token_post_message_page() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V2_1, AuthPattern::Kiosk);

    let response = get(&router, "/2.1_image_kiosk/login").await;
    let account = set_cookies(&response).remove(0);

    let response = get_with(
        &router,
        "/2.1_image_kiosk/token?messageId=42&origin=http://example.org",
        &[("cookie", &account)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "text/html");
    let body = body_text(response).await;
    assert!(body.contains("window.parent.postMessage("));
    assert!(body.contains("\"messageId\":\"42\""));
    assert!(body.contains("\"http://example.org\""));
}

// =============================================================================
// Patterns
// =============================================================================

#[tokio::test]
async fn test_basic_login_and_logout() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V2_1, AuthPattern::Basic);

    let response = get(&router, "/2.1_image_basic/login").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        header(&response, "www-authenticate"),
        "Basic realm=\"HTTP-Basic-Auth at image server (u=p to login)\""
    );

    // user:pass is refused, user:user accepted
    let response = get_with(
        &router,
        "/2.1_image_basic/login",
        &[("authorization", "Basic dXNlcjpwYXNz")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = get_with(
        &router,
        "/2.1_image_basic/login",
        &[("authorization", "Basic dXNlcjp1c2Vy")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let account = set_cookies(&response).remove(0);

    let response = get_with(&router, "/2.1_image_basic/token", &[("cookie", &account)]).await;
    let access = set_cookies(&response).remove(0);
    assert!(body_json(response).await["accessToken"].is_string());

    let response = get_with(&router, "/2.1_image_basic/logout", &[("cookie", &access)]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let expired: Vec<String> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(expired.len(), 2);
    assert!(expired.iter().all(|c| c.contains("Max-Age=0")));

    // The revoked access cookie no longer opens the image
    let response = get_with(
        &router,
        "/2.1_image_basic/img/full/full/0/default.png",
        &[("cookie", &access)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_basic_info_advertises_login_and_logout() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V2_1, AuthPattern::Basic);

    let json = body_json(get(&router, "/2.1_image_basic/img-deg/info.json").await).await;
    let service = &json["service"];
    assert_eq!(service["profile"], "http://iiif.io/api/image/2/auth/login");
    let children = service["service"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["@id"], "http://localhost/2.1_image_basic/logout");
    assert_eq!(children[1]["@id"], "http://localhost/2.1_image_basic/token");
}

#[tokio::test]
async fn test_external_login_sets_no_cookie() {
    let dir = image_dir();
    let router = router_with(dir.path(), ApiVersion::V3_0, AuthPattern::External);

    let response = get(&router, "/3.0_image_external/login").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
    assert!(body_text(response).await.contains("window.close()"));

    let json = body_json(get(&router, "/3.0_image_external/img-deg/info.json").await).await;
    assert_eq!(json["service"]["label"], "External Authentication Required");
    assert_eq!(json["service"]["failureHeader"], "Restricted Material");
}
