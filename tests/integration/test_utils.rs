//! Test utilities for integration tests.
//!
//! Source images are generated into temporary directories and served by
//! routers built the same way the binary builds them.

use std::path::Path;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, Rgb, RgbImage};
use tempfile::TempDir;
use tower::ServiceExt;

use iiif_server::auth::{AccessStore, AccountSigner, AuthDescriptor, AuthPattern};
use iiif_server::derive::EngineKind;
use iiif_server::server::{
    create_router, prefix_name, AppState, AuthState, RouterConfig, ServerSettings,
};
use iiif_server::source::{DimensionCache, FilesystemSource, GeneratorSource, ImageSource};
use iiif_server::version::ApiVersion;

/// Cookie prefix used by every auth prefix in tests.
pub const COOKIE_PREFIX: &str = "t_";

// =============================================================================
// Fixtures
// =============================================================================

/// Write a colorful RGB image; the format follows the file extension.
pub fn write_image(dir: &Path, name: &str, width: u32, height: u32) {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(image)
        .save(dir.join(name))
        .unwrap();
}

/// Temporary image directory holding `img.png` (300x200).
pub fn image_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), "img.png", 300, 200);
    dir
}

// =============================================================================
// Routers
// =============================================================================

/// Builder for the set of handler prefixes a test router serves.
pub struct TestServer {
    root: std::path::PathBuf,
    settings: Arc<ServerSettings>,
    states: Vec<AppState>,
}

impl TestServer {
    pub fn new(root: &Path) -> Self {
        Self::with_settings(root, ServerSettings::default())
    }

    pub fn with_settings(root: &Path, settings: ServerSettings) -> Self {
        Self {
            root: root.to_path_buf(),
            settings: Arc::new(settings),
            states: Vec::new(),
        }
    }

    /// Add the prefix `{version}_{engine}[_{auth}]`.
    pub fn prefix(
        mut self,
        version: ApiVersion,
        engine: EngineKind,
        auth: Option<AuthPattern>,
    ) -> Self {
        let source: Arc<dyn ImageSource> = match engine {
            EngineKind::Gen => Arc::new(GeneratorSource),
            _ => Arc::new(FilesystemSource::new(&self.root)),
        };
        let mut state = AppState::new(
            prefix_name(version, engine, auth),
            version,
            engine,
            source,
            Arc::new(DimensionCache::default()),
            self.settings.clone(),
        );
        if let Some(pattern) = auth {
            let store = AccessStore::new(
                std::time::Duration::from_secs(3600),
                std::time::Duration::from_secs(10),
            );
            let auth = AuthState::new(version, pattern, store, AccountSigner::new("test-secret"))
                .with_descriptor(AuthDescriptor::with_cookie_prefix(version, COOKIE_PREFIX));
            state = state.with_auth(auth);
        }
        self.states.push(state);
        self
    }

    pub fn router(self) -> Router {
        create_router(self.states, RouterConfig::new().with_tracing(false))
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Send a GET request with extra headers.
pub async fn get_with(router: &Router, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    get_with(router, uri, &[]).await
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Decode an image body.
pub async fn body_image(response: Response<Body>) -> DynamicImage {
    image::load_from_memory(&body_bytes(response).await).unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response
        .headers()
        .get(name)
        .map(|v| v.to_str().unwrap())
        .unwrap_or_default()
}

/// `name=value` pairs of all `Set-Cookie` headers.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().split(';').next().unwrap().to_string())
        .collect()
}
