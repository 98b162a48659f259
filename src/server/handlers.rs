//! HTTP request handlers for the IIIF Image API.
//!
//! # Endpoints
//!
//! - `GET /` - Index of the mounted handler prefixes
//! - `GET /health` - Health check endpoint
//! - `GET /{prefix}/` - Index of the identifiers served under a prefix
//! - `GET /{prefix}/{identifier}/info.json` - Image information
//! - `GET /{prefix}/{identifier}/{region}/{size}/{rotation}/{quality}[.{format}]` - Image
//! - `GET /{prefix}/{identifier}/osd.html` - OpenSeadragon viewer (when enabled)
//! - `OPTIONS /{prefix}/...` - CORS preflight

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::auth::degraded_base;
use crate::derive::{derive, DeriveOptions, EngineKind, MaxLimits};
use crate::error::{ErrorKind, IiifError};
use crate::info::{ImageInfo, SizeEntry};
use crate::request::{
    quote, unquote, IiifPath, ImageSegments, Request, RequestParser, Size, MAX_PATH_LENGTH,
};
use crate::source::{DimensionCache, ImageSource};
use crate::static_tiles::{static_full_sizes, static_scale_factors, DEFAULT_TILESIZE};
use crate::version::{ApiVersion, ComplianceLevel, Quality};

use super::auth::{bearer_token, AuthState};
use super::viewer::{index_page, osd_page, IndexEntry, OsdAssets};

/// Default Cache-Control max-age in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Output formats advertised in info documents.
const INFO_FORMATS: [&str; 5] = ["jpg", "png", "gif", "webp", "tif"];

/// Formats beyond the 3.0 level 2 set of jpg and png.
const EXTRA_FORMATS_3: [&str; 3] = ["gif", "webp", "tif"];

// =============================================================================
// Application State
// =============================================================================

/// Settings shared by all handler prefixes.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub tile_width: u32,
    pub tile_height: u32,

    /// Fixed scale factors; computed from the image size when `None`
    pub scale_factors: Option<Vec<u32>>,

    /// Limits for the `max` size, also advertised from 2.1
    pub limits: MaxLimits,

    /// Serve `{id}/osd.html` viewer pages
    pub include_osd: bool,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            tile_width: DEFAULT_TILESIZE,
            tile_height: DEFAULT_TILESIZE,
            scale_factors: None,
            limits: MaxLimits::default(),
            include_osd: false,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
        }
    }
}

/// State of one handler prefix such as `2.1_image` or `3.0_gen_kiosk`.
///
/// This is passed to all handlers of the prefix via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Path segment the handlers are mounted under
    pub prefix: String,

    pub api_version: ApiVersion,

    pub engine: EngineKind,

    /// Resolves identifiers to engine inputs
    pub source: Arc<dyn ImageSource>,

    /// Image dimensions for info requests
    pub dimensions: Arc<DimensionCache>,

    pub settings: Arc<ServerSettings>,

    /// Auth services; `None` serves everything openly
    pub auth: Option<Arc<AuthState>>,
}

impl AppState {
    pub fn new(
        prefix: impl Into<String>,
        api_version: ApiVersion,
        engine: EngineKind,
        source: Arc<dyn ImageSource>,
        dimensions: Arc<DimensionCache>,
        settings: Arc<ServerSettings>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            api_version,
            engine,
            source,
            dimensions,
            settings,
            auth: None,
        }
    }

    /// Protect the prefix with auth services.
    pub fn with_auth(mut self, auth: AuthState) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    /// `Link` header value naming the compliance level (1.1 and later).
    pub fn link_header(&self) -> Option<String> {
        (self.api_version >= ApiVersion::V1_1).then(|| {
            format!(
                "<{}>;rel=\"profile\"",
                self.api_version.profile().compliance_uri(self.engine.level())
            )
        })
    }

    fn error(&self, error: IiifError) -> HandlerError {
        HandlerError::new(error).with_link(self.link_header())
    }

    /// Identifier to look up and whether the request is degraded.
    fn base_identifier<'a>(&self, identifier: &'a str) -> (&'a str, bool) {
        match (&self.auth, degraded_base(identifier)) {
            (Some(_), Some(base)) => (base, true),
            _ => (identifier, false),
        }
    }

    /// Resolve an identifier; a miss lists what is available.
    async fn resolve(&self, identifier: &str) -> Result<PathBuf, IiifError> {
        match self.source.resolve(identifier).await {
            Ok(path) => Ok(path),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let mut text = format!(
                    "Image resource '{}' not found. Local resources available:\n",
                    identifier
                );
                for available in self.source.identifiers().await.unwrap_or_default() {
                    text.push(' ');
                    text.push_str(&available);
                    text.push('\n');
                }
                Err(IiifError::not_found(text))
            }
            Err(e) => Err(e),
        }
    }

    fn cache_control(&self) -> String {
        if self.auth.is_some() {
            "no-store".to_string()
        } else {
            format!("public, max-age={}", self.settings.cache_max_age)
        }
    }

    /// Add the CORS and compliance headers sent with every IIIF response.
    fn finish(&self, mut response: Response) -> Response {
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        if let Some(link) = self.link_header() {
            if let Ok(value) = HeaderValue::from_str(&link) {
                headers.insert(header::LINK, value);
            }
        }
        response
    }

    /// Fill in tiles, sizes, features and limits for an image of `width` x `height`.
    fn describe(&self, info: &mut ImageInfo, width: u32, height: u32) {
        if self.engine.level() == ComplianceLevel::Level0 {
            return;
        }
        let settings = &self.settings;
        let scale_factors = settings
            .scale_factors
            .clone()
            .unwrap_or_else(|| static_scale_factors(width, height, settings.tile_width));
        info.set_tiling(settings.tile_width, Some(settings.tile_height), scale_factors);
        info.sizes = static_full_sizes(width, height, settings.tile_width)
            .into_iter()
            .map(|(width, height)| SizeEntry { width, height })
            .collect();

        let profile = self.api_version.profile();
        if self.api_version >= ApiVersion::V3_0 {
            info.formats = EXTRA_FORMATS_3.iter().map(|f| f.to_string()).collect();
            info.qualities = vec![Quality::Bitonal.token(self.api_version).to_string()];
        } else {
            info.formats = INFO_FORMATS.iter().map(|f| f.to_string()).collect();
            info.qualities = profile
                .allowed_qualities
                .iter()
                .map(|q| q.to_string())
                .collect();
        }
        if self.api_version >= ApiVersion::V2_1 {
            info.max_area = settings.limits.max_area;
            info.max_width = settings.limits.max_width;
            info.max_height = settings.limits.max_height;
        }
    }
}

/// Prefixes listed on the top-level index page.
#[derive(Debug, Clone, Default)]
pub struct ServerIndex {
    pub prefixes: Vec<String>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// An [`IiifError`] on its way to the client.
///
/// Carries what the response needs beyond the error itself: the XML body
/// used for 1.0 information requests and the compliance `Link` header.
#[derive(Debug)]
pub struct HandlerError {
    pub error: IiifError,
    xml: bool,
    link: Option<String>,
}

impl HandlerError {
    pub fn new(error: IiifError) -> Self {
        Self {
            error,
            xml: false,
            link: None,
        }
    }

    /// Render the body as the 1.0 XML error document.
    pub fn with_xml(mut self, xml: bool) -> Self {
        self.xml = xml;
        self
    }

    pub fn with_link(mut self, link: Option<String>) -> Self {
        self.link = link;
        self
    }

    /// HTTP status; path errors are reported as not found.
    pub fn status(&self) -> StatusCode {
        let code = match self.error.kind() {
            ErrorKind::RequestPath => 404,
            _ => self.error.code(),
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<IiifError> for HandlerError {
    fn from(error: IiifError) -> Self {
        HandlerError::new(error)
    }
}

/// Convert HandlerError to HTTP response.
///
/// This implementation logs errors appropriately based on their severity:
/// - 5xx errors are logged at ERROR level (server errors)
/// - 404s and zero-size requests are logged at DEBUG level (common and expected)
/// - other 4xx errors are logged at WARN level (client errors)
impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = &self.error;

        if status.is_server_error() {
            error!(
                status = status.as_u16(),
                parameter = %error.parameter(),
                "Server error: {}",
                error.text()
            );
        } else if status == StatusCode::NOT_FOUND || error.is_zero_size() {
            debug!(
                status = status.as_u16(),
                parameter = %error.parameter(),
                "Client error: {}",
                error.text()
            );
        } else {
            warn!(
                status = status.as_u16(),
                parameter = %error.parameter(),
                "Client error: {}",
                error.text()
            );
        }

        let (content_type, body) = if self.xml {
            ("application/xml", error.as_xml())
        } else {
            ("text/plain; charset=utf-8", error.as_txt())
        };

        let mut response = (status, [(header::CONTENT_TYPE, content_type)], body).into_response();
        let headers = response.headers_mut();
        for (name, value) in error.headers() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        if let Some(link) = self.link.as_deref() {
            if let Ok(value) = HeaderValue::from_str(link) {
                headers.insert(header::LINK, value);
            }
        }
        response
    }
}

/// Convert IiifError to HTTP response as a plain text error.
impl IntoResponse for IiifError {
    fn into_response(self) -> Response {
        HandlerError::from(self).into_response()
    }
}

// =============================================================================
// Content Negotiation
// =============================================================================

/// Media types from the Accept header, most preferred first.
///
/// Entries with `q=0` are dropped; ties keep header order.
pub fn accepted_media_types(headers: &HeaderMap) -> Vec<String> {
    let Some(accept) = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
    else {
        return Vec::new();
    };

    let mut entries: Vec<(f32, usize, String)> = accept
        .split(',')
        .enumerate()
        .filter_map(|(position, range)| {
            let mut parts = range.split(';');
            let media_type = parts.next()?.trim().to_ascii_lowercase();
            if media_type.is_empty() {
                return None;
            }
            let q = parts
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (q > 0.0).then_some((q, position, media_type))
        })
        .collect();

    entries.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
    });
    entries.into_iter().map(|(_, _, media_type)| media_type).collect()
}

/// Media type for an info document.
fn info_media_type(version: ApiVersion, headers: &HeaderMap) -> &'static str {
    let wants_ld = version >= ApiVersion::V1_1
        && accepted_media_types(headers)
            .iter()
            .any(|m| m == "application/ld+json");
    if wants_ld {
        "application/ld+json"
    } else {
        "application/json"
    }
}

/// Output format chosen from Accept, for 1.x requests without a format.
fn negotiated_format(headers: &HeaderMap) -> Option<&'static str> {
    accepted_media_types(headers)
        .iter()
        .find_map(|media_type| match media_type.as_str() {
            "image/jpeg" => Some("jpg"),
            "image/tiff" => Some("tif"),
            "image/png" => Some("png"),
            "image/gif" => Some("gif"),
            "application/pdf" => Some("pdf"),
            _ => None,
        })
}

/// Scheme and host the client used, e.g. `http://localhost:8000`.
fn server_base(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle CORS preflight requests for IIIF paths.
pub async fn options_handler() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                "Origin, Accept, Accept-Encoding, Authorization",
            ),
        ],
    )
        .into_response()
}

/// Handle the top-level index page.
///
/// # Endpoint
///
/// `GET /`
pub async fn root_index_handler(
    State(index): State<Arc<ServerIndex>>,
    headers: HeaderMap,
) -> Html<String> {
    let host = server_base(&headers);
    let entries: Vec<IndexEntry> = index
        .prefixes
        .iter()
        .map(|prefix| IndexEntry {
            label: prefix.clone(),
            links: vec![("index".to_string(), format!("/{}/", prefix))],
        })
        .collect();
    Html(index_page(
        &format!("IIIF Test Server on {}", host),
        "Image API handlers, named {version}_{engine}[_{auth}]:",
        &entries,
    ))
}

/// Handle the index page of one prefix.
///
/// # Endpoint
///
/// `GET /{prefix}/`
///
/// Lists each identifier with links to its info document and a few
/// example image requests.
pub async fn prefix_index_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Html<String>, HandlerError> {
    let identifiers = state
        .source
        .identifiers()
        .await
        .map_err(|e| state.error(e))?;

    let version = state.api_version;
    let quality = Quality::Default.token(version);
    let full = Size::default_for(version).render();
    let mut examples = vec![format!("full/{}/0/{}", full, quality)];
    if state.engine != EngineKind::Null {
        examples.push(format!("full/256,256/0/{}", quality));
        examples.push(format!("full/100,/30/{}", quality));
    }

    let entries: Vec<IndexEntry> = identifiers
        .iter()
        .map(|identifier| {
            let base = format!("/{}/{}", state.prefix, quote(identifier));
            let mut links = vec![("info".to_string(), format!("{}/info.json", base))];
            for example in &examples {
                links.push((example.clone(), format!("{}/{}", base, example)));
            }
            if state.settings.include_osd {
                links.push(("OSD".to_string(), format!("{}/osd.html", base)));
            }
            IndexEntry {
                label: identifier.clone(),
                links,
            }
        })
        .collect();

    let intro = format!(
        "host = {}, api_version = {}, engine = {}, auth_type = {}",
        server_base(&headers),
        version,
        state.engine,
        state
            .auth
            .as_deref()
            .map(|auth| auth.pattern.as_str())
            .unwrap_or("none"),
    );
    Ok(Html(index_page(
        &format!("IIIF Image API services under /{}", state.prefix),
        &intro,
        &entries,
    )))
}

/// Handle every IIIF request below a prefix.
///
/// # Endpoint
///
/// `GET /{prefix}/{*path}`
///
/// The raw (still percent-encoded) path is split so that identifiers may
/// carry an escaped `/`.
///
/// # Response
///
/// - `200 OK`: image, info document or viewer page
/// - `302 Found`: unauthorized request sent to the degraded identifier
/// - `303 See Other`: `{id}` or `{id}/` sent to `{id}/info.json`
/// - `400 Bad Request`: malformed parameter
/// - `401 Unauthorized`: info request with an invalid access token
/// - `404 Not Found`: unknown identifier or bad path
/// - `413`, `414`, `415`, `501`, `500`: see [`IiifError`]
pub async fn iiif_handler(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, HandlerError> {
    let mount = format!("/{}/", state.prefix);
    let path = uri.path().strip_prefix(mount.as_str()).unwrap_or_default();

    if path.len() > MAX_PATH_LENGTH {
        return Err(state.error(IiifError::uri_too_long(format!(
            "URI Too Long: Max {} chars, got {}",
            MAX_PATH_LENGTH,
            path.len()
        ))));
    }

    if let Some(identifier) = path.strip_suffix("/osd.html") {
        if state.settings.include_osd && !identifier.contains('/') {
            return Ok(osd_response(&state, identifier));
        }
    }

    // "{id}/" is the base URI as well
    let path = match path.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() && !stripped.contains('/') => stripped,
        _ => path,
    };

    let parser = RequestParser::new(state.api_version);
    match parser.split(path) {
        Ok(IiifPath::BaseUri { identifier }) => {
            let location = format!("/{}/{}/info.json", state.prefix, quote(&identifier));
            Ok(state.finish(Redirect::to(&location).into_response()))
        }
        Ok(IiifPath::Info { identifier, format }) => {
            info_response(&state, &identifier, &format, &headers)
                .await
                .map_err(|e| state.error(e).with_xml(state.api_version == ApiVersion::V1_0))
        }
        Ok(IiifPath::Image(segments)) => image_response(&state, path, segments, &headers)
            .await
            .map_err(|e| state.error(e)),
        Err(e) => Err(state.error(e)),
    }
}

fn osd_response(state: &AppState, raw_identifier: &str) -> Response {
    let identifier = unquote(raw_identifier);
    let page = osd_page(&identifier, "info.json", OsdAssets::Cdn);
    state.finish(Html(page).into_response())
}

/// Build the info document response.
async fn info_response(
    state: &AppState,
    identifier: &str,
    format: &str,
    headers: &HeaderMap,
) -> Result<Response, IiifError> {
    let (base, degraded) = state.base_identifier(identifier);
    if let Some(auth) = state.auth.as_deref() {
        if !degraded && !auth.info_authorized(headers) {
            if bearer_token(headers).is_some() {
                return Err(IiifError::unauthorized(
                    "Access token is not valid or has expired",
                ));
            }
            let location = format!(
                "/{}/{}-deg/info.{}",
                state.prefix,
                quote(identifier),
                format
            );
            info!(identifier = %identifier, "info: redirect to degraded");
            return Ok(state.finish(found(&location)));
        }
    }

    let source = state.resolve(base).await?;
    let (width, height) = state
        .dimensions
        .get_or_load(state.source.as_ref(), &source)
        .await?;
    info!(identifier = %identifier, width, height, degraded, "image information");

    let prefix_url = format!("{}/{}", server_base(headers), state.prefix);
    let mut info = ImageInfo::new(state.api_version)
        .with_identifier(format!("{}/{}", prefix_url, quote(identifier)))
        .with_dimensions(width, height)
        .with_level(state.engine.level());
    state.describe(&mut info, width, height);
    if let Some(auth) = state.auth.as_deref() {
        auth.descriptor_for(&prefix_url).add_services(&mut info);
    }

    let (content_type, body) = if format == "xml" {
        ("application/xml", info.as_xml())
    } else {
        (info_media_type(state.api_version, headers), info.as_json(true))
    };
    let body = body.map_err(|e| IiifError::internal(e.to_string()))?;

    let response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
        ],
        body,
    )
        .into_response();
    Ok(state.finish(response))
}

/// Run the derivation pipeline and build the image response.
async fn image_response(
    state: &AppState,
    path: &str,
    segments: ImageSegments,
    headers: &HeaderMap,
) -> Result<Response, IiifError> {
    let mut request = segments.parse(state.api_version)?;
    let identifier = request.identifier.clone();
    let (base, degraded) = state.base_identifier(&identifier);

    if let Some(auth) = state.auth.as_deref() {
        if !degraded && !auth.image_authorized(headers) {
            let rest = path.split_once('/').map(|(_, rest)| rest).unwrap_or_default();
            let location = format!("/{}/{}-deg/{}", state.prefix, quote(&identifier), rest);
            info!(identifier = %identifier, "image: redirect to degraded");
            return Ok(state.finish(found(&location)));
        }
    }
    if degraded {
        request.quality = Quality::Gray;
    }
    request.identifier = base.to_string();
    if state.api_version.is_v1() && request.format.is_none() {
        request.format = negotiated_format(headers).map(str::to_string);
    }

    let source = state.resolve(base).await?;
    let engine = state.engine;
    let limits = state.settings.limits;
    info!(identifier = %identifier, request = %request.path(), "image request");

    let (data, mime_type) =
        tokio::task::spawn_blocking(move || render(engine, &source, &request, limits))
            .await
            .map_err(|e| IiifError::internal(format!("Image task failed: {}", e)))??;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_type)
        .header(header::CACHE_CONTROL, state.cache_control())
        .body(Body::from(data))
        .map_err(|e| IiifError::internal(e.to_string()))?;
    Ok(state.finish(response))
}

/// Derive with a fresh engine, read the output and clean up.
///
/// Runs to completion on the blocking pool even if the client goes away,
/// so the temporary output is always removed.
fn render(
    kind: EngineKind,
    source: &Path,
    request: &Request,
    limits: MaxLimits,
) -> Result<(Bytes, &'static str), IiifError> {
    let mut engine = kind.create();
    let options = DeriveOptions {
        limits,
        outfile: None,
    };
    let saved = derive(engine.as_mut(), source, request, &options)?;
    let data = std::fs::read(&saved.path);
    engine.cleanup();
    Ok((Bytes::from(data?), saved.mime_type))
}

// =============================================================================
// Tests
// =============================================================================
