//! Router configuration for the IIIF server.
//!
//! Each handler prefix gets its own set of routes and its own state, so one
//! process can serve several API versions, engines and auth patterns side
//! by side.
//!
//! # Route Structure
//!
//! ```text
//! /                                  - Index of prefixes
//! /health                            - Health check
//! /{prefix}/                         - Index of identifiers
//! /{prefix}/{*path}                  - IIIF image, info and viewer requests
//! /{prefix}/login                    - Login service (auth only)
//! /{prefix}/logout                   - Logout service (basic auth only)
//! /{prefix}/token                    - Access token service (auth only)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use iiif_server::derive::EngineKind;
//! use iiif_server::server::{create_router, AppState, RouterConfig, ServerSettings};
//! use iiif_server::source::{DimensionCache, FilesystemSource};
//! use iiif_server::version::ApiVersion;
//!
//! let state = AppState::new(
//!     "2.1_image",
//!     ApiVersion::V2_1,
//!     EngineKind::Image,
//!     Arc::new(FilesystemSource::new("testimages")),
//!     Arc::new(DimensionCache::default()),
//!     Arc::new(ServerSettings::default()),
//! );
//! let router = create_router(vec![state], RouterConfig::new());
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{login_handler, logout_handler, token_handler};
use super::handlers::{
    health_handler, iiif_handler, options_handler, prefix_index_handler, root_index_handler,
    AppState, ServerIndex,
};
use crate::auth::AuthPattern;
use crate::derive::EngineKind;
use crate::version::ApiVersion;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins for preflight requests (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Tracing is enabled
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// IIIF responses still carry `Access-Control-Allow-Origin: *`; the
    /// list governs preflight answers.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

/// Name of a handler prefix: `{version}_{engine}[_{auth}]`.
pub fn prefix_name(version: ApiVersion, engine: EngineKind, auth: Option<AuthPattern>) -> String {
    match auth {
        Some(pattern) => format!("{}_{}_{}", version, engine, pattern),
        None => format!("{}_{}", version, engine),
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - The top-level index and health check
/// - The routes of every handler prefix in `states`
/// - CORS configuration
/// - Request tracing (optional)
pub fn create_router(states: Vec<AppState>, config: RouterConfig) -> Router {
    let index = Arc::new(ServerIndex {
        prefixes: states.iter().map(|state| state.prefix.clone()).collect(),
    });

    let mut router = Router::new()
        .route("/", get(root_index_handler))
        .route("/health", get(health_handler))
        .with_state(index);

    for state in states {
        router = router.merge(prefix_router(state));
    }

    let router = router.layer(build_cors_layer(&config));

    // Add tracing if enabled
    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Routes of a single handler prefix.
pub fn prefix_router(state: AppState) -> Router {
    let base = format!("/{}", state.prefix);

    let mut router = Router::new()
        .route(&base, get(prefix_index_handler))
        .route(&format!("{}/", base), get(prefix_index_handler))
        .route(
            &format!("{}/{{*path}}", base),
            get(iiif_handler).options(options_handler),
        );

    if let Some(auth) = state.auth.as_deref() {
        router = router
            .route(&format!("{}/login", base), get(login_handler))
            .route(&format!("{}/token", base), get(token_handler));
        if auth.pattern.has_logout() {
            router = router.route(&format!("{}/logout", base), get(logout_handler));
        }
    }

    router.with_state(state)
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
