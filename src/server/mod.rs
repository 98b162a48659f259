//! HTTP server layer for the IIIF Image API.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   GET /{prefix}/{id}/{region}/{size}/{rotation}/{quality}.fmt   │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │ (IIIF, info)│  │(login/token)│  │ (one set per prefix)    │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! │                   ┌─────────────┐                               │
//! │                   │   viewer    │                               │
//! │                   │ (HTML pages)│                               │
//! │                   └─────────────┘                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;
pub mod viewer;

pub use auth::{
    bearer_token, cookie_value, login_handler, logout_handler, token_handler, AuthState,
    TokenQueryParams, TokenResponse, CLOSE_WINDOW_HTML,
};
pub use handlers::{
    accepted_media_types, health_handler, iiif_handler, options_handler, prefix_index_handler,
    root_index_handler, AppState, HandlerError, HealthResponse, ServerIndex, ServerSettings,
    DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, prefix_name, prefix_router, RouterConfig};
pub use viewer::{index_page, osd_page, IndexEntry, OsdAssets};
