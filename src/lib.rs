//! # IIIF Server
//!
//! An implementation of the IIIF Image API, versions 1.0, 1.1, 2.0, 2.1 and
//! 3.0, together with a generator for static Level 0 tile sets.
//!
//! ## Features
//!
//! - **Request parsing**: Region, size, rotation, quality and format
//!   parameters with the grammar and defaults of each API version
//! - **Info documents**: Version-aware JSON (and 1.0 XML) with tiles, sizes
//!   and auth services
//! - **Derivation pipeline**: Crop, scale, rotate, re-color and encode via
//!   pluggable pixel engines
//! - **Authentication**: Login, token and logout services with degraded
//!   images for unauthorized clients
//! - **Static tiles**: Level 0 tile sets that any web server can publish
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`version`] - API versions and their grammar differences
//! - [`request`] - Request model, URL parser and canonical rendering
//! - [`info`] - Image information documents
//! - [`mod@derive`] - Derivation pipeline and pixel engines
//! - [`auth`] - Auth service descriptor, access cookies and tokens
//! - [`source`] - Identifier resolution and the dimension cache
//! - [`static_tiles`] - Static Level 0 tile generator
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust
//! use iiif_server::{ApiVersion, IiifPath, RequestParser};
//!
//! let parser = RequestParser::new(ApiVersion::V3_0);
//! match parser.split("id1/info.json").unwrap() {
//!     IiifPath::Info { identifier, format } => {
//!         assert_eq!(identifier, "id1");
//!         assert_eq!(format, "json");
//!     }
//!     _ => unreachable!(),
//! }
//! ```

pub mod auth;
pub mod config;
pub mod derive;
pub mod error;
pub mod info;
pub mod request;
pub mod server;
pub mod source;
pub mod static_tiles;
pub mod version;

// Re-export commonly used types
pub use auth::{AccessStore, AccountSigner, AuthDescriptor, AuthError, AuthPattern};
pub use config::{Cli, Command, ServeConfig, StaticConfig};
pub use derive::{
    derive, DeriveOptions, EngineKind, GeneratorEngine, ImageEngine, MaxLimits, NullEngine,
    OutputFormat, PixelEngine, PixelGen, SavedImage,
};
pub use error::{ErrorKind, IiifError, InfoError, Parameter};
pub use info::{ImageInfo, SizeEntry, TileDescriptor};
pub use request::{
    IiifPath, ImageSegments, Region, Request, RequestParser, Rotation, Size, SizeMode,
};
pub use server::{create_router, AppState, AuthState, RouterConfig, ServerSettings};
pub use source::{DimensionCache, FilesystemSource, GeneratorSource, ImageSource};
pub use static_tiles::{StaticGenerator, StaticOptions, StaticReport};
pub use version::{ApiVersion, ComplianceLevel, Quality};
