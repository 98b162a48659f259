//! Configuration management for the IIIF server.
//!
//! This module provides the command line interface:
//! - `serve` runs the HTTP server with one handler prefix per
//!   (version, engine, auth) combination
//! - `static` writes Level 0 tile sets to disk
//!
//! Options can also be set via environment variables with the `IIIF_` prefix.
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use iiif_server::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Static(config) => println!("Writing tiles to {}", config.dst.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `IIIF_HOST` - Server bind address (default: 0.0.0.0)
//! - `IIIF_PORT` - Server port (default: 8000)
//! - `IIIF_IMAGE_DIR` - Directory of source images (default: testimages)
//! - `IIIF_API_VERSIONS` - API versions to serve (default: 2.1)
//! - `IIIF_ENGINES` - Pixel engines to serve (default: image)
//! - `IIIF_AUTH_TYPES` - Auth patterns to serve (default: none)
//! - `IIIF_AUTH_SECRET` - Key for signing account cookies
//! - `IIIF_CACHE_INFOS` - Capacity of the image dimension cache (default: 1000)
//! - `IIIF_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::auth::{AuthPattern, DEFAULT_ACCESS_COOKIE_LIFETIME, DEFAULT_ACCESS_TOKEN_LIFETIME};
use crate::derive::{EngineKind, MaxLimits};
use crate::server::{ServerSettings, DEFAULT_CACHE_MAX_AGE};
use crate::source::DEFAULT_DIMENSION_CACHE_CAPACITY;
use crate::static_tiles::{StaticOptions, DEFAULT_TILESIZE};
use crate::version::ApiVersion;

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default directory of source images.
pub const DEFAULT_IMAGE_DIR: &str = "testimages";

/// Auth type meaning "no auth services".
pub const NO_AUTH: &str = "none";

// =============================================================================
// CLI Arguments
// =============================================================================

/// IIIF Image API server and static tile generator.
#[derive(Parser, Debug, Clone)]
#[command(name = "iiif-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the IIIF Image API server.
    Serve(ServeConfig),

    /// Generate static Level 0 tiles for one or more images.
    Static(StaticConfig),
}

// =============================================================================
// Serve Command
// =============================================================================

/// Options of `iiif-server serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "IIIF_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "IIIF_PORT")]
    pub port: u16,

    /// Directory holding the source images.
    #[arg(long, default_value = DEFAULT_IMAGE_DIR, env = "IIIF_IMAGE_DIR")]
    pub image_dir: PathBuf,

    // =========================================================================
    // Handler Prefixes
    // =========================================================================
    /// IIIF Image API versions to serve (comma-separated).
    #[arg(long, default_value = "2.1", env = "IIIF_API_VERSIONS", value_delimiter = ',')]
    pub api_versions: Vec<ApiVersion>,

    /// Pixel engines to serve: image, gen, null (comma-separated).
    #[arg(long, default_value = "image", env = "IIIF_ENGINES", value_delimiter = ',')]
    pub engines: Vec<EngineKind>,

    /// Auth patterns to serve: none, clickthrough, kiosk, external, basic
    /// (comma-separated).
    #[arg(long, default_value = NO_AUTH, env = "IIIF_AUTH_TYPES", value_delimiter = ',')]
    pub auth_types: Vec<String>,

    // =========================================================================
    // Image Configuration
    // =========================================================================
    /// Tile width advertised in info documents.
    #[arg(long, default_value_t = DEFAULT_TILESIZE, env = "IIIF_TILE_WIDTH")]
    pub tile_width: u32,

    /// Tile height advertised in info documents.
    #[arg(long, default_value_t = DEFAULT_TILESIZE, env = "IIIF_TILE_HEIGHT")]
    pub tile_height: u32,

    /// Fixed tile scale factors (comma-separated).
    ///
    /// If not specified, factors are computed from each image size.
    #[arg(long, env = "IIIF_SCALE_FACTORS", value_delimiter = ',')]
    pub scale_factors: Option<Vec<u32>>,

    /// Maximum pixel area of a `max` size.
    #[arg(long, env = "IIIF_MAX_AREA")]
    pub max_area: Option<u64>,

    /// Maximum width of a `max` size.
    #[arg(long, env = "IIIF_MAX_WIDTH")]
    pub max_width: Option<u32>,

    /// Maximum height of a `max` size (defaults to the maximum width).
    #[arg(long, env = "IIIF_MAX_HEIGHT")]
    pub max_height: Option<u32>,

    /// Serve an OpenSeadragon viewer at `{id}/osd.html`.
    #[arg(long, default_value_t = false, env = "IIIF_INCLUDE_OSD")]
    pub include_osd: bool,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Lifetime of access cookies in seconds.
    #[arg(long, default_value_t = DEFAULT_ACCESS_COOKIE_LIFETIME.as_secs(), env = "IIIF_ACCESS_COOKIE_LIFETIME")]
    pub access_cookie_lifetime: u64,

    /// Lifetime of access tokens in seconds.
    #[arg(long, default_value_t = DEFAULT_ACCESS_TOKEN_LIFETIME.as_secs(), env = "IIIF_ACCESS_TOKEN_LIFETIME")]
    pub access_token_lifetime: u64,

    /// Key for signing account cookies.
    ///
    /// If not provided, a random key is used and logins do not survive a
    /// restart.
    #[arg(long, env = "IIIF_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of image dimensions to cache.
    #[arg(long, default_value_t = DEFAULT_DIMENSION_CACHE_CAPACITY, env = "IIIF_CACHE_INFOS")]
    pub cache_infos: usize,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "IIIF_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins for preflight requests (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "IIIF_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.api_versions.is_empty() {
            return Err("At least one API version is required".to_string());
        }
        if self.engines.is_empty() {
            return Err("At least one engine is required".to_string());
        }
        if self.auth_patterns()?.is_empty() {
            return Err("At least one auth type is required (use 'none' for no auth)".to_string());
        }

        if self.tile_width == 0 || self.tile_height == 0 {
            return Err("tile_width and tile_height must be greater than 0".to_string());
        }
        if let Some(factors) = &self.scale_factors {
            if factors.is_empty() || factors.contains(&0) {
                return Err("scale_factors must be a list of positive integers".to_string());
            }
        }
        if self.max_area == Some(0) || self.max_width == Some(0) || self.max_height == Some(0) {
            return Err("max_area, max_width and max_height must be greater than 0".to_string());
        }

        if self.access_cookie_lifetime == 0 || self.access_token_lifetime == 0 {
            return Err("Access cookie and token lifetimes must be greater than 0".to_string());
        }
        if self.auth_secret.as_deref() == Some("") {
            return Err("auth_secret must not be empty".to_string());
        }

        if self.cache_infos == 0 {
            return Err("cache_infos must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsed auth types, `None` standing for "no auth".
    pub fn auth_patterns(&self) -> Result<Vec<Option<AuthPattern>>, String> {
        self.auth_types
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| match t {
                NO_AUTH => Ok(None),
                other => other.parse().map(Some),
            })
            .collect()
    }

    /// Settings shared by every handler prefix.
    pub fn server_settings(&self) -> ServerSettings {
        ServerSettings {
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            scale_factors: self.scale_factors.clone(),
            limits: MaxLimits::new(self.max_area, self.max_width, self.max_height),
            include_osd: self.include_osd,
            cache_max_age: self.cache_max_age,
        }
    }

    pub fn access_cookie_lifetime(&self) -> Duration {
        Duration::from_secs(self.access_cookie_lifetime)
    }

    pub fn access_token_lifetime(&self) -> Duration {
        Duration::from_secs(self.access_token_lifetime)
    }
}

// =============================================================================
// Static Command
// =============================================================================

/// Options of `iiif-server static`.
#[derive(Args, Debug, Clone)]
pub struct StaticConfig {
    /// Source image files.
    #[arg(required = true)]
    pub sources: Vec<PathBuf>,

    /// Destination directory for the tile sets.
    #[arg(long, default_value = "/tmp/iiif-static", env = "IIIF_STATIC_DST")]
    pub dst: PathBuf,

    /// Tile size in pixels.
    #[arg(long, default_value_t = DEFAULT_TILESIZE)]
    pub tilesize: u32,

    /// IIIF Image API version of the generated info.json.
    ///
    /// `1` is read as 1.1 and `2` as 2.0.
    #[arg(long, default_value = "2.0", value_parser = parse_static_api_version)]
    pub api_version: ApiVersion,

    /// Base URI the tiles will be published under.
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Identifier to use instead of the file name (single source only).
    #[arg(long)]
    pub identifier: Option<String>,

    /// Log the tiles that would be written without writing anything.
    #[arg(long, default_value_t = false)]
    pub dryrun: bool,

    /// Write an OpenSeadragon page per image into this directory.
    #[arg(long)]
    pub write_html: Option<PathBuf>,

    /// Pages load OpenSeadragon from a local `openseadragon/` copy.
    #[arg(long, default_value_t = false)]
    pub include_osd: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl StaticConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.sources.is_empty() {
            return Err("At least one source image is required".to_string());
        }
        if self.identifier.is_some() && self.sources.len() > 1 {
            return Err("--identifier can only be used with a single source image".to_string());
        }
        if self.tilesize == 0 {
            return Err("tilesize must be greater than 0".to_string());
        }
        if self.dst.is_file() {
            return Err(format!(
                "Destination {} exists and is not a directory",
                self.dst.display()
            ));
        }
        Ok(())
    }

    /// Generator options for this run.
    pub fn static_options(&self) -> StaticOptions {
        StaticOptions {
            dst: self.dst.clone(),
            tilesize: self.tilesize,
            api_version: self.api_version,
            prefix: self.prefix.clone(),
            identifier: self.identifier.clone(),
            dryrun: self.dryrun,
            write_html: self.write_html.clone(),
            include_osd: self.include_osd,
        }
    }
}

/// Parse a static API version, accepting the major-only shorthands.
fn parse_static_api_version(s: &str) -> Result<ApiVersion, String> {
    match s {
        "1" => Ok(ApiVersion::V1_1),
        "2" => Ok(ApiVersion::V2_0),
        "3" => Ok(ApiVersion::V3_0),
        other => other.parse(),
    }
}

// =============================================================================
// Tests
// =============================================================================
