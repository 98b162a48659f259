//! IIIF request model.
//!
//! A request path is first split into segments ([`RequestParser::split`]),
//! yielding one of three [`IiifPath`] shapes: an image request, an
//! information request, or a bare identifier. Image request segments are
//! then parsed into a typed [`Request`] whose region, size, rotation and
//! quality are sum types rather than raw strings.
//!
//! # Example
//!
//! ```rust
//! use iiif_server::request::{IiifPath, Region, RequestParser};
//! use iiif_server::version::ApiVersion;
//!
//! let parser = RequestParser::new(ApiVersion::V2_1);
//! let request = match parser.split("id1/full/full/0/default.jpg").unwrap() {
//!     IiifPath::Image(segments) => segments.parse(ApiVersion::V2_1).unwrap(),
//!     _ => unreachable!(),
//! };
//! assert_eq!(request.identifier, "id1");
//! assert_eq!(request.region, Region::Full);
//! assert_eq!(request.url(), "id1/full/full/0/default.jpg");
//! ```

mod parse;
mod render;

pub use parse::{
    parse_format, parse_quality, parse_region, parse_rotation, parse_size, RequestParser,
    MAX_PATH_LENGTH,
};
pub use render::{info_url, quote, unquote};

use crate::version::{ApiVersion, Quality};

// =============================================================================
// Parameter Types
// =============================================================================

/// Region of the source image to process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Region {
    /// The whole image (`full`, or `pct:0,0,100,100`)
    Full,

    /// Centered square of side min(width, height) (2.1+)
    Square,

    /// Percentages of the image dimensions
    Pct { x: f64, y: f64, w: f64, h: f64 },

    /// Pixel coordinates
    Pixel { x: u32, y: u32, w: u32, h: u32 },
}

/// How the region is to be scaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeMode {
    /// `full` (up to 2.1)
    Full,

    /// `max` (2.1+)
    Max,

    /// `pct:p`
    Pct(f64),

    /// `w,` - height follows the region aspect ratio
    Width(u32),

    /// `,h` - width follows the region aspect ratio
    Height(u32),

    /// `w,h` - exact dimensions, aspect ratio not preserved
    Exact { w: u32, h: u32 },

    /// `!w,h` - largest size fitting in the box, aspect ratio preserved
    BestFit { w: u32, h: u32 },
}

/// Size parameter: a scaling mode plus the 3.0 upscaling opt-in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub mode: SizeMode,

    /// Set by a leading `^` (3.0 only)
    pub upscale: bool,
}

impl Size {
    pub fn new(mode: SizeMode) -> Self {
        Self {
            mode,
            upscale: false,
        }
    }

    pub fn upscaled(mode: SizeMode) -> Self {
        Self {
            mode,
            upscale: true,
        }
    }

    /// Size used when the size segment is absent.
    pub fn default_for(version: ApiVersion) -> Self {
        if version.profile().allows_full_size {
            Size::new(SizeMode::Full)
        } else {
            Size::new(SizeMode::Max)
        }
    }
}

/// Rotation parameter, `degrees` normalized into [0, 360).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rotation {
    pub mirror: bool,
    pub degrees: f64,
}

impl Rotation {
    pub fn new(mirror: bool, degrees: f64) -> Self {
        Self { mirror, degrees }
    }

    /// True when no rotation or mirroring is requested.
    pub fn is_identity(&self) -> bool {
        !self.mirror && self.degrees == 0.0
    }
}

// =============================================================================
// Request
// =============================================================================

/// A parsed image request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub api_version: ApiVersion,

    /// Prefix prepended when rendering URLs (including any trailing `/`)
    pub base_url: Option<String>,

    /// Decoded identifier
    pub identifier: String,

    pub region: Region,
    pub size: Size,
    pub rotation: Rotation,
    pub quality: Quality,

    /// Output format extension, if one was given
    pub format: Option<String>,
}

impl Request {
    /// A request for the whole image at full size in the default quality.
    pub fn new(api_version: ApiVersion, identifier: impl Into<String>) -> Self {
        Self {
            api_version,
            base_url: None,
            identifier: identifier.into(),
            region: Region::Full,
            size: Size::default_for(api_version),
            rotation: Rotation::default(),
            quality: Quality::Default,
            format: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = size;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

// =============================================================================
// Split Result
// =============================================================================

/// Decoded segments of an image request, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSegments {
    pub identifier: String,
    pub region: String,
    pub size: String,
    pub rotation: String,
    pub quality: String,
    pub format: Option<String>,
}

impl ImageSegments {
    /// Parse each segment under the rules of `version`.
    pub fn parse(&self, version: ApiVersion) -> Result<Request, crate::error::IiifError> {
        Ok(Request {
            api_version: version,
            base_url: None,
            identifier: self.identifier.clone(),
            region: parse_region(Some(self.region.as_str()), version)?,
            size: parse_size(Some(self.size.as_str()), version)?,
            rotation: parse_rotation(Some(self.rotation.as_str()), version)?,
            quality: parse_quality(Some(self.quality.as_str()), version)?,
            format: self.format.clone(),
        })
    }
}

/// Result of splitting a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IiifPath {
    /// `{identifier}/{region}/{size}/{rotation}/{quality}[.{format}]`
    Image(ImageSegments),

    /// `{identifier}/info.{format}`
    Info { identifier: String, format: String },

    /// `{identifier}` alone; usually redirected to the info document
    BaseUri { identifier: String },
}

impl IiifPath {
    pub fn identifier(&self) -> &str {
        match self {
            IiifPath::Image(segments) => &segments.identifier,
            IiifPath::Info { identifier, .. } => identifier,
            IiifPath::BaseUri { identifier } => identifier,
        }
    }
}
