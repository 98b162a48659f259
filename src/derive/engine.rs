//! Pixel engine capability.
//!
//! The pipeline drives an engine through a fixed sequence of calls:
//! `before`, `open`, then `crop`/`scale`/`rotate` when the request needs
//! them, then `quality`, `save` and `after`. An engine owns whatever it decoded and any
//! temporary output it wrote; `cleanup` (or dropping the engine) removes
//! that output.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::IiifError;
use crate::version::{ComplianceLevel, Quality};

use super::apply::RotationPolicy;

// =============================================================================
// OutputFormat
// =============================================================================

/// Output formats named by the Image API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpg,
    Png,
    Gif,
    Webp,
    Tif,
    Pdf,
    Jp2,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 7] = [
        OutputFormat::Jpg,
        OutputFormat::Png,
        OutputFormat::Gif,
        OutputFormat::Webp,
        OutputFormat::Tif,
        OutputFormat::Pdf,
        OutputFormat::Jp2,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Webp => "webp",
            OutputFormat::Tif => "tif",
            OutputFormat::Pdf => "pdf",
            OutputFormat::Jp2 => "jp2",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Tif => "image/tiff",
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Jp2 => "image/jp2",
        }
    }

    /// Format for a file extension, accepting the long spellings too.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpeg" => Some(OutputFormat::Jpg),
            "tiff" => Some(OutputFormat::Tif),
            other => OutputFormat::ALL
                .into_iter()
                .find(|f| f.extension() == other),
        }
    }

    /// Format for a media type, used for content negotiation.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        OutputFormat::ALL.into_iter().find(|f| f.mime_type() == mime)
    }

    /// Format of a file, by its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(OutputFormat::from_extension)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutputFormat::from_extension(s).ok_or_else(|| {
            IiifError::unsupported_format(format!("Unsupported output file format ({}).", s))
        })
    }
}

// =============================================================================
// SavedImage
// =============================================================================

/// Where the derived image was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub mime_type: &'static str,
}

// =============================================================================
// PixelEngine
// =============================================================================

/// Image operations backing the derivation pipeline.
///
/// Engines are used from a single task at a time and are not shared.
pub trait PixelEngine: Send {
    /// Short name, used in handler prefixes.
    fn name(&self) -> &'static str;

    /// Compliance level the engine can honor.
    fn level(&self) -> ComplianceLevel;

    /// Rotations the engine supports.
    fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy::default()
    }

    /// Called once before any other stage of a derivation.
    fn before(&mut self) -> Result<(), IiifError> {
        Ok(())
    }

    /// Load a source and return its `(width, height)`.
    fn open(&mut self, source: &Path) -> Result<(u32, u32), IiifError>;

    fn crop(&mut self, x: u32, y: u32, w: u32, h: u32) -> Result<(), IiifError>;

    fn scale(&mut self, w: u32, h: u32) -> Result<(), IiifError>;

    /// Mirror about the vertical axis first, then rotate clockwise.
    fn rotate(&mut self, mirror: bool, degrees: f64) -> Result<(), IiifError>;

    fn quality(&mut self, quality: Quality) -> Result<(), IiifError>;

    /// Write the result to `outfile`, or to a temporary file when `None`.
    fn save(
        &mut self,
        format: Option<OutputFormat>,
        outfile: Option<&Path>,
    ) -> Result<SavedImage, IiifError>;

    /// Called once the output has been saved.
    fn after(&mut self) -> Result<(), IiifError> {
        Ok(())
    }

    /// Remove any temporary output.
    fn cleanup(&mut self);
}

/// Available engine implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Decoding, processing and encoding with the `image` crate
    Image,

    /// Synthetic images computed from a pattern
    Gen,

    /// Passthrough of the source file, full requests only
    Null,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Image => "image",
            EngineKind::Gen => "gen",
            EngineKind::Null => "null",
        }
    }

    /// Create a fresh engine for one request.
    pub fn create(&self) -> Box<dyn PixelEngine> {
        match self {
            EngineKind::Image => Box::new(super::ImageEngine::new()),
            EngineKind::Gen => Box::new(super::GeneratorEngine::new()),
            EngineKind::Null => Box::new(super::NullEngine::new()),
        }
    }

    pub fn level(&self) -> ComplianceLevel {
        match self {
            EngineKind::Image | EngineKind::Gen => ComplianceLevel::Level2,
            EngineKind::Null => ComplianceLevel::Level0,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" | "pil" => Ok(EngineKind::Image),
            "gen" => Ok(EngineKind::Gen),
            "null" | "dummy" => Ok(EngineKind::Null),
            other => Err(format!("Unknown engine: {}", other)),
        }
    }
}
