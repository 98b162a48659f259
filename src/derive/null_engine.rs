//! Engine that can only pass the source through unchanged.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{IiifError, Parameter};
use crate::version::{ComplianceLevel, Quality};

use super::apply::RotationPolicy;
use super::engine::{OutputFormat, PixelEngine, SavedImage};

/// Serves the source file for full requests and refuses everything else.
///
/// Image dimensions are read from the file header only.
#[derive(Debug, Default)]
pub struct NullEngine {
    source: Option<PathBuf>,
}

impl NullEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PixelEngine for NullEngine {
    fn name(&self) -> &'static str {
        "null"
    }

    fn level(&self) -> ComplianceLevel {
        ComplianceLevel::Level0
    }

    fn rotation_policy(&self) -> RotationPolicy {
        RotationPolicy {
            only_90s: true,
            no_mirror: true,
        }
    }

    fn open(&mut self, source: &Path) -> Result<(u32, u32), IiifError> {
        let dimensions = image::image_dimensions(source)?;
        self.source = Some(source.to_path_buf());
        Ok(dimensions)
    }

    fn crop(&mut self, _x: u32, _y: u32, _w: u32, _h: u32) -> Result<(), IiifError> {
        Err(IiifError::unsupported(
            Parameter::Region,
            "Null manipulator supports only region=/full/.",
        ))
    }

    fn scale(&mut self, _w: u32, _h: u32) -> Result<(), IiifError> {
        Err(IiifError::unsupported(
            Parameter::Size,
            "Null manipulator supports only size=pct:100 and size=full.",
        ))
    }

    fn rotate(&mut self, _mirror: bool, _degrees: f64) -> Result<(), IiifError> {
        Err(IiifError::unsupported(
            Parameter::Rotation,
            "Null manipulator supports only rotation=(0|360).",
        ))
    }

    fn quality(&mut self, quality: Quality) -> Result<(), IiifError> {
        if quality != Quality::Default {
            return Err(IiifError::unsupported(
                Parameter::Quality,
                "Null manipulator supports only the default quality.",
            ));
        }
        Ok(())
    }

    fn save(
        &mut self,
        format: Option<OutputFormat>,
        outfile: Option<&Path>,
    ) -> Result<SavedImage, IiifError> {
        if format.is_some() {
            return Err(IiifError::unsupported_format(
                "Null manipulator does not support specification of output format.",
            ));
        }
        let source = self
            .source
            .as_deref()
            .ok_or_else(|| IiifError::internal("No source image opened"))?;
        let mime_type = OutputFormat::from_path(source)
            .map(|f| f.mime_type())
            .unwrap_or("application/octet-stream");

        let path = match outfile {
            Some(outfile) => {
                std::fs::copy(source, outfile).map_err(|e| {
                    IiifError::internal(format!("Failed to copy file ({}).", e))
                })?;
                outfile.to_path_buf()
            }
            None => source.to_path_buf(),
        };
        debug!(path = %path.display(), "null engine passthrough");
        Ok(SavedImage { path, mime_type })
    }

    fn cleanup(&mut self) {}
}
