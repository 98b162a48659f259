//! Image derivation pipeline.
//!
//! A request is applied to a source image in a fixed order:
//!
//! ```text
//! before -> open -> region -> size -> rotation -> quality -> format -> after
//! ```
//!
//! Each stage computes its arguments from the request and the dimensions
//! left by the previous stage ([`region_to_apply`], [`size_to_apply`],
//! [`rotation_to_apply`], [`quality_to_apply`]) and then calls the
//! [`PixelEngine`]. Stages that turn out to be no-ops are not sent to the
//! engine, so an engine that only supports full requests still serves them.

mod apply;
pub mod engine;
mod generator;
mod image_engine;
mod null_engine;

pub use apply::{
    quality_to_apply, region_to_apply, rotation_to_apply, size_to_apply, MaxLimits,
    RotationPolicy, Window,
};
pub use engine::{EngineKind, OutputFormat, PixelEngine, SavedImage};
pub use generator::{GeneratorEngine, PixelGen, MAX_GENERATED_PIXELS};
pub use image_engine::{ImageEngine, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_ALLOC};
pub use null_engine::NullEngine;

use std::path::Path;

use tracing::debug;

use crate::error::IiifError;
use crate::request::Request;

/// Current image dimensions as the pipeline advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Options that are not part of the request.
#[derive(Debug, Clone, Default)]
pub struct DeriveOptions<'a> {
    /// Limits for the `max` size
    pub limits: MaxLimits,

    /// Write here instead of a temporary file
    pub outfile: Option<&'a Path>,
}

fn region_stage(
    engine: &mut dyn PixelEngine,
    request: &Request,
    dims: Dimensions,
) -> Result<Dimensions, IiifError> {
    match region_to_apply(&request.region, dims.width, dims.height)? {
        None => Ok(dims),
        Some((x, y, w, h)) => {
            engine.crop(x, y, w, h)?;
            Ok(Dimensions {
                width: w,
                height: h,
            })
        }
    }
}

fn size_stage(
    engine: &mut dyn PixelEngine,
    request: &Request,
    dims: Dimensions,
    limits: &MaxLimits,
) -> Result<Dimensions, IiifError> {
    match size_to_apply(&request.size, request.api_version, dims.width, dims.height, limits)? {
        None => Ok(dims),
        Some((w, h)) => {
            engine.scale(w, h)?;
            Ok(Dimensions {
                width: w,
                height: h,
            })
        }
    }
}

fn rotation_stage(
    engine: &mut dyn PixelEngine,
    request: &Request,
    dims: Dimensions,
) -> Result<Dimensions, IiifError> {
    let rotation = rotation_to_apply(&request.rotation, &engine.rotation_policy())?;
    if rotation.is_identity() {
        return Ok(dims);
    }
    engine.rotate(rotation.mirror, rotation.degrees)?;
    if rotation.degrees == 90.0 || rotation.degrees == 270.0 {
        Ok(Dimensions {
            width: dims.height,
            height: dims.width,
        })
    } else {
        Ok(dims)
    }
}

fn quality_stage(
    engine: &mut dyn PixelEngine,
    request: &Request,
    dims: Dimensions,
) -> Result<Dimensions, IiifError> {
    engine.quality(quality_to_apply(request.quality))?;
    Ok(dims)
}

/// Run the full pipeline for `request` against `source`.
///
/// On error any temporary output is removed before returning. On success
/// the caller reads the output and then calls [`PixelEngine::cleanup`].
pub fn derive(
    engine: &mut dyn PixelEngine,
    source: &Path,
    request: &Request,
    options: &DeriveOptions<'_>,
) -> Result<SavedImage, IiifError> {
    let result = run_stages(engine, source, request, options);
    if result.is_err() {
        engine.cleanup();
    }
    result
}

fn run_stages(
    engine: &mut dyn PixelEngine,
    source: &Path,
    request: &Request,
    options: &DeriveOptions<'_>,
) -> Result<SavedImage, IiifError> {
    let format = request
        .format
        .as_deref()
        .map(str::parse::<OutputFormat>)
        .transpose()?;

    engine.before()?;
    let (width, height) = engine.open(source)?;
    let dims = Dimensions { width, height };
    let dims = region_stage(engine, request, dims)?;
    let dims = size_stage(engine, request, dims, &options.limits)?;
    let dims = rotation_stage(engine, request, dims)?;
    let dims = quality_stage(engine, request, dims)?;
    debug!(
        engine = engine.name(),
        request = %request.path(),
        width = dims.width,
        height = dims.height,
        "derived image"
    );
    let saved = engine.save(format, options.outfile)?;
    engine.after()?;
    Ok(saved)
}
