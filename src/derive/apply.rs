//! Arguments for each pipeline stage, computed from the request and the
//! current image dimensions.

use crate::error::{IiifError, Parameter};
use crate::request::{Region, Rotation, Size, SizeMode};
use crate::version::{ApiVersion, Quality};

/// A pixel window `(x, y, w, h)` in source coordinates.
pub type Window = (u32, u32, u32, u32);

/// Server limits applied to the `max` size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaxLimits {
    pub max_area: Option<u64>,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl MaxLimits {
    /// Build limits; a lone `max_width` also bounds the height.
    pub fn new(max_area: Option<u64>, max_width: Option<u32>, max_height: Option<u32>) -> Self {
        Self {
            max_area,
            max_width,
            max_height: max_height.or(max_width),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_area.is_none() && self.max_width.is_none() && self.max_height.is_none()
    }
}

/// Rotations an engine is able to perform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Only 0, 90, 180 and 270 degrees
    pub only_90s: bool,

    /// Mirroring is not available
    pub no_mirror: bool,
}

/// Round half up and truncate, as every size computation does.
fn round_half_up(v: f64) -> u32 {
    (v + 0.5).floor() as u32
}

/// Round half up, refusing results that do not fit an image dimension.
fn checked_dimension(v: f64) -> Result<u32, IiifError> {
    let rounded = (v + 0.5).floor();
    if !rounded.is_finite() || rounded > f64::from(u32::MAX) {
        return Err(IiifError::payload_too_large(format!(
            "Requested size dimension ({}) is too large.",
            rounded
        ))
        .with_parameter(Parameter::Size));
    }
    Ok(rounded as u32)
}

/// Region window to crop, or `None` for the full image.
pub fn region_to_apply(region: &Region, width: u32, height: u32) -> Result<Option<Window>, IiifError> {
    let (x, y, w, h) = match *region {
        Region::Full => return Ok(None),
        Region::Square => {
            if width <= height {
                (0, (height - width) / 2, width, width)
            } else {
                ((width - height) / 2, 0, height, height)
            }
        }
        Region::Pct { x, y, w, h } => {
            if x == 0.0 && y == 0.0 && w == 100.0 && h == 100.0 {
                return Ok(None);
            }
            let (fw, fh) = (f64::from(width), f64::from(height));
            (
                round_half_up(x / 100.0 * fw),
                round_half_up(y / 100.0 * fh),
                round_half_up(w / 100.0 * fw),
                round_half_up(h / 100.0 * fh),
            )
        }
        Region::Pixel { x, y, w, h } => (x, y, w, h),
    };

    // Truncate at the right and bottom edges
    let w = if u64::from(x) + u64::from(w) > u64::from(width) {
        width.saturating_sub(x)
    } else {
        w
    };
    let h = if u64::from(y) + u64::from(h) > u64::from(height) {
        height.saturating_sub(y)
    } else {
        h
    };

    if w == 0 || h == 0 {
        return Err(IiifError::zero_size(
            Parameter::Region,
            "Region parameters would result in zero size result image.",
        ));
    }
    if x == 0 && y == 0 && w == width && h == height {
        return Ok(None);
    }
    Ok(Some((x, y, w, h)))
}

/// Largest size within `limits` for a `width` x `height` region.
///
/// Each limit is applied against the original dimensions so rounding
/// does not compound.
fn max_size(width: u32, height: u32, limits: &MaxLimits) -> (u32, u32) {
    let (fw, fh) = (f64::from(width), f64::from(height));
    let (mut w, mut h) = (width, height);

    if let Some(max_area) = limits.max_area {
        if u64::from(w) * u64::from(h) > max_area {
            let scale = (max_area as f64 / (fw * fh)).sqrt();
            w = (fw * scale) as u32;
            h = (fh * scale) as u32;
        }
    }
    if let Some(max_width) = limits.max_width {
        if w > max_width {
            w = max_width;
            h = round_half_up(fh * f64::from(max_width) / fw);
        }
    }
    if let Some(max_height) = limits.max_height {
        if h > max_height {
            h = max_height;
            w = round_half_up(fw * f64::from(max_height) / fh);
        }
    }
    (w, h)
}

/// Target size for the scale stage, or `None` to keep the region size.
pub fn size_to_apply(
    size: &Size,
    version: ApiVersion,
    width: u32,
    height: u32,
    limits: &MaxLimits,
) -> Result<Option<(u32, u32)>, IiifError> {
    let (fw, fh) = (f64::from(width), f64::from(height));

    let (w, h) = match size.mode {
        SizeMode::Full => return Ok(None),
        SizeMode::Pct(p) if p == 100.0 => return Ok(None),
        SizeMode::Max => max_size(width, height, limits),
        SizeMode::Pct(p) => (
            checked_dimension(fw * p / 100.0)?,
            checked_dimension(fh * p / 100.0)?,
        ),
        SizeMode::BestFit { w, h } => {
            let frac = (f64::from(w) / fw).min(f64::from(h) / fh);
            (checked_dimension(fw * frac)?, checked_dimension(fh * frac)?)
        }
        SizeMode::Exact { w, h } => (w, h),
        SizeMode::Width(w) => (w, checked_dimension(fh * f64::from(w) / fw)?),
        SizeMode::Height(h) => (checked_dimension(fw * f64::from(h) / fh)?, h),
    };

    if w == 0 || h == 0 {
        return Err(IiifError::zero_size(
            Parameter::Size,
            format!("Size parameter would result in zero size result image ({},{}).", w, h),
        ));
    }
    if version.profile().allows_caret_size && !size.upscale && (w > width || h > height) {
        return Err(IiifError::bad_request(
            Parameter::Size,
            format!(
                "Size ({},{}) is larger than the region ({},{}); upscaling requires ^.",
                w, h, width, height
            ),
        ));
    }
    if w == width && h == height {
        return Ok(None);
    }
    Ok(Some((w, h)))
}

/// Rotation to perform, checked against what the engine supports.
pub fn rotation_to_apply(rotation: &Rotation, policy: &RotationPolicy) -> Result<Rotation, IiifError> {
    if policy.no_mirror && rotation.mirror {
        return Err(IiifError::unsupported(
            Parameter::Rotation,
            "This implementation does not support mirroring.",
        ));
    }
    let right_angle =
        rotation.degrees.fract() == 0.0 && matches!(rotation.degrees as u32, 0 | 90 | 180 | 270);
    if policy.only_90s && !right_angle {
        return Err(IiifError::unsupported(
            Parameter::Rotation,
            "This implementation supports only 0,90,180,270 degree rotations.",
        ));
    }
    Ok(*rotation)
}

/// Quality to produce. Parsing already substitutes the version default.
pub fn quality_to_apply(quality: Quality) -> Quality {
    quality
}
