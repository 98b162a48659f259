//! Path splitting and per-parameter parsers.

use crate::error::{IiifError, Parameter};
use crate::version::{ApiVersion, Quality};

use super::render::unquote;
use super::{IiifPath, ImageSegments, Region, Rotation, Size, SizeMode};

/// Longest request path accepted, in bytes.
pub const MAX_PATH_LENGTH: usize = 1024;

/// Longest accepted format extension.
const MAX_FORMAT_LENGTH: usize = 20;

// =============================================================================
// Path Split
// =============================================================================

/// Splits request paths into identifier and parameter segments.
#[derive(Debug, Clone, Default)]
pub struct RequestParser {
    pub api_version: ApiVersion,

    /// Prefix that must be present and is stripped before splitting
    pub base_url: Option<String>,

    /// Fold extra leading segments into the identifier
    pub allow_slashes_in_identifier: bool,
}

impl RequestParser {
    pub fn new(api_version: ApiVersion) -> Self {
        Self {
            api_version,
            base_url: None,
            allow_slashes_in_identifier: false,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_slashes_in_identifier(mut self, allow: bool) -> Self {
        self.allow_slashes_in_identifier = allow;
        self
    }

    /// Split a path into image, info or base URI form.
    ///
    /// Segments are separated on raw `/` and percent-decoded afterwards,
    /// so an identifier may carry `%2F`.
    pub fn split(&self, path: &str) -> Result<IiifPath, IiifError> {
        if path.len() > MAX_PATH_LENGTH {
            return Err(IiifError::uri_too_long(format!(
                "Request path too long ({} bytes, maximum {})",
                path.len(),
                MAX_PATH_LENGTH
            )));
        }

        let path = match &self.base_url {
            Some(base) => path.strip_prefix(base.as_str()).ok_or_else(|| {
                IiifError::request_path(format!(
                    "Request path does not start with base URL '{}'",
                    base
                ))
            })?,
            None => path,
        };

        let mut segments: Vec<String> = path.split('/').map(str::to_string).collect();
        if self.allow_slashes_in_identifier {
            segments = fold_identifier_segments(segments);
        }

        match segments.len() {
            5 => self.split_image(&segments),
            2 => self.split_info(&segments),
            1 => {
                let identifier = unquote(&segments[0]);
                if identifier.is_empty() {
                    return Err(IiifError::request_path("Empty request path"));
                }
                Ok(IiifPath::BaseUri { identifier })
            }
            n => Err(IiifError::request_path(format!(
                "Bad number of path segments ({}) in request",
                n
            ))),
        }
    }

    fn split_image(&self, segments: &[String]) -> Result<IiifPath, IiifError> {
        let identifier = unquote(&segments[0]);
        if identifier.is_empty() {
            return Err(IiifError::request_path("Empty identifier in image request"));
        }

        let quality_segment = unquote(&segments[4]);
        let (quality, format) = match quality_segment.rsplit_once('.') {
            Some((quality, format)) => (quality.to_string(), Some(parse_format(format)?)),
            None => (quality_segment, None),
        };

        Ok(IiifPath::Image(ImageSegments {
            identifier,
            region: unquote(&segments[1]),
            size: unquote(&segments[2]),
            rotation: unquote(&segments[3]),
            quality,
            format,
        }))
    }

    fn split_info(&self, segments: &[String]) -> Result<IiifPath, IiifError> {
        let identifier = unquote(&segments[0]);
        let last = unquote(&segments[1]);
        let format = last.strip_prefix("info.").ok_or_else(|| {
            IiifError::request_path(format!(
                "Bad information request, expected info.json but got '{}'",
                last
            ))
        })?;

        let allowed = self.api_version.profile().info_formats;
        if !allowed.contains(&format) {
            return Err(IiifError::bad_request(
                Parameter::Format,
                format!(
                    "Bad information request format '{}', must be one of: {}",
                    format,
                    allowed.join(", ")
                ),
            ));
        }
        if identifier.is_empty() {
            return Err(IiifError::request_path(
                "Empty identifier in information request",
            ));
        }

        Ok(IiifPath::Info {
            identifier,
            format: format.to_string(),
        })
    }
}

/// Fold leading segments into the identifier when slashes are allowed in it.
fn fold_identifier_segments(segments: Vec<String>) -> Vec<String> {
    let n = segments.len();
    let is_info = segments
        .last()
        .map(|s| s.starts_with("info."))
        .unwrap_or(false);

    if is_info && n > 2 {
        let identifier = segments[..n - 1].join("/");
        vec![identifier, segments[n - 1].clone()]
    } else if n > 5 {
        let mut folded = vec![segments[..n - 4].join("/")];
        folded.extend_from_slice(&segments[n - 4..]);
        folded
    } else {
        segments
    }
}

// =============================================================================
// Parameter Parsers
// =============================================================================

fn parse_float(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a non-negative integer made only of ASCII digits.
fn parse_non_negative_int(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Parse the region parameter.
pub fn parse_region(token: Option<&str>, version: ApiVersion) -> Result<Region, IiifError> {
    let token = match token {
        None | Some("full") => return Ok(Region::Full),
        Some("square") => {
            return if version.profile().allows_square_region {
                Ok(Region::Square)
            } else {
                Err(IiifError::bad_request(
                    Parameter::Region,
                    format!("Region 'square' is not supported in API version {}", version),
                ))
            };
        }
        Some(token) => token,
    };

    let (values, is_pct) = match token.strip_prefix("pct:") {
        Some(rest) => (rest, true),
        None => (token, false),
    };

    let parts: Vec<&str> = values.split(',').collect();
    if parts.len() != 4 {
        return Err(IiifError::bad_request(
            Parameter::Region,
            format!(
                "Bad number of values in region, must be x,y,w,h but got {} value(s) from '{}'",
                parts.len(),
                values
            ),
        ));
    }

    if is_pct {
        let mut v = [0.0f64; 4];
        for (slot, part) in v.iter_mut().zip(&parts) {
            let value = parse_float(part).ok_or_else(|| {
                IiifError::bad_request(
                    Parameter::Region,
                    format!("Bad floating point value for percentage in region ({})", part),
                )
            })?;
            if value < 0.0 {
                return Err(IiifError::bad_request(
                    Parameter::Region,
                    format!("Negative values not allowed in region ({})", part),
                ));
            }
            if value > 100.0 {
                return Err(IiifError::bad_request(
                    Parameter::Region,
                    format!("Percentage value over 100.0 in region ({})", part),
                ));
            }
            *slot = value;
        }
        let [x, y, w, h] = v;
        if w == 0.0 || h == 0.0 {
            return Err(IiifError::zero_size(
                Parameter::Region,
                format!("Zero size region specified ({})", token),
            ));
        }
        if x == 0.0 && y == 0.0 && w == 100.0 && h == 100.0 {
            return Ok(Region::Full);
        }
        Ok(Region::Pct { x, y, w, h })
    } else {
        let mut v = [0u32; 4];
        for (slot, part) in v.iter_mut().zip(&parts) {
            *slot = parse_non_negative_int(part).ok_or_else(|| {
                IiifError::bad_request(
                    Parameter::Region,
                    format!("Bad integer value in region ({})", part),
                )
            })?;
        }
        let [x, y, w, h] = v;
        if w == 0 || h == 0 {
            return Err(IiifError::zero_size(
                Parameter::Region,
                format!("Zero size region specified ({})", token),
            ));
        }
        Ok(Region::Pixel { x, y, w, h })
    }
}

/// Parse `w,h`, `w,` or `,h`.
fn parse_w_comma_h(s: &str) -> Result<(Option<u32>, Option<u32>), IiifError> {
    let (w, h) = s.split_once(',').ok_or_else(|| {
        IiifError::bad_request(Parameter::Size, format!("Bad size specification '{}'", s))
    })?;
    if h.contains(',') {
        return Err(IiifError::bad_request(
            Parameter::Size,
            format!("Too many values in size '{}'", s),
        ));
    }

    let component = |value: &str, name: &str| -> Result<Option<u32>, IiifError> {
        if value.is_empty() {
            return Ok(None);
        }
        parse_non_negative_int(value).map(Some).ok_or_else(|| {
            IiifError::bad_request(
                Parameter::Size,
                format!("Failed to extract integer value for {} from '{}'", name, s),
            )
        })
    };

    let w = component(w, "w")?;
    let h = component(h, "h")?;
    match (w, h) {
        (None, None) => Err(IiifError::bad_request(
            Parameter::Size,
            "Must specify at least one of w,h",
        )),
        (Some(0), _) | (_, Some(0)) => Err(IiifError::zero_size(
            Parameter::Size,
            format!("Size parameters request zero size result image ({})", s),
        )),
        wh => Ok(wh),
    }
}

/// Parse the size parameter.
pub fn parse_size(token: Option<&str>, version: ApiVersion) -> Result<Size, IiifError> {
    let profile = version.profile();
    let Some(token) = token else {
        return Ok(Size::default_for(version));
    };

    let (upscale, token) = match token.strip_prefix('^') {
        Some(rest) if profile.allows_caret_size => (true, rest),
        Some(_) => {
            return Err(IiifError::bad_request(
                Parameter::Size,
                format!("Size prefix '^' is not supported in API version {}", version),
            ))
        }
        None => (false, token),
    };

    let mode = if token == "full" {
        if !profile.allows_full_size {
            return Err(IiifError::bad_request(
                Parameter::Size,
                format!("Size 'full' is not supported in API version {}", version),
            ));
        }
        SizeMode::Full
    } else if token == "max" {
        if !profile.allows_max_size {
            return Err(IiifError::bad_request(
                Parameter::Size,
                format!("Size 'max' is not supported in API version {}", version),
            ));
        }
        SizeMode::Max
    } else if let Some(pct) = token.strip_prefix("pct:") {
        let value = parse_float(pct).ok_or_else(|| {
            IiifError::bad_request(
                Parameter::Size,
                format!("Percentage size value must be a number, got '{}'", pct),
            )
        })?;
        if value < 0.0 {
            return Err(IiifError::bad_request(
                Parameter::Size,
                format!("Size percentage must not be negative, got {}", value),
            ));
        }
        SizeMode::Pct(value)
    } else if let Some(box_wh) = token.strip_prefix('!') {
        match parse_w_comma_h(box_wh)? {
            (Some(w), Some(h)) => SizeMode::BestFit { w, h },
            _ => {
                return Err(IiifError::bad_request(
                    Parameter::Size,
                    "Both w,h must be specified in !w,h requests",
                ))
            }
        }
    } else {
        match parse_w_comma_h(token)? {
            (Some(w), Some(h)) => SizeMode::Exact { w, h },
            (Some(w), None) => SizeMode::Width(w),
            (None, Some(h)) => SizeMode::Height(h),
            (None, None) => {
                return Err(IiifError::bad_request(
                    Parameter::Size,
                    "Must specify at least one of w,h",
                ))
            }
        }
    };

    Ok(Size { mode, upscale })
}

/// Parse the rotation parameter.
pub fn parse_rotation(token: Option<&str>, version: ApiVersion) -> Result<Rotation, IiifError> {
    let Some(token) = token else {
        return Ok(Rotation::default());
    };

    let (mirror, degrees) = match token.strip_prefix('!') {
        Some(rest) if version.profile().allows_mirror => (true, rest),
        Some(_) => {
            return Err(IiifError::bad_request(
                Parameter::Rotation,
                format!("Mirroring is not supported in API version {}", version),
            ))
        }
        None => (false, token),
    };

    let value = parse_float(degrees).ok_or_else(|| {
        IiifError::bad_request(
            Parameter::Rotation,
            format!("Bad rotation value, must be a number, got '{}'", degrees),
        )
    })?;
    if !(0.0..=360.0).contains(&value) {
        return Err(IiifError::bad_request(
            Parameter::Rotation,
            format!("Illegal rotation value, must be 0 <= rotation <= 360, got {}", value),
        ));
    }

    // 360 is accepted and means 0; also folds -0.0
    let degrees = if value == 360.0 || value == 0.0 { 0.0 } else { value };
    Ok(Rotation { mirror, degrees })
}

/// Parse the quality parameter; absent means the version default.
pub fn parse_quality(token: Option<&str>, version: ApiVersion) -> Result<Quality, IiifError> {
    let Some(token) = token else {
        return Ok(Quality::Default);
    };
    Quality::from_token(token, version).ok_or_else(|| {
        IiifError::bad_request(
            Parameter::Quality,
            format!(
                "The quality parameter must be one of {}, got '{}'",
                version.profile().allowed_qualities.join(", "),
                token
            ),
        )
    })
}

/// Check a format extension: a letter then letters, digits or `_`.
pub fn parse_format(token: &str) -> Result<String, IiifError> {
    let mut chars = token.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && token.len() <= MAX_FORMAT_LENGTH;
    if valid {
        Ok(token.to_string())
    } else {
        Err(IiifError::bad_request(
            Parameter::Format,
            format!("Bad format parameter '{}'", token),
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================
