//! Image API versions and the per-version profile table.
//!
//! All version-dependent behavior (default quality token, allowed tokens,
//! syntax extensions, context URIs and info document shape) is read from a
//! single static [`VersionProfile`] looked up with [`ApiVersion::profile`].

use std::fmt;
use std::str::FromStr;

// =============================================================================
// ApiVersion
// =============================================================================

/// A supported IIIF Image API version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ApiVersion {
    V1_0,
    V1_1,
    V2_0,
    #[default]
    V2_1,
    V3_0,
}

impl ApiVersion {
    /// Every supported version, oldest first.
    pub const ALL: [ApiVersion; 5] = [
        ApiVersion::V1_0,
        ApiVersion::V1_1,
        ApiVersion::V2_0,
        ApiVersion::V2_1,
        ApiVersion::V3_0,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApiVersion::V1_0 => "1.0",
            ApiVersion::V1_1 => "1.1",
            ApiVersion::V2_0 => "2.0",
            ApiVersion::V2_1 => "2.1",
            ApiVersion::V3_0 => "3.0",
        }
    }

    /// The profile record for this version.
    pub fn profile(&self) -> &'static VersionProfile {
        match self {
            ApiVersion::V1_0 => &PROFILE_1_0,
            ApiVersion::V1_1 => &PROFILE_1_1,
            ApiVersion::V2_0 => &PROFILE_2_0,
            ApiVersion::V2_1 => &PROFILE_2_1,
            ApiVersion::V3_0 => &PROFILE_3_0,
        }
    }

    /// True for the 1.x family.
    pub fn is_v1(&self) -> bool {
        *self < ApiVersion::V2_0
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApiVersion::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("Unsupported IIIF Image API version: {}", s))
    }
}

// =============================================================================
// Quality
// =============================================================================

/// Image quality, independent of the version-specific spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quality {
    /// `native` (1.x) or `default` (2.0+)
    Default,
    Color,
    /// `grey` (1.x) or `gray` (2.0+)
    Gray,
    Bitonal,
}

impl Quality {
    /// Token for this quality under the given version.
    pub fn token(&self, version: ApiVersion) -> &'static str {
        match (self, version.is_v1()) {
            (Quality::Default, true) => "native",
            (Quality::Default, false) => "default",
            (Quality::Color, _) => "color",
            (Quality::Gray, true) => "grey",
            (Quality::Gray, false) => "gray",
            (Quality::Bitonal, _) => "bitonal",
        }
    }

    /// Parse a quality token, accepting only the spelling of `version`.
    pub fn from_token(token: &str, version: ApiVersion) -> Option<Quality> {
        [Quality::Default, Quality::Color, Quality::Gray, Quality::Bitonal]
            .into_iter()
            .find(|q| q.token(version) == token)
    }
}

// =============================================================================
// ComplianceLevel
// =============================================================================

/// Compliance level 0, 1 or 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComplianceLevel {
    Level0,
    Level1,
    Level2,
}

impl ComplianceLevel {
    pub fn as_u8(&self) -> u8 {
        match self {
            ComplianceLevel::Level0 => 0,
            ComplianceLevel::Level1 => 1,
            ComplianceLevel::Level2 => 2,
        }
    }

    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(ComplianceLevel::Level0),
            1 => Some(ComplianceLevel::Level1),
            2 => Some(ComplianceLevel::Level2),
            _ => None,
        }
    }

    /// Bare token used as the 3.0 profile: `level0`, `level1`, `level2`.
    pub fn token(&self) -> String {
        format!("level{}", self.as_u8())
    }
}

// =============================================================================
// Profile table
// =============================================================================

/// Shape of the Image Information document for a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoStyle {
    /// Flat keys (`identifier`, `tile_width`, `scale_factors`); no context
    V1_0,
    /// Flat keys with `@context` and `@id`
    V1_1,
    /// `profile` list of compliance URI plus feature object; `tiles[]`
    V2,
    /// Bare level token with top-level `extra*` fields; `type`
    V3,
}

/// Static per-version record driving parsers and info serialization.
#[derive(Debug)]
pub struct VersionProfile {
    pub version: ApiVersion,
    pub default_quality: &'static str,
    pub allowed_qualities: &'static [&'static str],
    pub allows_square_region: bool,
    pub allows_max_size: bool,
    pub allows_full_size: bool,
    pub allows_caret_size: bool,
    pub allows_mirror: bool,
    /// Value of `@context`, if the version has one
    pub context: Option<&'static str>,
    /// Compliance URI, with `{N}` standing for the level number
    pub compliance_pattern: &'static str,
    /// JSON key used for the image identifier
    pub identifier_key: &'static str,
    pub protocol: Option<&'static str>,
    /// Value of `type`, 3.0 only
    pub service_type: Option<&'static str>,
    /// Accepted info request extensions
    pub info_formats: &'static [&'static str],
    /// Base URI for auth service profiles
    pub auth_profile_base: Option<&'static str>,
    pub info_style: InfoStyle,
}

impl VersionProfile {
    /// Compliance URI for a level.
    pub fn compliance_uri(&self, level: ComplianceLevel) -> String {
        self.compliance_pattern
            .replace("{N}", &level.as_u8().to_string())
    }

    /// Recover a compliance level from a compliance URI of this version.
    pub fn level_from_compliance(&self, uri: &str) -> Option<ComplianceLevel> {
        [
            ComplianceLevel::Level0,
            ComplianceLevel::Level1,
            ComplianceLevel::Level2,
        ]
        .into_iter()
        .find(|level| self.compliance_uri(*level) == uri || level.token() == uri)
    }

    pub fn quality_allowed(&self, token: &str) -> bool {
        self.allowed_qualities.contains(&token)
    }
}

const QUALITIES_1: &[&str] = &["native", "color", "grey", "bitonal"];
const QUALITIES_2: &[&str] = &["default", "color", "gray", "bitonal"];

static PROFILE_1_0: VersionProfile = VersionProfile {
    version: ApiVersion::V1_0,
    default_quality: "native",
    allowed_qualities: QUALITIES_1,
    allows_square_region: false,
    allows_max_size: false,
    allows_full_size: true,
    allows_caret_size: false,
    allows_mirror: false,
    context: None,
    compliance_pattern: "http://library.stanford.edu/iiif/image-api/compliance.html#level{N}",
    identifier_key: "identifier",
    protocol: None,
    service_type: None,
    info_formats: &["json", "xml"],
    auth_profile_base: None,
    info_style: InfoStyle::V1_0,
};

static PROFILE_1_1: VersionProfile = VersionProfile {
    version: ApiVersion::V1_1,
    default_quality: "native",
    allowed_qualities: QUALITIES_1,
    allows_square_region: false,
    allows_max_size: false,
    allows_full_size: true,
    allows_caret_size: false,
    allows_mirror: false,
    context: Some("http://library.stanford.edu/iiif/image-api/1.1/context.json"),
    compliance_pattern: "http://library.stanford.edu/iiif/image-api/1.1/compliance.html#level{N}",
    identifier_key: "@id",
    protocol: None,
    service_type: None,
    info_formats: &["json"],
    auth_profile_base: None,
    info_style: InfoStyle::V1_1,
};

static PROFILE_2_0: VersionProfile = VersionProfile {
    version: ApiVersion::V2_0,
    default_quality: "default",
    allowed_qualities: QUALITIES_2,
    allows_square_region: false,
    allows_max_size: false,
    allows_full_size: true,
    allows_caret_size: false,
    allows_mirror: true,
    context: Some("http://iiif.io/api/image/2/context.json"),
    compliance_pattern: "http://iiif.io/api/image/2/level{N}.json",
    identifier_key: "@id",
    protocol: Some("http://iiif.io/api/image"),
    service_type: None,
    info_formats: &["json"],
    auth_profile_base: Some("http://iiif.io/api/image/2/auth/"),
    info_style: InfoStyle::V2,
};

static PROFILE_2_1: VersionProfile = VersionProfile {
    version: ApiVersion::V2_1,
    default_quality: "default",
    allowed_qualities: QUALITIES_2,
    allows_square_region: true,
    allows_max_size: true,
    allows_full_size: true,
    allows_caret_size: false,
    allows_mirror: true,
    context: Some("http://iiif.io/api/image/2/context.json"),
    compliance_pattern: "http://iiif.io/api/image/2/level{N}.json",
    identifier_key: "@id",
    protocol: Some("http://iiif.io/api/image"),
    service_type: None,
    info_formats: &["json"],
    auth_profile_base: Some("http://iiif.io/api/image/2/auth/"),
    info_style: InfoStyle::V2,
};

static PROFILE_3_0: VersionProfile = VersionProfile {
    version: ApiVersion::V3_0,
    default_quality: "default",
    allowed_qualities: QUALITIES_2,
    allows_square_region: true,
    allows_max_size: true,
    allows_full_size: false,
    allows_caret_size: true,
    allows_mirror: true,
    context: Some("http://iiif.io/api/image/3/context.json"),
    compliance_pattern: "http://iiif.io/api/image/3/level{N}.json",
    identifier_key: "id",
    protocol: Some("http://iiif.io/api/image"),
    service_type: Some("ImageService3"),
    info_formats: &["json"],
    auth_profile_base: Some("http://iiif.io/api/auth/1/"),
    info_style: InfoStyle::V3,
};
