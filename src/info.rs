//! Image Information document.
//!
//! [`ImageInfo`] holds the version-independent content of an info document
//! and serializes it in the shape required by its API version:
//!
//! | Version | Identifier key | Profile | Tiles |
//! |---------|----------------|---------|-------|
//! | 1.0 | `identifier` | compliance URI | flat `tile_width`/`scale_factors` |
//! | 1.1 | `@id` | compliance URI | flat `tile_width`/`scale_factors` |
//! | 2.0, 2.1 | `@id` | `[uri, {formats, qualities, supports}]` | `tiles[]` |
//! | 3.0 | `id` | `"levelN"` plus top-level `extra*` | `tiles[]` |
//!
//! Output is pretty-printed JSON with keys in sorted order. Reading
//! detects the version from `@context` and accepts both tile forms.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{xml_escape, InfoError, IIIF_1_0_NS};
use crate::version::{ApiVersion, ComplianceLevel, InfoStyle};

/// Context alias accepted for 1.1 documents.
const CONTEXT_1_ALIAS: &str = "http://iiif.io/api/image/1/context.json";

// =============================================================================
// Document Parts
// =============================================================================

/// One family of precomputed tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub width: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(rename = "scaleFactors", default)]
    pub scale_factors: Vec<u32>,
}

/// A preferred downscaled size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEntry {
    pub width: u32,
    pub height: u32,
}

// =============================================================================
// ImageInfo
// =============================================================================

/// Content of an Image Information document.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    pub api_version: ApiVersion,

    /// Image URI: server, prefix and escaped identifier
    pub identifier: Option<String>,

    pub width: Option<u32>,
    pub height: Option<u32>,
    pub level: ComplianceLevel,
    pub tiles: Vec<TileDescriptor>,
    pub sizes: Vec<SizeEntry>,

    /// Formats beyond those implied by the compliance level
    pub formats: Vec<String>,

    /// Qualities beyond those implied by the compliance level
    pub qualities: Vec<String>,

    /// Features beyond those implied by the compliance level
    pub supports: Vec<String>,

    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub max_area: Option<u64>,

    /// `rights` (3.0) or `license` (2.x)
    pub rights: Option<String>,

    /// Extension contexts appended to the 3.0 context
    pub extra_contexts: Vec<String>,

    /// Embedded service blocks (auth)
    pub services: Vec<Value>,
}

impl ImageInfo {
    pub fn new(api_version: ApiVersion) -> Self {
        Self {
            api_version,
            identifier: None,
            width: None,
            height: None,
            level: ComplianceLevel::Level1,
            tiles: Vec::new(),
            sizes: Vec::new(),
            formats: Vec::new(),
            qualities: Vec::new(),
            supports: Vec::new(),
            max_width: None,
            max_height: None,
            max_area: None,
            rights: None,
            extra_contexts: Vec::new(),
            services: Vec::new(),
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_level(mut self, level: ComplianceLevel) -> Self {
        self.level = level;
        self
    }

    /// Set a single tile family from 1.1-style values.
    pub fn set_tiling(&mut self, tile_width: u32, tile_height: Option<u32>, scale_factors: Vec<u32>) {
        let height = tile_height.filter(|h| *h != tile_width);
        self.tiles = vec![TileDescriptor {
            width: tile_width,
            height,
            scale_factors,
        }];
    }

    /// 1.1-style tile width, from the first tile descriptor.
    pub fn tile_width(&self) -> Option<u32> {
        self.tiles.first().map(|t| t.width)
    }

    /// 1.1-style tile height; equals the width when not given.
    pub fn tile_height(&self) -> Option<u32> {
        self.tiles.first().map(|t| t.height.unwrap_or(t.width))
    }

    /// 1.1-style scale factors.
    pub fn scale_factors(&self) -> Option<&[u32]> {
        self.tiles.first().map(|t| t.scale_factors.as_slice())
    }

    /// Compliance URI for the level under this version.
    pub fn compliance(&self) -> String {
        self.api_version.profile().compliance_uri(self.level)
    }

    /// Check required fields are present.
    pub fn validate(&self) -> Result<(), InfoError> {
        if self.identifier.is_none() {
            return Err(InfoError::Missing("identifier"));
        }
        if self.width.is_none() {
            return Err(InfoError::Missing("width"));
        }
        if self.height.is_none() {
            return Err(InfoError::Missing("height"));
        }
        Ok(())
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Serialize as a JSON value in the shape of this version.
    pub fn to_value(&self) -> Value {
        let profile = self.api_version.profile();
        let mut obj = Map::new();

        match (profile.context, profile.info_style) {
            (Some(context), InfoStyle::V3) if !self.extra_contexts.is_empty() => {
                let mut contexts: Vec<Value> = self
                    .extra_contexts
                    .iter()
                    .map(|c| Value::String(c.clone()))
                    .collect();
                contexts.push(Value::String(context.to_string()));
                obj.insert("@context".into(), Value::Array(contexts));
            }
            (Some(context), _) => {
                obj.insert("@context".into(), json!(context));
            }
            (None, _) => {}
        }

        if let Some(identifier) = &self.identifier {
            obj.insert(profile.identifier_key.into(), json!(identifier));
        }
        if let Some(protocol) = profile.protocol {
            obj.insert("protocol".into(), json!(protocol));
        }
        if let Some(service_type) = profile.service_type {
            obj.insert("type".into(), json!(service_type));
        }
        if let Some(width) = self.width {
            obj.insert("width".into(), json!(width));
        }
        if let Some(height) = self.height {
            obj.insert("height".into(), json!(height));
        }

        match profile.info_style {
            InfoStyle::V1_0 | InfoStyle::V1_1 => self.write_v1(&mut obj),
            InfoStyle::V2 => self.write_v2(&mut obj),
            InfoStyle::V3 => self.write_v3(&mut obj),
        }

        match self.services.len() {
            0 => {}
            1 => {
                obj.insert("service".into(), self.services[0].clone());
            }
            _ => {
                obj.insert("service".into(), Value::Array(self.services.clone()));
            }
        }

        Value::Object(obj)
    }

    fn write_v1(&self, obj: &mut Map<String, Value>) {
        obj.insert("profile".into(), json!(self.compliance()));
        if let Some(tile) = self.tiles.first() {
            obj.insert("tile_width".into(), json!(tile.width));
            obj.insert("tile_height".into(), json!(tile.height.unwrap_or(tile.width)));
            if !tile.scale_factors.is_empty() {
                obj.insert("scale_factors".into(), json!(tile.scale_factors));
            }
        }
        if !self.formats.is_empty() {
            obj.insert("formats".into(), json!(self.formats));
        }
        if !self.qualities.is_empty() {
            obj.insert("qualities".into(), json!(self.qualities));
        }
    }

    fn write_v2(&self, obj: &mut Map<String, Value>) {
        let mut features = Map::new();
        if !self.formats.is_empty() {
            features.insert("formats".into(), json!(self.formats));
        }
        if !self.qualities.is_empty() {
            features.insert("qualities".into(), json!(self.qualities));
        }
        if !self.supports.is_empty() {
            features.insert("supports".into(), json!(self.supports));
        }
        self.insert_limits(&mut features);

        let mut profile = vec![json!(self.compliance())];
        if !features.is_empty() {
            profile.push(Value::Object(features));
        }
        obj.insert("profile".into(), Value::Array(profile));

        self.insert_tiles_and_sizes(obj);
        if let Some(rights) = &self.rights {
            obj.insert("license".into(), json!(rights));
        }
    }

    fn write_v3(&self, obj: &mut Map<String, Value>) {
        obj.insert("profile".into(), json!(self.level.token()));
        if !self.formats.is_empty() {
            obj.insert("extraFormats".into(), json!(self.formats));
        }
        if !self.qualities.is_empty() {
            obj.insert("extraQualities".into(), json!(self.qualities));
        }
        if !self.supports.is_empty() {
            obj.insert("extraFeatures".into(), json!(self.supports));
        }
        self.insert_limits(obj);
        self.insert_tiles_and_sizes(obj);
        if let Some(rights) = &self.rights {
            obj.insert("rights".into(), json!(rights));
        }
    }

    fn insert_limits(&self, obj: &mut Map<String, Value>) {
        if let Some(v) = self.max_width {
            obj.insert("maxWidth".into(), json!(v));
        }
        if let Some(v) = self.max_height {
            obj.insert("maxHeight".into(), json!(v));
        }
        if let Some(v) = self.max_area {
            obj.insert("maxArea".into(), json!(v));
        }
    }

    fn insert_tiles_and_sizes(&self, obj: &mut Map<String, Value>) {
        if !self.tiles.is_empty() {
            obj.insert("tiles".into(), json!(self.tiles));
        }
        if !self.sizes.is_empty() {
            obj.insert("sizes".into(), json!(self.sizes));
        }
    }

    /// Pretty-printed JSON, validated first unless `validate` is false.
    pub fn as_json(&self, validate: bool) -> Result<String, InfoError> {
        if validate {
            self.validate()?;
        }
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    /// XML info document of Image API 1.0.
    pub fn as_xml(&self) -> Result<String, InfoError> {
        self.validate()?;
        let mut s = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        s.push_str(&format!("<info xmlns=\"{}\">\n", IIIF_1_0_NS));
        if let Some(identifier) = &self.identifier {
            s.push_str(&format!("  <identifier>{}</identifier>\n", xml_escape(identifier)));
        }
        if let (Some(width), Some(height)) = (self.width, self.height) {
            s.push_str(&format!("  <width>{}</width>\n", width));
            s.push_str(&format!("  <height>{}</height>\n", height));
        }
        if let Some(scale_factors) = self.scale_factors().filter(|sf| !sf.is_empty()) {
            s.push_str("  <scale_factors>\n");
            for sf in scale_factors {
                s.push_str(&format!("    <scale_factor>{}</scale_factor>\n", sf));
            }
            s.push_str("  </scale_factors>\n");
        }
        if let (Some(tw), Some(th)) = (self.tile_width(), self.tile_height()) {
            s.push_str(&format!("  <tile_width>{}</tile_width>\n", tw));
            s.push_str(&format!("  <tile_height>{}</tile_height>\n", th));
        }
        write_xml_list(&mut s, "formats", "format", &self.formats);
        write_xml_list(&mut s, "qualities", "quality", &self.qualities);
        s.push_str(&format!("  <profile>{}</profile>\n", xml_escape(&self.compliance())));
        s.push_str("</info>\n");
        Ok(s)
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Read an info document.
    ///
    /// The version is taken from `@context`. A `version_hint` is required
    /// for documents without a context (1.0), picks 2.0 over 2.1, and must
    /// otherwise agree with the context.
    pub fn from_json(data: &str, version_hint: Option<ApiVersion>) -> Result<Self, InfoError> {
        let value: Value = serde_json::from_str(data)?;
        let obj = value
            .as_object()
            .ok_or_else(|| InfoError::Json("info document must be a JSON object".into()))?;

        let (api_version, extra_contexts) = detect_version(obj.get("@context"), version_hint)?;
        let profile = api_version.profile();
        let mut info = ImageInfo::new(api_version);
        info.extra_contexts = extra_contexts;

        info.identifier = read_string(obj, profile.identifier_key)?;
        info.width = read_u32(obj, "width")?;
        info.height = read_u32(obj, "height")?;

        match profile.info_style {
            InfoStyle::V1_0 | InfoStyle::V1_1 => info.read_v1(obj)?,
            InfoStyle::V2 => info.read_v2(obj)?,
            InfoStyle::V3 => info.read_v3(obj)?,
        }

        if let Some(tiles) = obj.get("tiles") {
            info.tiles = serde_json::from_value(tiles.clone()).map_err(|e| InfoError::Invalid {
                field: "tiles".into(),
                message: e.to_string(),
            })?;
        }
        if let Some(sizes) = obj.get("sizes") {
            info.sizes = serde_json::from_value(sizes.clone()).map_err(|e| InfoError::Invalid {
                field: "sizes".into(),
                message: e.to_string(),
            })?;
        }
        match obj.get("service") {
            Some(Value::Array(services)) => info.services = services.clone(),
            Some(service) => info.services = vec![service.clone()],
            None => {}
        }

        info.validate()?;
        Ok(info)
    }

    fn read_v1(&mut self, obj: &Map<String, Value>) -> Result<(), InfoError> {
        if let Some(uri) = read_string(obj, "profile")? {
            self.level = self.level_from(&uri)?;
        }
        if let Some(tile_width) = read_u32(obj, "tile_width")? {
            let scale_factors = read_u32_list(obj, "scale_factors")?.unwrap_or_default();
            self.set_tiling(tile_width, read_u32(obj, "tile_height")?, scale_factors);
        }
        self.formats = read_string_list(obj, "formats")?.unwrap_or_default();
        self.qualities = read_string_list(obj, "qualities")?.unwrap_or_default();
        Ok(())
    }

    fn read_v2(&mut self, obj: &Map<String, Value>) -> Result<(), InfoError> {
        match obj.get("profile") {
            Some(Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::String(uri) => self.level = self.level_from(uri)?,
                        Value::Object(features) => self.read_features(features, "formats", "qualities", "supports")?,
                        _ => return Err(invalid("profile", "unexpected profile entry")),
                    }
                }
            }
            Some(Value::String(uri)) => self.level = self.level_from(uri)?,
            Some(_) => return Err(invalid("profile", "must be a list or string")),
            None => {}
        }
        self.rights = read_string(obj, "license")?;
        Ok(())
    }

    fn read_v3(&mut self, obj: &Map<String, Value>) -> Result<(), InfoError> {
        match obj.get("profile") {
            Some(Value::String(token)) => self.level = self.level_from(token)?,
            // Early 3.0 drafts used the 2.x list form
            Some(Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::String(uri) => self.level = self.level_from(uri)?,
                        Value::Object(features) => self.read_features(features, "formats", "qualities", "supports")?,
                        _ => return Err(invalid("profile", "unexpected profile entry")),
                    }
                }
            }
            Some(_) => return Err(invalid("profile", "must be a string")),
            None => {}
        }
        self.read_features(obj, "extraFormats", "extraQualities", "extraFeatures")?;
        self.rights = read_string(obj, "rights")?;
        Ok(())
    }

    fn read_features(
        &mut self,
        obj: &Map<String, Value>,
        formats: &str,
        qualities: &str,
        supports: &str,
    ) -> Result<(), InfoError> {
        if let Some(v) = read_string_list(obj, formats)? {
            self.formats = v;
        }
        if let Some(v) = read_string_list(obj, qualities)? {
            self.qualities = v;
        }
        if let Some(v) = read_string_list(obj, supports)? {
            self.supports = v;
        }
        if let Some(v) = read_u32(obj, "maxWidth")? {
            self.max_width = Some(v);
        }
        if let Some(v) = read_u32(obj, "maxHeight")? {
            self.max_height = Some(v);
        }
        if let Some(v) = obj.get("maxArea").and_then(Value::as_u64) {
            self.max_area = Some(v);
        }
        Ok(())
    }

    fn level_from(&self, uri: &str) -> Result<ComplianceLevel, InfoError> {
        self.api_version
            .profile()
            .level_from_compliance(uri)
            .ok_or_else(|| invalid("profile", &format!("unrecognized compliance '{}'", uri)))
    }
}

fn write_xml_list(s: &mut String, outer: &str, inner: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    s.push_str(&format!("  <{}>\n", outer));
    for item in items {
        s.push_str(&format!("    <{}>{}</{}>\n", inner, xml_escape(item), inner));
    }
    s.push_str(&format!("  </{}>\n", outer));
}

/// Map an `@context` value to a version plus any extension contexts.
fn detect_version(
    context: Option<&Value>,
    hint: Option<ApiVersion>,
) -> Result<(ApiVersion, Vec<String>), InfoError> {
    let contexts: Vec<String> = match context {
        None => {
            return hint
                .map(|v| (v, Vec::new()))
                .ok_or_else(|| InfoError::Context("no @context and no API version given".into()))
        }
        Some(Value::String(c)) => vec![c.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| InfoError::Context("non-string entry in @context list".into()))
            })
            .collect::<Result<_, _>>()?,
        Some(other) => return Err(InfoError::Context(other.to_string())),
    };

    let v1_1 = ApiVersion::V1_1.profile().context;
    let v2 = ApiVersion::V2_1.profile().context;
    let v3 = ApiVersion::V3_0.profile().context;

    let (detected, extra) = if let Some(pos) = contexts.iter().position(|c| Some(c.as_str()) == v3) {
        let extra = contexts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != pos)
            .map(|(_, c)| c.clone())
            .collect();
        (ApiVersion::V3_0, extra)
    } else {
        match contexts.as_slice() {
            [c] if Some(c.as_str()) == v1_1 || c == CONTEXT_1_ALIAS => (ApiVersion::V1_1, Vec::new()),
            [c] if Some(c.as_str()) == v2 => (ApiVersion::V2_1, Vec::new()),
            _ => return Err(InfoError::Context(contexts.join(", "))),
        }
    };

    match hint {
        None => Ok((detected, extra)),
        // 2.0 and 2.1 share a context; the hint picks between them
        Some(version) if version.profile().context == detected.profile().context => {
            Ok((version, extra))
        }
        Some(version) => Err(InfoError::Context(format!(
            "expected API version {} but got context for API version {}",
            version, detected
        ))),
    }
}

fn invalid(field: &str, message: &str) -> InfoError {
    InfoError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn read_string(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, InfoError> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(invalid(key, "must be a string")),
    }
}

fn read_u32(obj: &Map<String, Value>, key: &str) -> Result<Option<u32>, InfoError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| invalid(key, "must be a non-negative integer")),
    }
}

fn read_u32_list(obj: &Map<String, Value>, key: &str) -> Result<Option<Vec<u32>>, InfoError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|_| invalid(key, "must be a list of integers")),
    }
}

fn read_string_list(obj: &Map<String, Value>, key: &str) -> Result<Option<Vec<String>>, InfoError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) => serde_json::from_value(v.clone())
            .map(Some)
            .map_err(|_| invalid(key, "must be a list of strings")),
    }
}

// =============================================================================
// Tests
// =============================================================================
