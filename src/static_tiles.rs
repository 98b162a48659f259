//! Level 0 static tile generation.
//!
//! A Level 0 server only answers the requests listed in its info document,
//! so those responses can be written to disk ahead of time and served by
//! any static file server. For a source of `W x H` pixels and tile side
//! `T` the generator writes:
//!
//! - one tile per `T*s` source cell for each scale factor `s` with
//!   `s*T < max(W, H)`, addressed as `{x},{y},{w},{h}/{w'},/0/default.jpg`
//! - the full image at each halving of its size that fits inside a tile
//! - `info.json` declaring the tile family and the full sizes
//!
//! ```text
//! dst/
//! └── {identifier}/
//!     ├── info.json
//!     ├── full/{w},{h}/0/default.jpg
//!     └── {x},{y},{w},{h}/{w},/0/default.jpg
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::derive::{derive, DeriveOptions, ImageEngine, Window};
use crate::error::IiifError;
use crate::info::{ImageInfo, SizeEntry};
use crate::request::{quote, Region, Request, Size, SizeMode};
use crate::server::viewer::{osd_page, OsdAssets};
use crate::version::{ApiVersion, ComplianceLevel};

/// Default tile side in pixels.
pub const DEFAULT_TILESIZE: u32 = 512;

/// Largest number of halvings tried for the full sizes.
const MAX_HALVINGS: u32 = 20;

// =============================================================================
// Tile Geometry
// =============================================================================

/// Scale factors for a tile pyramid: 1, 2, 4... while a tile at that
/// factor still covers less than the longer side.
pub fn static_scale_factors(width: u32, height: u32, tilesize: u32) -> Vec<u32> {
    let longest = u64::from(width.max(height));
    let mut factors = vec![1u32];
    let mut sf = 2u64;
    while sf * u64::from(tilesize) < longest && sf <= u64::from(u32::MAX) {
        factors.push(sf as u32);
        sf *= 2;
    }
    factors
}

/// Source regions and output sizes of every partial tile.
///
/// Scale factors whose single tile would already cover the image are
/// skipped; those views are produced by [`static_full_sizes`].
pub fn static_partial_tile_sizes(
    width: u32,
    height: u32,
    tilesize: u32,
    scale_factors: &[u32],
) -> Vec<(Window, (u32, u32))> {
    let mut tiles = Vec::new();
    if width == 0 || height == 0 || tilesize == 0 {
        return tiles;
    }
    for &sf in scale_factors {
        let sf64 = u64::from(sf);
        let rts = u64::from(tilesize) * sf64;
        if sf == 0 || (rts >= u64::from(width) && rts >= u64::from(height)) {
            continue;
        }
        let (w, h) = (u64::from(width), u64::from(height));
        let mut rx = 0u64;
        while rx < w {
            let rw = rts.min(w - rx);
            let sw = rw.div_ceil(sf64);
            let mut ry = 0u64;
            while ry < h {
                let rh = rts.min(h - ry);
                let sh = rh.div_ceil(sf64);
                tiles.push((
                    (rx as u32, ry as u32, rw as u32, rh as u32),
                    (sw as u32, sh as u32),
                ));
                ry += rts;
            }
            rx += rts;
        }
    }
    tiles
}

/// Full image sizes small enough to fit in one tile, largest first.
///
/// Sizes come from halving the image repeatedly, rounding half up, and
/// stop once a side would round to zero.
pub fn static_full_sizes(width: u32, height: u32, tilesize: u32) -> Vec<(u32, u32)> {
    let mut sizes = Vec::new();
    for level in 0..MAX_HALVINGS {
        let factor = f64::from(1u32 << level);
        let sw = (f64::from(width) / factor + 0.5).floor() as u32;
        let sh = (f64::from(height) / factor + 0.5).floor() as u32;
        if sw < tilesize && sh < tilesize {
            if sw < 1 || sh < 1 {
                break;
            }
            sizes.push((sw, sh));
        }
    }
    sizes
}

// =============================================================================
// StaticGenerator
// =============================================================================

/// Settings of a static generation run.
#[derive(Debug, Clone)]
pub struct StaticOptions {
    /// Output directory; each image gets a subdirectory named by identifier
    pub dst: PathBuf,
    pub tilesize: u32,
    pub api_version: ApiVersion,

    /// Base URI the tiles will be published under, used for the `@id`
    pub prefix: String,

    /// Identifier override (defaults to the source file stem)
    pub identifier: Option<String>,

    /// Log what would be written without writing anything
    pub dryrun: bool,

    /// Directory for an OpenSeadragon page per image
    pub write_html: Option<PathBuf>,

    /// Pages load OpenSeadragon from a local copy instead of the CDN
    pub include_osd: bool,
}

impl StaticOptions {
    pub fn new(dst: impl Into<PathBuf>) -> Self {
        Self {
            dst: dst.into(),
            tilesize: DEFAULT_TILESIZE,
            api_version: ApiVersion::V2_0,
            prefix: String::new(),
            identifier: None,
            dryrun: false,
            write_html: None,
            include_osd: false,
        }
    }
}

/// What a run produced for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticReport {
    pub identifier: String,

    /// Paths relative to the destination, in generation order
    pub tiles: Vec<String>,

    /// Tiles skipped because they would have zero size
    pub skipped: usize,
}

/// Writes Level 0 tile sets.
#[derive(Debug, Clone)]
pub struct StaticGenerator {
    options: StaticOptions,
}

impl StaticGenerator {
    pub fn new(options: StaticOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &StaticOptions {
        &self.options
    }

    fn identifier_for(&self, src: &Path) -> Result<String, IiifError> {
        if let Some(id) = &self.options.identifier {
            return Ok(id.clone());
        }
        src.file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                IiifError::internal(format!("Cannot derive identifier from {}", src.display()))
            })
    }

    /// URI of the image for `@id`.
    fn image_uri(&self, identifier: &str) -> String {
        let prefix = self.options.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            quote(identifier)
        } else {
            format!("{}/{}", prefix, quote(identifier))
        }
    }

    /// Create `{dst}/{identifier}`, refusing to write over a file.
    fn setup_destination(&self, identifier: &str) -> Result<PathBuf, IiifError> {
        let outd = self.options.dst.join(quote(identifier));
        if self.options.dst.is_file() || outd.is_file() {
            return Err(IiifError::internal(format!(
                "Output directory {} exists as a file",
                outd.display()
            )));
        }
        if !self.options.dryrun {
            std::fs::create_dir_all(&outd)?;
        }
        Ok(outd)
    }

    /// Generate the tile set for one source image.
    pub fn generate(&self, src: &Path) -> Result<StaticReport, IiifError> {
        let identifier = self.identifier_for(src)?;
        let (width, height) = image::image_dimensions(src)?;
        let tilesize = self.options.tilesize;
        let scale_factors = static_scale_factors(width, height, tilesize);
        debug!(
            src = %src.display(),
            identifier = %identifier,
            width,
            height,
            tilesize,
            ?scale_factors,
            "generating static tiles"
        );
        self.setup_destination(&identifier)?;

        let mut report = StaticReport {
            identifier: identifier.clone(),
            ..Default::default()
        };
        for ((x, y, w, h), (sw, _)) in
            static_partial_tile_sizes(width, height, tilesize, &scale_factors)
        {
            let request = self
                .tile_request(&identifier)
                .with_region(Region::Pixel { x, y, w, h })
                .with_size(Size::new(SizeMode::Width(sw)));
            self.generate_tile(src, &request, &mut report)?;
        }

        let full_sizes = static_full_sizes(width, height, tilesize);
        for &(sw, sh) in &full_sizes {
            let request = self
                .tile_request(&identifier)
                .with_size(Size::new(SizeMode::Exact { w: sw, h: sh }));
            self.generate_tile(src, &request, &mut report)?;
        }

        self.write_info(&identifier, width, height, scale_factors, &full_sizes)?;
        if let Some(html_dir) = &self.options.write_html {
            self.write_html(html_dir, &identifier)?;
        }
        Ok(report)
    }

    fn tile_request(&self, identifier: &str) -> Request {
        Request::new(self.options.api_version, identifier).with_format("jpg")
    }

    fn generate_tile(
        &self,
        src: &Path,
        request: &Request,
        report: &mut StaticReport,
    ) -> Result<(), IiifError> {
        let path = request.path();
        let dst = self.options.dst.display();
        if self.options.dryrun {
            info!("{} / {}", dst, path);
            report.tiles.push(path);
            return Ok(());
        }

        let outfile = self.options.dst.join(&path);
        if let Some(parent) = outfile.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = DeriveOptions {
            outfile: Some(&outfile),
            ..Default::default()
        };
        match derive(&mut ImageEngine::new(), src, request, &options) {
            Ok(_) => {
                info!("{} / {}", dst, path);
                report.tiles.push(path);
                Ok(())
            }
            Err(e) if e.is_zero_size() => {
                warn!("{} / {} - zero size, skipped", dst, path);
                report.skipped += 1;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn write_info(
        &self,
        identifier: &str,
        width: u32,
        height: u32,
        scale_factors: Vec<u32>,
        full_sizes: &[(u32, u32)],
    ) -> Result<(), IiifError> {
        let mut info = ImageInfo::new(self.options.api_version)
            .with_identifier(self.image_uri(identifier))
            .with_dimensions(width, height)
            .with_level(ComplianceLevel::Level0);
        info.set_tiling(self.options.tilesize, None, scale_factors);
        info.sizes = full_sizes
            .iter()
            .map(|&(width, height)| SizeEntry { width, height })
            .collect();
        let json = info
            .as_json(true)
            .map_err(|e| IiifError::internal(e.to_string()))?;

        let relative = format!("{}/info.json", quote(identifier));
        if !self.options.dryrun {
            std::fs::write(self.options.dst.join(&relative), json)?;
        }
        info!("{} / {}", self.options.dst.display(), relative);
        Ok(())
    }

    fn write_html(&self, html_dir: &Path, identifier: &str) -> Result<(), IiifError> {
        let assets = if self.options.include_osd {
            OsdAssets::Local
        } else {
            OsdAssets::Cdn
        };
        let info_url = format!("{}/info.json", self.image_uri(identifier));
        let page = osd_page(identifier, &info_url, assets);
        let path = html_dir.join(format!("{}.html", identifier));
        if !self.options.dryrun {
            std::fs::create_dir_all(html_dir)?;
            std::fs::write(&path, page)?;
        }
        info!("wrote viewer page {}", path.display());
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
