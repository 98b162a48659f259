//! Synthetic source images.
//!
//! A [`PixelGen`] is a pattern defined pixel by pixel over a fixed size.
//! [`GeneratorEngine`] computes only the requested region at the requested
//! size, sampling the pattern at each output pixel, then hands the result
//! to an [`ImageEngine`] for rotation, quality and encoding.

use std::path::Path;
use std::str::FromStr;

use image::{DynamicImage, Rgb, RgbImage};
use tracing::debug;

use crate::error::IiifError;
use crate::version::{ComplianceLevel, Quality};

use super::engine::{OutputFormat, PixelEngine, SavedImage};
use super::image_engine::ImageEngine;

/// Largest image the generator will compute, in pixels.
pub const MAX_GENERATED_PIXELS: u64 = 64 * 1024 * 1024;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

// =============================================================================
// Patterns
// =============================================================================

/// Named pixel patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelGen {
    /// 3x3 check with the middle square recursing, shading to red inward
    Check,

    /// Fractal diagonal cross
    DiagonalCross,

    /// Sierpinski carpet
    SierpinskiCarpet,
}

impl PixelGen {
    pub const ALL: [PixelGen; 3] = [
        PixelGen::Check,
        PixelGen::DiagonalCross,
        PixelGen::SierpinskiCarpet,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PixelGen::Check => "check",
            PixelGen::DiagonalCross => "diagonal_cross",
            PixelGen::SierpinskiCarpet => "sierpinski_carpet",
        }
    }

    /// Pattern side length; all patterns are square.
    pub fn side(&self) -> u32 {
        match self {
            PixelGen::Check => 3u32.pow(9),
            PixelGen::DiagonalCross | PixelGen::SierpinskiCarpet => 3u32.pow(8),
        }
    }

    pub fn size(&self) -> (u32, u32) {
        (self.side(), self.side())
    }

    pub fn background(&self) -> Rgb<u8> {
        WHITE
    }

    /// Color at `(x, y)`, or `None` where the background shows.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb<u8>> {
        match self {
            PixelGen::Check => check(x, y, self.side(), 0),
            PixelGen::DiagonalCross => diagonal_cross(x, y, self.side()),
            PixelGen::SierpinskiCarpet => sierpinski(x, y, self.side()),
        }
    }
}

impl FromStr for PixelGen {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PixelGen::ALL
            .into_iter()
            .find(|g| g.name() == s)
            .ok_or_else(|| IiifError::not_found(format!("Failed to load generator {}", s)))
    }
}

/// Cell number 1..9 within a 3x3 square.
fn cell(x: u32, y: u32) -> u32 {
    x + 3 * y + 1
}

fn check(x: u32, y: u32, size: u32, red: u8) -> Option<Rgb<u8>> {
    if size <= 3 {
        return (cell(x, y) % 2 == 1).then_some(Rgb([red, 0, 0]));
    }
    let divisor = size / 3;
    match cell(x / divisor, y / divisor) {
        5 => check(x % divisor, y % divisor, divisor, red.saturating_add(25)),
        n if n % 2 == 1 => Some(Rgb([red, 0, 0])),
        _ => None,
    }
}

fn diagonal_cross(x: u32, y: u32, size: u32) -> Option<Rgb<u8>> {
    let off_diagonal = |x: u32, y: u32| (x + 3 * y) % 2 == 1;
    if size <= 3 {
        return (!off_diagonal(x, y)).then_some(BLACK);
    }
    let divisor = size / 3;
    if off_diagonal(x / divisor, y / divisor) {
        return None;
    }
    diagonal_cross(x % divisor, y % divisor, divisor)
}

fn sierpinski(x: u32, y: u32, size: u32) -> Option<Rgb<u8>> {
    let middle = |x: u32, y: u32| x == 1 && y == 1;
    if size <= 3 {
        return (!middle(x, y)).then_some(BLACK);
    }
    let divisor = size / 3;
    if middle(x / divisor, y / divisor) {
        return None;
    }
    sierpinski(x % divisor, y % divisor, divisor)
}

// =============================================================================
// GeneratorEngine
// =============================================================================

/// Engine whose sources are [`PixelGen`] patterns named by file stem.
#[derive(Default)]
pub struct GeneratorEngine {
    gen: Option<PixelGen>,
    region: (u32, u32, u32, u32),
    size: Option<(u32, u32)>,
    inner: ImageEngine,
    rendered: bool,
}

impl GeneratorEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the region at the output size, once.
    fn render(&mut self) -> Result<(), IiifError> {
        if self.rendered {
            return Ok(());
        }
        let gen = self
            .gen
            .ok_or_else(|| IiifError::internal("No generator specified"))?;
        let (rx, ry, rw, rh) = self.region;
        let (sw, sh) = self.size.unwrap_or((rw, rh));
        if u64::from(sw) * u64::from(sh) > MAX_GENERATED_PIXELS {
            return Err(IiifError::payload_too_large(format!(
                "Generated image of {}x{} pixels exceeds the limit",
                sw, sh
            )));
        }

        debug!(generator = gen.name(), rx, ry, rw, rh, sw, sh, "generating image");
        let (rw64, rh64, sw64, sh64) = (u64::from(rw), u64::from(rh), u64::from(sw), u64::from(sh));
        let image = RgbImage::from_fn(sw, sh, |x, y| {
            let ix = (u64::from(x) * rw64 / sw64) as u32 + rx;
            let iy = (u64::from(y) * rh64 / sh64) as u32 + ry;
            gen.pixel(ix, iy).unwrap_or_else(|| gen.background())
        });
        self.inner.set_image(DynamicImage::ImageRgb8(image));
        self.rendered = true;
        Ok(())
    }
}

impl PixelEngine for GeneratorEngine {
    fn name(&self) -> &'static str {
        "gen"
    }

    fn level(&self) -> ComplianceLevel {
        ComplianceLevel::Level2
    }

    fn before(&mut self) -> Result<(), IiifError> {
        self.inner.before()
    }

    fn open(&mut self, source: &Path) -> Result<(u32, u32), IiifError> {
        let name = source
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| IiifError::internal("No generator specified"))?;
        let gen: PixelGen = name.parse()?;
        let (w, h) = gen.size();
        self.gen = Some(gen);
        self.region = (0, 0, w, h);
        self.size = None;
        self.rendered = false;
        Ok((w, h))
    }

    fn crop(&mut self, x: u32, y: u32, w: u32, h: u32) -> Result<(), IiifError> {
        self.region = (x, y, w, h);
        Ok(())
    }

    fn scale(&mut self, w: u32, h: u32) -> Result<(), IiifError> {
        self.size = Some((w, h));
        Ok(())
    }

    fn rotate(&mut self, mirror: bool, degrees: f64) -> Result<(), IiifError> {
        self.render()?;
        self.inner.rotate(mirror, degrees)
    }

    fn quality(&mut self, quality: Quality) -> Result<(), IiifError> {
        self.render()?;
        self.inner.quality(quality)
    }

    fn save(
        &mut self,
        format: Option<OutputFormat>,
        outfile: Option<&Path>,
    ) -> Result<SavedImage, IiifError> {
        self.render()?;
        self.inner.save(format, outfile)
    }

    fn after(&mut self) -> Result<(), IiifError> {
        self.inner.after()
    }

    fn cleanup(&mut self) {
        self.inner.cleanup();
    }
}
