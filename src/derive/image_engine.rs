//! Pixel engine built on the `image` crate.
//!
//! # Operations
//!
//! | Stage | Implementation |
//! |---|---|
//! | open | `ImageReader` with format guessing and allocation limits |
//! | crop | `DynamicImage::crop_imm` |
//! | scale | `DynamicImage::resize_exact` with a triangle filter |
//! | rotate | `fliph`, `rotate90/180/270`, nearest neighbour otherwise |
//! | quality | luma conversion, thresholded at 128 for bitonal |
//! | save | `JpegEncoder` for jpg, `write_to` for png/gif/webp/tif |
//!
//! Arbitrary rotations expand the canvas to hold the rotated image; the
//! uncovered corners are transparent (black once flattened for JPEG).

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits, Rgba, RgbaImage};
use tempfile::TempPath;
use tracing::debug;

use crate::error::IiifError;
use crate::version::{ComplianceLevel, Quality};

use super::engine::{OutputFormat, PixelEngine, SavedImage};

/// JPEG quality used for derived images (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Default decoder allocation budget (512 MiB).
pub const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

/// Luma value at or above which a bitonal pixel is white.
const BITONAL_THRESHOLD: u8 = 128;

/// Bytes per pixel of the `Rgba<f32>` buffers used while resampling.
const FLOAT_RGBA_BYTES: u64 = 16;

/// Pixel engine decoding, transforming and encoding in memory.
pub struct ImageEngine {
    image: Option<DynamicImage>,
    temp: Option<TempPath>,
    max_alloc: u64,
    jpeg_quality: u8,
}

impl Default for ImageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageEngine {
    pub fn new() -> Self {
        Self {
            image: None,
            temp: None,
            max_alloc: DEFAULT_MAX_ALLOC,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Limit the memory decoding and resampling may allocate; larger
    /// sources and outputs give 413.
    pub fn with_max_alloc(mut self, max_alloc: u64) -> Self {
        self.max_alloc = max_alloc;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Start from an already decoded image instead of a file.
    pub fn set_image(&mut self, image: DynamicImage) {
        self.image = Some(image);
    }

    /// The current image, if one is loaded.
    pub fn image(&self) -> Option<&DynamicImage> {
        self.image.as_ref()
    }

    fn current(&mut self) -> Result<&mut DynamicImage, IiifError> {
        self.image
            .as_mut()
            .ok_or_else(|| IiifError::internal("No source image opened"))
    }
}

impl PixelEngine for ImageEngine {
    fn name(&self) -> &'static str {
        "image"
    }

    fn level(&self) -> ComplianceLevel {
        ComplianceLevel::Level2
    }

    /// Drop whatever an earlier derivation left behind.
    fn before(&mut self) -> Result<(), IiifError> {
        self.cleanup();
        self.image = None;
        Ok(())
    }

    fn open(&mut self, source: &Path) -> Result<(u32, u32), IiifError> {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_alloc);

        let mut reader = ImageReader::open(source)?.with_guessed_format()?;
        reader.limits(limits);
        let image = reader.decode()?;
        let dimensions = image.dimensions();
        debug!(
            source = %source.display(),
            width = dimensions.0,
            height = dimensions.1,
            "opened source image"
        );
        self.image = Some(image);
        Ok(dimensions)
    }

    fn crop(&mut self, x: u32, y: u32, w: u32, h: u32) -> Result<(), IiifError> {
        debug!(x, y, w, h, "region");
        let image = self.current()?;
        *image = image.crop_imm(x, y, w, h);
        Ok(())
    }

    fn scale(&mut self, w: u32, h: u32) -> Result<(), IiifError> {
        debug!(w, h, "size");
        let max_alloc = self.max_alloc;
        let image = self.current()?;
        // Output plus the float buffer of the vertical filter pass
        let output = pixel_bytes(w, h, u64::from(image.color().bytes_per_pixel()));
        let intermediate = pixel_bytes(image.width(), h, FLOAT_RGBA_BYTES);
        check_budget(output.saturating_add(intermediate), max_alloc, w, h)?;
        *image = image.resize_exact(w, h, FilterType::Triangle);
        Ok(())
    }

    fn rotate(&mut self, mirror: bool, degrees: f64) -> Result<(), IiifError> {
        debug!(mirror, degrees, "rotation");
        let max_alloc = self.max_alloc;
        let image = self.current()?;
        if !is_right_angle(degrees) {
            let (w, h) = rotated_dimensions(image.width(), image.height(), degrees);
            check_budget(pixel_bytes(w, h, 4), max_alloc, w, h)?;
        }
        if mirror {
            *image = image.fliph();
        }
        *image = match degrees {
            d if d == 0.0 => return Ok(()),
            d if d == 90.0 => image.rotate90(),
            d if d == 180.0 => image.rotate180(),
            d if d == 270.0 => image.rotate270(),
            d => DynamicImage::ImageRgba8(rotate_nearest(image, d)),
        };
        Ok(())
    }

    fn quality(&mut self, quality: Quality) -> Result<(), IiifError> {
        let image = self.current()?;
        match quality {
            Quality::Default | Quality::Color => {}
            Quality::Gray => {
                debug!("quality: converting to gray");
                *image = DynamicImage::ImageLuma8(image.to_luma8());
            }
            Quality::Bitonal => {
                debug!("quality: converting to bitonal");
                let mut luma = image.to_luma8();
                for pixel in luma.pixels_mut() {
                    pixel.0[0] = if pixel.0[0] >= BITONAL_THRESHOLD { 255 } else { 0 };
                }
                *image = DynamicImage::ImageLuma8(luma);
            }
        }
        Ok(())
    }

    fn save(
        &mut self,
        format: Option<OutputFormat>,
        outfile: Option<&Path>,
    ) -> Result<SavedImage, IiifError> {
        let format = format.unwrap_or(OutputFormat::Jpg);
        let image_format = match format {
            OutputFormat::Jpg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Gif => ImageFormat::Gif,
            OutputFormat::Webp => ImageFormat::WebP,
            OutputFormat::Tif => ImageFormat::Tiff,
            OutputFormat::Pdf | OutputFormat::Jp2 => {
                return Err(IiifError::unsupported_format(format!(
                    "Unsupported output file format ({}), only jpg,png,gif,webp,tif are supported.",
                    format
                )))
            }
        };
        let jpeg_quality = self.jpeg_quality;
        let image = prepare_for(self.current()?, format);

        let path = match outfile {
            Some(outfile) => {
                if let Some(parent) = outfile.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                outfile.to_path_buf()
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("iiif-")
                    .suffix(&format!(".{}", format.extension()))
                    .tempfile()?
                    .into_temp_path();
                let path = temp.to_path_buf();
                self.temp = Some(temp);
                path
            }
        };

        let mut writer = BufWriter::new(File::create(&path)?);
        if format == OutputFormat::Jpg {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, jpeg_quality))?;
        } else {
            image.write_to(&mut writer, image_format)?;
        }
        debug!(path = %path.display(), format = %format, "saved derived image");

        Ok(SavedImage {
            path,
            mime_type: format.mime_type(),
        })
    }

    /// The output is on disk; release the decoded pixels.
    fn after(&mut self) -> Result<(), IiifError> {
        self.image = None;
        Ok(())
    }

    fn cleanup(&mut self) {
        if let Some(temp) = self.temp.take() {
            if let Err(e) = temp.close() {
                debug!(error = %e, "failed to remove temporary output");
            }
        }
    }
}

/// Convert to a pixel layout the encoder for `format` accepts.
fn prepare_for(image: &DynamicImage, format: OutputFormat) -> DynamicImage {
    let gray = matches!(
        image,
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_)
    );
    match format {
        OutputFormat::Jpg if gray => DynamicImage::ImageLuma8(image.to_luma8()),
        OutputFormat::Jpg => DynamicImage::ImageRgb8(image.to_rgb8()),
        OutputFormat::Gif => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ if gray && !image.color().has_alpha() => DynamicImage::ImageLuma8(image.to_luma8()),
        _ if image.color().has_alpha() => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Rotate clockwise by `degrees` onto a canvas large enough for the result.
fn is_right_angle(degrees: f64) -> bool {
    degrees == 0.0 || degrees == 90.0 || degrees == 180.0 || degrees == 270.0
}

/// Canvas holding an image of `width` x `height` rotated by `degrees`.
fn rotated_dimensions(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let (w, h) = (f64::from(width), f64::from(height));
    let (sin, cos) = degrees.to_radians().sin_cos();
    let out_w = (w * cos.abs() + h * sin.abs()).round().max(1.0);
    let out_h = (w * sin.abs() + h * cos.abs()).round().max(1.0);
    (out_w as u32, out_h as u32)
}

fn pixel_bytes(width: u32, height: u32, bytes_per_pixel: u64) -> u64 {
    u64::from(width)
        .saturating_mul(u64::from(height))
        .saturating_mul(bytes_per_pixel)
}

/// Refuse an output buffer larger than the allocation budget (413).
fn check_budget(bytes: u64, max_alloc: u64, width: u32, height: u32) -> Result<(), IiifError> {
    if bytes > max_alloc {
        return Err(IiifError::payload_too_large(format!(
            "Output image {}x{} needs {} bytes, over the {} byte limit.",
            width, height, bytes, max_alloc
        )));
    }
    Ok(())
}

fn rotate_nearest(image: &DynamicImage, degrees: f64) -> RgbaImage {
    let source = image.to_rgba8();
    let (w, h) = (f64::from(source.width()), f64::from(source.height()));
    let (sin, cos) = degrees.to_radians().sin_cos();

    let (out_w, out_h) = rotated_dimensions(source.width(), source.height(), degrees);
    let mut out = RgbaImage::from_pixel(out_w, out_h, Rgba([0, 0, 0, 0]));

    let (cx, cy) = (w / 2.0, h / 2.0);
    let (ox, oy) = (f64::from(out_w) / 2.0, f64::from(out_h) / 2.0);
    for (dx, dy, pixel) in out.enumerate_pixels_mut() {
        let u = f64::from(dx) + 0.5 - ox;
        let v = f64::from(dy) + 0.5 - oy;
        let sx = u * cos + v * sin + cx;
        let sy = -u * sin + v * cos + cy;
        if sx >= 0.0 && sy >= 0.0 && sx < w && sy < h {
            *pixel = *source.get_pixel(sx as u32, sy as u32);
        }
    }
    out
}
