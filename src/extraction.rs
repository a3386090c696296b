//! Region-of-interest extraction
//!
//! A feature matte marks the feature as near-white. The matte is resampled to
//! the photo's resolution, converted to hue/lightness/saturation, thresholded
//! into a binary mask, and the masked photo pixels are copied into an
//! otherwise transparent buffer of the photo's size.

use crate::{
    config::{PipelineConfig, ResampleFilter},
    error::{CaptureError, Result},
};
use image::{imageops, GrayImage, Luma, Rgba, RgbaImage};
use tracing::debug;

/// Band below full lightness and above zero saturation that counts as
/// near-white (out of 255)
pub const SENSITIVITY: u8 = 50;

const IN_REGION: u8 = 255;
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Hue/lightness/saturation triple in 8-bit form.
///
/// Hue is in half-degrees (`0..180`), lightness and saturation in `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hls {
    pub hue: u8,
    pub lightness: u8,
    pub saturation: u8,
}

impl Hls {
    /// Convert an RGB triple
    #[must_use]
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let (r, g, b) = (
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
        );
        let vmax = r.max(g).max(b);
        let vmin = r.min(g).min(b);
        let diff = vmax - vmin;
        let lightness = (vmax + vmin) / 2.0;

        let (hue, saturation) = if diff > f32::EPSILON {
            let saturation = if lightness < 0.5 {
                diff / (vmax + vmin)
            } else {
                diff / (2.0 - vmax - vmin)
            };
            #[allow(clippy::float_cmp)]
            let mut hue = if vmax == r {
                (g - b) * 60.0 / diff
            } else if vmax == g {
                (b - r) * 60.0 / diff + 120.0
            } else {
                (r - g) * 60.0 / diff + 240.0
            };
            if hue < 0.0 {
                hue += 360.0;
            }
            (hue, saturation)
        } else {
            (0.0, 0.0)
        };

        Self {
            hue: ((hue / 2.0).round() as u8).min(179),
            lightness: (lightness * 255.0).round() as u8,
            saturation: (saturation * 255.0).round() as u8,
        }
    }
}

/// Matte thresholding and photo masking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionExtractor {
    filter: ResampleFilter,
}

impl RegionExtractor {
    #[must_use]
    pub fn new(filter: ResampleFilter) -> Self {
        Self { filter }
    }

    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.resample_filter)
    }

    /// Whether a matte color falls inside the feature region. Hue is ignored.
    #[must_use]
    pub fn is_in_region(&self, hls: Hls) -> bool {
        hls.lightness >= u8::MAX - SENSITIVITY && hls.saturation <= SENSITIVITY
    }

    /// Resample `matte` to `width`x`height`
    ///
    /// # Errors
    /// - `DecodeFailure` when either side has zero area
    pub fn resample(&self, matte: &RgbaImage, width: u32, height: u32) -> Result<RgbaImage> {
        let (src_width, src_height) = matte.dimensions();
        if src_width == 0 || src_height == 0 || width == 0 || height == 0 {
            return Err(CaptureError::decode(format!(
                "cannot resample a {}x{} matte to {}x{}",
                src_width, src_height, width, height
            )));
        }
        if (src_width, src_height) == (width, height) {
            return Ok(matte.clone());
        }
        Ok(imageops::resize(matte, width, height, self.filter.into()))
    }

    /// Binary single-channel mask: 255 inside the region, 0 elsewhere
    #[must_use]
    pub fn region_mask(&self, matte: &RgbaImage) -> GrayImage {
        let (width, height) = matte.dimensions();
        GrayImage::from_fn(width, height, |x, y| {
            let Rgba([r, g, b, _]) = *matte.get_pixel(x, y);
            if self.is_in_region(Hls::from_rgb(r, g, b)) {
                Luma([IN_REGION])
            } else {
                Luma([0])
            }
        })
    }

    /// Copy the photo pixels selected by `matte` into a transparent buffer
    /// with the photo's dimensions.
    ///
    /// # Errors
    /// - `DecodeFailure` when the matte or photo cannot be resampled
    pub fn extract(&self, matte: &RgbaImage, photo: &RgbaImage) -> Result<RgbaImage> {
        let (width, height) = photo.dimensions();
        let resampled = self.resample(matte, width, height)?;
        let mask = self.region_mask(&resampled);

        let output = RgbaImage::from_fn(width, height, |x, y| {
            if mask.get_pixel(x, y)[0] == IN_REGION {
                *photo.get_pixel(x, y)
            } else {
                TRANSPARENT
            }
        });

        debug!(
            width,
            height,
            coverage = coverage_ratio(&mask),
            "Extracted feature region"
        );
        Ok(output)
    }
}

/// Fraction of mask pixels inside the region
#[must_use]
pub fn coverage_ratio(mask: &GrayImage) -> f32 {
    let total = mask.width() as usize * mask.height() as usize;
    if total == 0 {
        return 0.0;
    }
    let selected = mask.pixels().filter(|p| p[0] == IN_REGION).count();
    selected as f32 / total as f32
}

/// Extract with the default resampling filter
///
/// # Errors
/// - `DecodeFailure` when the matte or photo cannot be resampled
pub fn extract(matte: &RgbaImage, photo: &RgbaImage) -> Result<RgbaImage> {
    RegionExtractor::default().extract(matte, photo)
}
