//! Matte decoding
//!
//! Turns a raw per-feature matte plane into an RGBA image laid out the same
//! way as the final canonical photo. Rasterizing happens as soon as a matte
//! arrives; orienting waits until the photo's orientation is resolved.

use crate::{
    config::CompatTransform,
    error::{CaptureError, Result},
    orientation::{mirror_then_rotate, normalize, Orientation},
    types::{MatteBuffer, MatteFormat, SegmentationMatte},
};
use image::{Rgba, RgbaImage};

/// Trait for matte decoders
pub trait MatteDecoder: Send + Sync {
    /// Expand the raw plane into RGBA, still in its stored layout
    ///
    /// # Errors
    /// - `DecodeFailure` when the plane is malformed or zero-area
    fn rasterize(&self, matte: &SegmentationMatte) -> Result<RgbaImage>;

    /// Bring a rasterized matte into the canonical photo's layout
    ///
    /// # Errors
    /// - `DecodeFailure` for zero-area images
    fn orient(&self, matte: &RgbaImage, photo_orientation: Orientation) -> Result<RgbaImage>;

    /// Rasterize and orient in one step
    ///
    /// # Errors
    /// - Whatever [`Self::rasterize`] or [`Self::orient`] return
    fn decode(
        &self,
        matte: &SegmentationMatte,
        photo_orientation: Orientation,
    ) -> Result<RgbaImage> {
        let raw = self.rasterize(matte)?;
        self.orient(&raw, photo_orientation)
    }
}

/// Decoder used by the pipeline unless one is injected
#[derive(Debug, Clone, Default)]
pub struct DefaultMatteDecoder {
    compat: CompatTransform,
}

impl DefaultMatteDecoder {
    /// Decoder applying `compat` after orientation correction, matching the
    /// transform applied to the photo
    #[must_use]
    pub fn new(compat: CompatTransform) -> Self {
        Self { compat }
    }
}

impl MatteDecoder for DefaultMatteDecoder {
    fn rasterize(&self, matte: &SegmentationMatte) -> Result<RgbaImage> {
        matte_to_rgba(&matte.buffer)
    }

    fn orient(&self, matte: &RgbaImage, photo_orientation: Orientation) -> Result<RgbaImage> {
        let upright = normalize(matte, photo_orientation)?;
        mirror_then_rotate(&upright, self.compat.mirror, self.compat.rotation_degrees)
    }
}

/// Expand a raw matte plane into RGBA. Single-channel confidence is
/// replicated into the color channels with an opaque alpha.
///
/// # Errors
/// - `DecodeFailure` for zero-area planes, short strides or short data
pub fn matte_to_rgba(buffer: &MatteBuffer) -> Result<RgbaImage> {
    let (width, height) = (buffer.width, buffer.height);
    if width == 0 || height == 0 {
        return Err(CaptureError::decode(format!(
            "matte plane is {}x{}",
            width, height
        )));
    }

    let bpp = buffer.format.bytes_per_pixel();
    let row_len = width as usize * bpp;
    if buffer.bytes_per_row < row_len {
        return Err(CaptureError::decode(format!(
            "matte stride {} is shorter than a {}-byte row",
            buffer.bytes_per_row, row_len
        )));
    }

    let required = buffer
        .bytes_per_row
        .checked_mul(height as usize - 1)
        .and_then(|rows| rows.checked_add(row_len))
        .ok_or_else(|| {
            CaptureError::decode(format!(
                "matte stride {} overflows for {} rows",
                buffer.bytes_per_row, height
            ))
        })?;
    if buffer.data.len() < required {
        return Err(CaptureError::decode(format!(
            "matte plane holds {} bytes, {} needed",
            buffer.data.len(),
            required
        )));
    }

    let mut image = RgbaImage::new(width, height);
    for (y, row) in buffer.data.chunks(buffer.bytes_per_row).take(height as usize).enumerate() {
        let Some(row) = row.get(..row_len) else {
            return Err(CaptureError::decode("matte row truncated"));
        };
        for (x, px) in row.chunks_exact(bpp).enumerate() {
            let pixel = match (buffer.format, px) {
                (MatteFormat::OneComponent8, [v]) => Rgba([*v, *v, *v, 255]),
                (MatteFormat::Bgra8, [b, g, r, a]) => Rgba([*r, *g, *b, *a]),
                _ => return Err(CaptureError::decode("unexpected matte pixel layout")),
            };
            image.put_pixel(x as u32, y as u32, pixel);
        }
    }

    Ok(image)
}
