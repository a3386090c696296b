//! Orientation normalization for photo and matte pixel buffers
//!
//! Stored buffers carry one of the eight EXIF orientation states. `normalize`
//! bakes the state into the pixels so that the buffer's top-left origin is the
//! displayed top-left; `denormalize` applies the state to an upright buffer.
//! The two are exact inverses for every state.

use crate::{
    error::{CaptureError, Result},
    types::CapturedPhoto,
};
use image::{
    imageops::{flip_horizontal, flip_vertical, rotate180, rotate270, rotate90},
    metadata::Orientation as ExifOrientation,
    DynamicImage, ImageDecoder, ImageReader, RgbaImage,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// The eight standard orientation/mirroring states, named after the side the
/// stored image's top row is displayed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Orientation {
    /// EXIF 1, identity
    #[default]
    Up,
    /// EXIF 2, horizontal mirror
    UpMirrored,
    /// EXIF 3, rotated 180°
    Down,
    /// EXIF 4, vertical mirror
    DownMirrored,
    /// EXIF 5, transposed
    LeftMirrored,
    /// EXIF 6, needs a 90° clockwise turn to display
    Right,
    /// EXIF 7, transversed
    RightMirrored,
    /// EXIF 8, needs a 90° counter-clockwise turn to display
    Left,
}

impl Orientation {
    pub const ALL: [Orientation; 8] = [
        Orientation::Up,
        Orientation::UpMirrored,
        Orientation::Down,
        Orientation::DownMirrored,
        Orientation::LeftMirrored,
        Orientation::Right,
        Orientation::RightMirrored,
        Orientation::Left,
    ];

    /// Parse an EXIF orientation value (1-8)
    #[must_use]
    pub fn from_exif(value: u8) -> Option<Self> {
        match value {
            1 => Some(Orientation::Up),
            2 => Some(Orientation::UpMirrored),
            3 => Some(Orientation::Down),
            4 => Some(Orientation::DownMirrored),
            5 => Some(Orientation::LeftMirrored),
            6 => Some(Orientation::Right),
            7 => Some(Orientation::RightMirrored),
            8 => Some(Orientation::Left),
            _ => None,
        }
    }

    #[must_use]
    pub fn exif(self) -> u8 {
        match self {
            Orientation::Up => 1,
            Orientation::UpMirrored => 2,
            Orientation::Down => 3,
            Orientation::DownMirrored => 4,
            Orientation::LeftMirrored => 5,
            Orientation::Right => 6,
            Orientation::RightMirrored => 7,
            Orientation::Left => 8,
        }
    }

    /// Whether width and height swap when normalizing
    #[must_use]
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Orientation::LeftMirrored
                | Orientation::Right
                | Orientation::RightMirrored
                | Orientation::Left
        )
    }

    #[must_use]
    pub fn is_mirrored(self) -> bool {
        matches!(
            self,
            Orientation::UpMirrored
                | Orientation::DownMirrored
                | Orientation::LeftMirrored
                | Orientation::RightMirrored
        )
    }
}

impl From<ExifOrientation> for Orientation {
    fn from(value: ExifOrientation) -> Self {
        match value {
            ExifOrientation::NoTransforms => Orientation::Up,
            ExifOrientation::FlipHorizontal => Orientation::UpMirrored,
            ExifOrientation::Rotate180 => Orientation::Down,
            ExifOrientation::FlipVertical => Orientation::DownMirrored,
            ExifOrientation::Rotate90FlipH => Orientation::LeftMirrored,
            ExifOrientation::Rotate90 => Orientation::Right,
            ExifOrientation::Rotate270FlipH => Orientation::RightMirrored,
            ExifOrientation::Rotate270 => Orientation::Left,
        }
    }
}

fn ensure_allocated(image: &RgbaImage) -> Result<()> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(CaptureError::decode(format!(
            "cannot reorient a {}x{} pixel buffer",
            width, height
        )));
    }
    Ok(())
}

fn transpose(image: &RgbaImage) -> RgbaImage {
    flip_horizontal(&rotate90(image))
}

fn transverse(image: &RgbaImage) -> RgbaImage {
    flip_horizontal(&rotate270(image))
}

/// Bake `stored` into the pixels, producing an upright buffer.
///
/// # Errors
/// - `DecodeFailure` for zero-area buffers
pub fn normalize(image: &RgbaImage, stored: Orientation) -> Result<RgbaImage> {
    ensure_allocated(image)?;

    Ok(match stored {
        Orientation::Up => image.clone(),
        Orientation::UpMirrored => flip_horizontal(image),
        Orientation::Down => rotate180(image),
        Orientation::DownMirrored => flip_vertical(image),
        Orientation::LeftMirrored => transpose(image),
        Orientation::Right => rotate90(image),
        Orientation::RightMirrored => transverse(image),
        Orientation::Left => rotate270(image),
    })
}

/// Apply `target` to an upright buffer. Inverse of [`normalize`].
///
/// # Errors
/// - `DecodeFailure` for zero-area buffers
pub fn denormalize(image: &RgbaImage, target: Orientation) -> Result<RgbaImage> {
    ensure_allocated(image)?;

    Ok(match target {
        Orientation::Up => image.clone(),
        Orientation::UpMirrored => flip_horizontal(image),
        Orientation::Down => rotate180(image),
        Orientation::DownMirrored => flip_vertical(image),
        Orientation::LeftMirrored => transpose(image),
        Orientation::Right => rotate270(image),
        Orientation::RightMirrored => transverse(image),
        Orientation::Left => rotate90(image),
    })
}

/// Mirror horizontally (optionally), then rotate clockwise by `degrees`.
///
/// Full turns are no-ops on the pixels, so the historical "mirror then rotate
/// 360°" path reduces to the mirror alone.
///
/// # Errors
/// - `InvalidConfig` when `degrees` is not a multiple of 90
/// - `DecodeFailure` for zero-area buffers
pub fn mirror_then_rotate(image: &RgbaImage, mirror: bool, degrees: u32) -> Result<RgbaImage> {
    if degrees % 90 != 0 {
        return Err(CaptureError::config_value_error(
            "rotation_degrees",
            degrees,
            "multiples of 90",
        ));
    }
    ensure_allocated(image)?;

    let mirrored;
    let source = if mirror {
        mirrored = flip_horizontal(image);
        &mirrored
    } else {
        image
    };

    Ok(match (degrees / 90) % 4 {
        1 => rotate90(source),
        2 => rotate180(source),
        3 => rotate270(source),
        _ => source.clone(),
    })
}

/// Decode encoded photo bytes into RGBA pixels plus the orientation to apply.
///
/// An explicit orientation on the photo wins; otherwise the encoded EXIF tag
/// is used, defaulting to [`Orientation::Up`].
///
/// # Errors
/// - `DecodeFailure` when the bytes are not a supported image
pub fn decode_photo(photo: &CapturedPhoto) -> Result<(RgbaImage, Orientation)> {
    if photo.data.is_empty() {
        return Err(CaptureError::decode("photo data is empty"));
    }

    let reader = ImageReader::new(Cursor::new(photo.data.as_slice()))
        .with_guessed_format()
        .map_err(|e| CaptureError::decode(format!("failed to sniff photo format: {}", e)))?;
    let mut decoder = reader
        .into_decoder()
        .map_err(|e| CaptureError::decode(format!("unsupported photo data: {}", e)))?;

    let orientation = match photo.orientation {
        Some(orientation) => orientation,
        None => decoder.orientation().map_or(Orientation::Up, Orientation::from),
    };

    let image = DynamicImage::from_decoder(decoder)
        .map_err(|e| CaptureError::decode(format!("failed to decode photo: {}", e)))?
        .to_rgba8();
    ensure_allocated(&image)?;

    Ok((image, orientation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// 3x2 buffer with a distinct value per pixel
    fn sample() -> RgbaImage {
        RgbaImage::from_fn(3, 2, |x, y| Rgba([(x * 10 + y) as u8, 0, 0, 255]))
    }

    fn value(image: &RgbaImage, x: u32, y: u32) -> u8 {
        image.get_pixel(x, y)[0]
    }

    #[test]
    fn test_exif_codes_round_trip() {
        for orientation in Orientation::ALL {
            assert_eq!(Orientation::from_exif(orientation.exif()), Some(orientation));
        }
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
    }

    #[test]
    fn test_normalize_up_is_unchanged() {
        let image = sample();
        assert_eq!(normalize(&image, Orientation::Up).unwrap(), image);
    }

    #[test]
    fn test_normalize_right_turns_clockwise() {
        // Stored top-left ends up at the top-right after a clockwise turn
        let upright = normalize(&sample(), Orientation::Right).unwrap();
        assert_eq!(upright.dimensions(), (2, 3));
        assert_eq!(value(&upright, 1, 0), 0);
        assert_eq!(value(&upright, 0, 0), 1);
    }

    #[test]
    fn test_normalize_left_mirrored_transposes() {
        let upright = normalize(&sample(), Orientation::LeftMirrored).unwrap();
        assert_eq!(upright.dimensions(), (2, 3));
        for y in 0..3 {
            for x in 0..2 {
                assert_eq!(value(&upright, x, y), value(&sample(), y, x));
            }
        }
    }

    #[test]
    fn test_dimension_swaps() {
        for orientation in Orientation::ALL {
            let upright = normalize(&sample(), orientation).unwrap();
            let expected = if orientation.swaps_dimensions() { (2, 3) } else { (3, 2) };
            assert_eq!(upright.dimensions(), expected, "{:?}", orientation);
        }
    }

    #[test]
    fn test_zero_area_is_decode_failure() {
        let empty = RgbaImage::new(0, 4);
        assert!(matches!(
            normalize(&empty, Orientation::Down),
            Err(CaptureError::DecodeFailure(_))
        ));
        assert!(matches!(
            denormalize(&empty, Orientation::Down),
            Err(CaptureError::DecodeFailure(_))
        ));
    }

    #[test]
    fn test_mirror_then_full_turn_is_plain_mirror() {
        let image = sample();
        let compat = mirror_then_rotate(&image, true, 360).unwrap();
        assert_eq!(compat, flip_horizontal(&image));
        assert_eq!(mirror_then_rotate(&image, false, 0).unwrap(), image);
        assert!(mirror_then_rotate(&image, true, 45).is_err());
    }

    #[test]
    fn test_decode_photo_rejects_garbage() {
        let photo = CapturedPhoto::new(vec![0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(decode_photo(&photo), Err(CaptureError::DecodeFailure(_))));
        let empty = CapturedPhoto::new(Vec::new());
        assert!(matches!(decode_photo(&empty), Err(CaptureError::DecodeFailure(_))));
    }

    #[test]
    fn test_decode_photo_uses_explicit_orientation() {
        let mut encoded = Vec::new();
        DynamicImage::ImageRgba8(sample())
            .write_to(&mut Cursor::new(&mut encoded), image::ImageFormat::Png)
            .unwrap();

        let photo = CapturedPhoto::new(encoded.clone()).with_orientation(Orientation::Left);
        let (decoded, orientation) = decode_photo(&photo).unwrap();
        assert_eq!(decoded, sample());
        assert_eq!(orientation, Orientation::Left);

        let (_, orientation) = decode_photo(&CapturedPhoto::new(encoded)).unwrap();
        assert_eq!(orientation, Orientation::Up);
    }
}
