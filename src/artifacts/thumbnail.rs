//! Thumbnail derivation for saved images.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageResult};

use crate::constants::{DEFAULT_THUMBNAIL_QUALITY, DEFAULT_THUMBNAIL_SIZE};

/// How thumbnails are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailSpec {
    /// Longest side in pixels.
    pub size: u32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for ThumbnailSpec {
    fn default() -> Self {
        Self {
            size: DEFAULT_THUMBNAIL_SIZE,
            quality: DEFAULT_THUMBNAIL_QUALITY,
        }
    }
}

/// Decode an encoded image, guessing the format from its header.
pub fn decode(bytes: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

/// Render `image` as a JPEG thumbnail.
///
/// Images already within `spec.size` keep their dimensions; larger ones are
/// scaled so the longest side equals `spec.size`, preserving aspect ratio.
pub fn render(image: &DynamicImage, spec: ThumbnailSpec) -> ImageResult<Vec<u8>> {
    let size = spec.size.max(1);
    let scaled = if image.width() > size || image.height() > size {
        image.resize(size, size, FilterType::Triangle)
    } else {
        image.clone()
    };

    // JPEG has no alpha channel.
    let rgb = scaled.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, spec.quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 40, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_large_image_is_scaled_to_longest_side() {
        let spec = ThumbnailSpec { size: 32, quality: 80 };
        let image = decode(&png(128, 64)).unwrap();

        let thumb = decode(&render(&image, spec).unwrap()).unwrap();
        assert_eq!(thumb.width(), 32);
        assert_eq!(thumb.height(), 16);
    }

    #[test]
    fn test_small_image_keeps_dimensions() {
        let spec = ThumbnailSpec { size: 64, quality: 80 };
        let image = decode(&png(20, 10)).unwrap();

        let bytes = render(&image, spec).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let thumb = decode(&bytes).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (20, 10));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode(b"definitely not an image").is_err());
    }
}
