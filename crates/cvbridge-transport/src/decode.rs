//! Image decoding.

use tracing::debug;

use crate::error::TransportError;
use crate::TransportResult;

/// Decoded image at its natural size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,

    /// Tightly packed RGBA.
    pub rgba: Vec<u8>,
}

/// Decode any supported image format to RGBA.
pub fn decode_image(bytes: &[u8]) -> TransportResult<DecodedImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| TransportError::Decode(e.to_string()))?
        .to_rgba8();

    let (width, height) = image.dimensions();
    debug!(width, height, "Image decoded");

    Ok(DecodedImage {
        width,
        height,
        rgba: image.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_png() {
        let mut img = image::RgbaImage::new(3, 2);
        img.put_pixel(2, 1, image::Rgba([10, 20, 30, 255]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_image(&png).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(&decoded.rgba[20..24], &[10, 20, 30, 255]);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(
            decode_image(b"definitely not an image"),
            Err(TransportError::Decode(_))
        ));
    }
}
