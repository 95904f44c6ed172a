//! 2D drawing surfaces.

use parking_lot::RwLock;
use tracing::trace;

use crate::error::CaptureError;
use crate::frame::VideoFrame;
use crate::CaptureResult;

/// RGBA pixels with their size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageData {
    /// Transparent black image.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn new(width: u32, height: u32, data: Vec<u8>) -> CaptureResult<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(CaptureError::FrameConversion(format!(
                "{width}x{height} RGBA needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

/// A canvas element holding an RGBA bitmap.
#[derive(Debug)]
pub struct Canvas {
    id: String,
    bitmap: RwLock<ImageData>,
}

impl Canvas {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bitmap: RwLock::new(ImageData::blank(0, 0)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let bitmap = self.bitmap.read();
        (bitmap.width, bitmap.height)
    }

    /// Resize, clearing the bitmap.
    pub fn resize(&self, width: u32, height: u32) {
        *self.bitmap.write() = ImageData::blank(width, height);
    }

    /// Size the canvas to the image and draw it at the origin.
    pub fn draw_image(&self, image: ImageData) {
        trace!(canvas = %self.id, width = image.width, height = image.height, "Image drawn");
        *self.bitmap.write() = image;
    }

    /// Draw a video frame, sizing the canvas to it.
    pub fn draw_frame(&self, frame: &VideoFrame) -> CaptureResult<()> {
        let image = ImageData::new(frame.width, frame.height, frame.data.to_vec())?;
        self.draw_image(image);
        Ok(())
    }

    /// Copy of the current pixels.
    pub fn image_data(&self) -> ImageData {
        self.bitmap.read().clone()
    }

    /// Replace pixels at the origin. The canvas keeps its size when the
    /// image fits and grows to the image otherwise.
    pub fn put_image_data(&self, image: &ImageData) {
        let mut bitmap = self.bitmap.write();
        if image.width > bitmap.width || image.height > bitmap.height {
            let width = bitmap.width.max(image.width);
            let height = bitmap.height.max(image.height);
            let mut grown = ImageData::blank(width, height);
            blit(&mut grown, &bitmap);
            *bitmap = grown;
        }
        blit(&mut bitmap, image);
    }
}

fn blit(dst: &mut ImageData, src: &ImageData) {
    let row = src.width as usize * 4;
    let dst_row = dst.width as usize * 4;
    for y in 0..src.height as usize {
        let s = y * row;
        let d = y * dst_row;
        dst.data[d..d + row].copy_from_slice(&src.data[s..s + row]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_image_adopts_natural_size() {
        let canvas = Canvas::new("c");
        canvas.draw_image(ImageData::new(2, 1, vec![1; 8]).unwrap());
        assert_eq!(canvas.dimensions(), (2, 1));
        assert_eq!(canvas.image_data().data, vec![1; 8]);
    }

    #[test]
    fn test_image_data_size_is_checked() {
        assert!(ImageData::new(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn test_put_image_data_keeps_larger_canvas() {
        let canvas = Canvas::new("c");
        canvas.resize(3, 2);
        canvas.put_image_data(&ImageData::new(1, 1, vec![9, 9, 9, 9]).unwrap());
        let image = canvas.image_data();
        assert_eq!((image.width, image.height), (3, 2));
        assert_eq!(&image.data[..4], &[9, 9, 9, 9]);
        assert_eq!(&image.data[4..8], &[0, 0, 0, 0]);
    }
}
