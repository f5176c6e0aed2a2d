use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageOutputFormat, RgbaImage};

use crate::core::config::FrameFormat;
use crate::core::error::{CaptureError, PipelineError};

/// Largest surface edge we are willing to allocate.
pub const MAX_SURFACE_DIM: u32 = 16_384;

/// Encoded still image (JPEG/PNG bytes plus mime type). Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// File name used for multipart uploads.
    pub fn file_name(&self, stem: &str) -> String {
        let ext = match self.mime_type.as_str() {
            "image/png" => "png",
            "image/bmp" => "bmp",
            _ => "jpg",
        };
        format!("{stem}.{ext}")
    }

    pub fn decode(&self) -> Result<RgbaImage, image::ImageError> {
        Ok(image::load_from_memory(&self.bytes)?.to_rgba8())
    }

    /// Reads only the header.
    pub fn dimensions(&self) -> Result<(u32, u32), image::ImageError> {
        image::io::Reader::new(Cursor::new(&self.bytes[..]))
            .with_guessed_format()?
            .into_dimensions()
    }
}

/// One sampled instant of the source video. Immutable once built.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub timestamp_seconds: f64,
    pub image: EncodedImage,
}

impl Frame {
    pub fn new(index: usize, timestamp_seconds: f64, image: EncodedImage) -> Self {
        Self {
            index,
            timestamp_seconds,
            image,
        }
    }
}

/// RGBA drawing surface sized to the video's natural dimensions.
#[derive(Debug, Clone)]
pub struct Surface {
    canvas: RgbaImage,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 || width > MAX_SURFACE_DIM || height > MAX_SURFACE_DIM {
            return Err(PipelineError::UnsupportedEnvironment(format!(
                "cannot allocate a {width}x{height} drawing surface"
            )));
        }
        Ok(Self {
            canvas: RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255])),
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    pub fn pixel_count(&self) -> usize {
        (self.width() * self.height()) as usize
    }

    pub fn clear(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = image::Rgba([0, 0, 0, 255]);
        }
    }

    /// Draw `img` over the whole surface, stretching it when the sizes differ.
    pub fn draw_image(&mut self, img: &RgbaImage) {
        if img.dimensions() == self.canvas.dimensions() {
            self.canvas.copy_from_slice(img.as_raw());
            return;
        }
        let resized = image::imageops::resize(
            img,
            self.width(),
            self.height(),
            image::imageops::FilterType::Triangle,
        );
        self.canvas.copy_from_slice(resized.as_raw());
    }

    /// Draw a packed RGBA buffer that must match the surface size exactly.
    pub fn draw_raw_rgba(&mut self, width: u32, height: u32, data: &[u8]) -> Result<(), CaptureError> {
        if (width, height) != self.canvas.dimensions() {
            return Err(CaptureError::Draw(format!(
                "raster is {width}x{height}, surface is {}x{}",
                self.width(),
                self.height()
            )));
        }
        if data.len() != self.pixel_count() * 4 {
            return Err(CaptureError::Draw(format!(
                "expected {} bytes, got {}",
                self.pixel_count() * 4,
                data.len()
            )));
        }
        self.canvas.copy_from_slice(data);
        Ok(())
    }

    pub fn encode(&self, format: FrameFormat, jpeg_quality: u8) -> Result<EncodedImage, CaptureError> {
        let mut buffer = Cursor::new(Vec::new());
        match format {
            FrameFormat::Jpeg => {
                // JPEG carries no alpha channel.
                let rgb = DynamicImage::ImageRgba8(self.canvas.clone()).to_rgb8();
                rgb.write_to(&mut buffer, ImageOutputFormat::Jpeg(jpeg_quality))?;
            }
            FrameFormat::Png => {
                self.canvas.write_to(&mut buffer, ImageOutputFormat::Png)?;
            }
        }
        Ok(EncodedImage::new(buffer.into_inner(), format.mime_type()))
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn snapshot(&self) -> RgbaImage {
        self.canvas.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_image(width: u32, height: u32, fill: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, image::Rgba([fill, fill, fill, 255]))
    }

    #[test]
    fn test_surface_creation() {
        let surface = Surface::new(100, 50).expect("surface");
        assert_eq!(surface.width(), 100);
        assert_eq!(surface.height(), 50);
        assert_eq!(surface.pixel_count(), 5000);
    }

    #[test]
    fn test_surface_rejects_zero_dimension() {
        assert!(matches!(
            Surface::new(0, 10),
            Err(PipelineError::UnsupportedEnvironment(_))
        ));
    }

    #[test]
    fn test_draw_image_resizes() {
        let mut surface = Surface::new(32, 32).expect("surface");
        surface.draw_image(&create_test_image(100, 100, 200));
        assert_eq!(surface.as_image().get_pixel(16, 16).0, [200, 200, 200, 255]);
    }

    #[test]
    fn test_clear_resets_to_black() {
        let mut surface = Surface::new(8, 8).expect("surface");
        surface.draw_image(&create_test_image(8, 8, 255));
        surface.clear();
        assert!(surface.as_image().pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn test_draw_raw_rgba_size_mismatch() {
        let mut surface = Surface::new(4, 4).expect("surface");
        let result = surface.draw_raw_rgba(4, 4, &[0u8; 10]);
        assert!(matches!(result, Err(CaptureError::Draw(_))));
        assert!(surface.draw_raw_rgba(4, 4, &[7u8; 64]).is_ok());
    }

    #[test]
    fn test_encode_jpeg_and_png_decode_back() {
        let mut surface = Surface::new(16, 16).expect("surface");
        surface.draw_image(&create_test_image(16, 16, 128));

        let jpeg = surface.encode(FrameFormat::Jpeg, 90).expect("jpeg");
        assert_eq!(jpeg.mime_type(), "image/jpeg");
        assert_eq!(jpeg.decode().expect("decode").dimensions(), (16, 16));

        let png = surface.encode(FrameFormat::Png, 90).expect("png");
        assert_eq!(png.mime_type(), "image/png");
        assert_eq!(png.decode().expect("decode").get_pixel(3, 3).0, [128, 128, 128, 255]);
    }

    #[test]
    fn test_dimensions_from_header() {
        let png = Surface::new(12, 7).expect("surface").encode(FrameFormat::Png, 90).expect("png");
        assert_eq!(png.dimensions().expect("header"), (12, 7));
        assert!(EncodedImage::new(vec![0, 1, 2], "image/jpeg").dimensions().is_err());
    }

    #[test]
    fn test_file_name_follows_mime() {
        let img = EncodedImage::new(vec![1, 2, 3], "image/png");
        assert_eq!(img.file_name("frame_0001"), "frame_0001.png");
        assert_eq!(img.len(), 3);
    }
}
