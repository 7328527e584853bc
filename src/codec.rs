//! Image decode/encode capability
//!
//! The pipeline only ever needs two codec operations: turn bytes into a bitmap
//! and write a bitmap out as PNG. Keeping them behind [`ImageCodec`] lets the
//! binary and the tests share one pipeline.

use crate::error::{BgRemovalError, Result};
use image::{metadata::Orientation, DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

/// Decode arbitrary image bytes and encode PNG output
pub trait ImageCodec {
    /// Decode encoded image bytes into a bitmap, guessing the format from content
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage>;

    /// Encode a bitmap as PNG bytes
    fn encode_png(&self, image: &DynamicImage) -> Result<Vec<u8>>;

    /// Save a bitmap as a PNG file, creating or truncating `path`
    fn save_png(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        let bytes = self.encode_png(image)?;
        std::fs::write(path, bytes)
            .map_err(|e| BgRemovalError::file_io_error("write output image", path, &e))
    }
}

/// `image` crate codec that always writes 8-bit RGBA PNGs
#[derive(Debug, Default, Clone, Copy)]
pub struct PngCodec;

impl PngCodec {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for PngCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(BgRemovalError::processing("Cannot decode empty image data"));
        }
        let mut decoder = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .into_decoder()?;
        // Cameras record rotation in EXIF rather than in the pixel grid
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);
        Ok(image)
    }

    fn encode_png(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        // RGBA8 so the file always carries an alpha channel
        let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
        let mut buffer = Cursor::new(Vec::new());
        rgba.write_to(&mut buffer, ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }
}
