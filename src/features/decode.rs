use std::path::Path;

use super::{ExtractionError, PixelBuffer};

/// Decode encoded image bytes (PNG, JPEG, ...) into an RGB pixel buffer.
pub fn decode_image(bytes: &[u8]) -> Result<PixelBuffer, ExtractionError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = rgb.dimensions();
    PixelBuffer::new(width, height, 3, rgb.into_raw())
}

/// Read and decode an image file.
pub fn decode_image_file(path: &Path) -> Result<PixelBuffer, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    decode_image(&bytes)
}

#[cfg(test)]
pub(crate) fn encode_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encode");
    bytes
}
