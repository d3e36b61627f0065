use super::ExtractionError;

/// 8-bit pixel buffer handed over by the image decode boundary.
///
/// Rows are stored top to bottom, pixels left to right, channels interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw bytes, checking the channel layout and the byte count.
    ///
    /// Supported layouts are gray (1), RGB (3) and RGBA (4, alpha ignored).
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self, ExtractionError> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(ExtractionError::UnsupportedChannels(channels));
        }
        let expected = (width as usize)
            .saturating_mul(height as usize)
            .saturating_mul(channels as usize);
        if data.len() != expected {
            return Err(ExtractionError::BufferSize {
                width,
                height,
                channels,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// True when the buffer holds no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Per-pixel luminance normalized to `[0, 1]`, row-major.
    pub fn luminance(&self) -> Vec<f32> {
        let stride = self.channels as usize;
        self.data
            .chunks_exact(stride)
            .map(|px| match stride {
                1 => px[0] as f32 / 255.0,
                _ => luma(px[0], px[1], px[2]),
            })
            .collect()
    }
}

/// BT.601 luma of an 8-bit RGB triple, scaled to `[0, 1]`.
pub(crate) fn luma(r: u8, g: u8, b: u8) -> f32 {
    let value = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    (value / 255.0).clamp(0.0, 1.0)
}
