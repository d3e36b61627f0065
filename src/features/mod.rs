//! Deterministic feature extraction from decoded pixel buffers.
//!
//! Every extractor is a pure function of its [`ExtractorConfig`] and the pixel
//! data: the same pixels always produce the same vector. The configuration is
//! part of a trained model's identity, so changing the canonical size, the
//! resample method or the strategy invalidates previously trained state.

mod decode;
mod pixels;
mod resample;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
pub(crate) use decode::encode_png;
pub use decode::{decode_image, decode_image_file};
pub use pixels::PixelBuffer;
pub use resample::ResampleMethod;

use resample::resample_plane;

/// Version tag mixed into extractor fingerprints.
pub const EXTRACTOR_VERSION: u32 = 1;

/// Fixed-length numeric summary of an image.
pub type FeatureVector = Vec<f32>;

/// Errors raised while turning an image into pixels or features.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height}x{channels}")]
    BufferSize {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },
    #[error("unsupported channel count {0} (expected 1, 3 or 4)")]
    UnsupportedChannels(u8),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to read image {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("invalid extractor configuration: {0}")]
    InvalidConfig(String),
}

/// How a canonical-size luminance plane is summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// Flattened luminance plane, row-major.
    RawGrayscale,
    /// Mean and population standard deviation of luminance.
    SummaryStats,
    /// Fraction of pixels per equal-width luminance bin.
    Histogram,
}

/// Extractor identity: strategy, canonical size and resampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub strategy: ExtractionStrategy,
    pub canonical_width: u32,
    pub canonical_height: u32,
    pub resample: ResampleMethod,
    /// Only meaningful for [`ExtractionStrategy::Histogram`].
    pub histogram_bins: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            strategy: ExtractionStrategy::Histogram,
            canonical_width: 128,
            canonical_height: 128,
            resample: ResampleMethod::Bilinear,
            histogram_bins: 16,
        }
    }
}

impl ExtractorConfig {
    /// Check that the configuration describes a non-empty vector.
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.canonical_width == 0 || self.canonical_height == 0 {
            return Err(ExtractionError::InvalidConfig(format!(
                "canonical size {}x{} must be non-zero",
                self.canonical_width, self.canonical_height
            )));
        }
        if self.strategy == ExtractionStrategy::Histogram && self.histogram_bins == 0 {
            return Err(ExtractionError::InvalidConfig(
                "histogram needs at least one bin".to_string(),
            ));
        }
        Ok(())
    }

    /// Length of the vectors produced by this configuration.
    pub fn dimension(&self) -> usize {
        match self.strategy {
            ExtractionStrategy::RawGrayscale => {
                self.canonical_width as usize * self.canonical_height as usize
            }
            ExtractionStrategy::SummaryStats => 2,
            ExtractionStrategy::Histogram => self.histogram_bins,
        }
    }

    /// Stable identifier of everything that shapes the feature distribution.
    pub fn fingerprint(&self) -> String {
        let payload = format!(
            "v={}|strategy={:?}|w={}|h={}|resample={:?}|bins={}|luma=bt601",
            EXTRACTOR_VERSION,
            self.strategy,
            self.canonical_width,
            self.canonical_height,
            self.resample,
            self.histogram_bins
        );
        let hash = blake3::hash(payload.as_bytes());
        let hex = hash.to_hex();
        format!("extractor_v{}_{}", EXTRACTOR_VERSION, &hex.as_str()[..16])
    }
}

/// Stateless extractor bound to one validated configuration.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Result<Self, ExtractionError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn dimension(&self) -> usize {
        self.config.dimension()
    }

    pub fn fingerprint(&self) -> String {
        self.config.fingerprint()
    }

    /// Extract the configured feature vector.
    ///
    /// A buffer without pixels yields the all-zero vector of the configured
    /// dimension; any other valid buffer always succeeds.
    pub fn extract(&self, pixels: &PixelBuffer) -> FeatureVector {
        let dim = self.dimension();
        if pixels.is_empty() {
            return vec![0.0; dim];
        }
        let plane = resample_plane(
            &pixels.luminance(),
            pixels.width() as usize,
            pixels.height() as usize,
            self.config.canonical_width as usize,
            self.config.canonical_height as usize,
            self.config.resample,
        );
        match self.config.strategy {
            ExtractionStrategy::RawGrayscale => plane,
            ExtractionStrategy::SummaryStats => summary_stats(&plane),
            ExtractionStrategy::Histogram => histogram(&plane, self.config.histogram_bins),
        }
    }

    /// Decode encoded image bytes and extract their features.
    pub fn extract_encoded(&self, bytes: &[u8]) -> Result<FeatureVector, ExtractionError> {
        let pixels = decode_image(bytes)?;
        Ok(self.extract(&pixels))
    }

    /// Read, decode and extract an image file.
    pub fn extract_file(&self, path: &Path) -> Result<FeatureVector, ExtractionError> {
        let pixels = decode_image_file(path)?;
        Ok(self.extract(&pixels))
    }
}

fn summary_stats(plane: &[f32]) -> FeatureVector {
    let n = plane.len() as f64;
    let mean = plane.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = plane
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    vec![mean as f32, variance.sqrt() as f32]
}

fn histogram(plane: &[f32], bins: usize) -> FeatureVector {
    let mut counts = vec![0usize; bins];
    for &value in plane {
        let idx = ((value.clamp(0.0, 1.0) * bins as f32) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    let total = plane.len() as f32;
    counts.into_iter().map(|c| c as f32 / total).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: ExtractionStrategy, size: u32) -> ExtractorConfig {
        ExtractorConfig {
            strategy,
            canonical_width: size,
            canonical_height: size,
            resample: ResampleMethod::Nearest,
            histogram_bins: 4,
        }
    }

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let data = (0..width * height)
            .map(|i| ((i * 255) / (width * height - 1).max(1)) as u8)
            .collect();
        PixelBuffer::new(width, height, 1, data).unwrap()
    }

    #[test]
    fn dimension_follows_strategy() {
        assert_eq!(config(ExtractionStrategy::RawGrayscale, 8).dimension(), 64);
        assert_eq!(config(ExtractionStrategy::SummaryStats, 8).dimension(), 2);
        assert_eq!(config(ExtractionStrategy::Histogram, 8).dimension(), 4);
        assert_eq!(ExtractorConfig::default().dimension(), 16);
    }

    #[test]
    fn empty_buffer_yields_zero_vector() {
        let extractor = FeatureExtractor::new(config(ExtractionStrategy::RawGrayscale, 4)).unwrap();
        let empty = PixelBuffer::new(0, 0, 3, Vec::new()).unwrap();
        assert_eq!(extractor.extract(&empty), vec![0.0; 16]);
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = FeatureExtractor::new(ExtractorConfig::default()).unwrap();
        let pixels = gradient(37, 23);
        assert_eq!(extractor.extract(&pixels), extractor.extract(&pixels));
    }

    #[test]
    fn histogram_sums_to_one() {
        let extractor = FeatureExtractor::new(config(ExtractionStrategy::Histogram, 16)).unwrap();
        let features = extractor.extract(&gradient(16, 16));
        let sum: f32 = features.iter().sum();
        assert_eq!(features.len(), 4);
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(features.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn summary_stats_of_uniform_image() {
        let extractor = FeatureExtractor::new(config(ExtractionStrategy::SummaryStats, 4)).unwrap();
        let pixels = PixelBuffer::new(3, 3, 3, vec![255; 27]).unwrap();
        let features = extractor.extract(&pixels);
        assert!((features[0] - 1.0).abs() < 1e-6);
        assert!(features[1].abs() < 1e-6);
    }

    #[test]
    fn raw_vector_stays_normalized() {
        let extractor = FeatureExtractor::new(config(ExtractionStrategy::RawGrayscale, 5)).unwrap();
        let features = extractor.extract(&gradient(9, 7));
        assert_eq!(features.len(), 25);
        assert!(features.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn fingerprint_changes_with_identity() {
        let a = config(ExtractionStrategy::Histogram, 16);
        let mut b = a.clone();
        b.resample = ResampleMethod::Bilinear;
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("extractor_v1_"));
    }

    #[test]
    fn rejects_zero_sized_canonical_image() {
        let err = FeatureExtractor::new(config(ExtractionStrategy::RawGrayscale, 0)).unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidConfig(_)));
    }
}
