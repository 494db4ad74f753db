use crate::shared::config::QualityConfig;
use crate::shared::frame::Frame;
use crate::shared::image_ops::{clipped_fraction, laplacian_variance, mean_brightness, Window};

/// Scores how usable a raw frame is for face matching, in `[0, 1]`.
///
/// The score is `sharpness × exposure`:
/// - sharpness: Laplacian variance of the luminance, saturating at
///   `sharpness_norm`;
/// - exposure: 1 inside the configured brightness band, falling linearly to
///   0 at pure black/white, further scaled down by the clipped-pixel
///   fraction.
///
/// Degenerate buffers score 0.
#[derive(Clone, Debug, Default)]
pub struct FrameQualityScorer {
    config: QualityConfig,
}

/// Sub-scores behind a [`FrameQualityScorer::score`] value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityBreakdown {
    pub sharpness: f64,
    pub exposure: f64,
    pub score: f64,
}

impl QualityBreakdown {
    const ZERO: Self = Self {
        sharpness: 0.0,
        exposure: 0.0,
        score: 0.0,
    };
}

impl FrameQualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn floor(&self) -> f64 {
        self.config.floor
    }

    pub fn score(&self, frame: &Frame) -> f64 {
        self.breakdown(frame).score
    }

    pub fn passes(&self, score: f64) -> bool {
        score >= self.config.floor
    }

    pub fn breakdown(&self, frame: &Frame) -> QualityBreakdown {
        if frame.is_degenerate() {
            return QualityBreakdown::ZERO;
        }
        let luma = frame.luminance();
        let width = frame.width() as usize;
        let height = frame.height() as usize;

        let variance = laplacian_variance(&luma, width, Window::full(width, height));
        let sharpness = if self.config.sharpness_norm > 0.0 {
            (variance / self.config.sharpness_norm).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let exposure = self.exposure(&luma);
        let score = (sharpness * exposure).clamp(0.0, 1.0);
        if score.is_nan() {
            return QualityBreakdown::ZERO;
        }

        QualityBreakdown {
            sharpness,
            exposure,
            score,
        }
    }

    fn exposure(&self, luma: &[f32]) -> f64 {
        let c = &self.config;
        let mean = mean_brightness(luma);
        let band = if mean < c.min_brightness {
            if c.min_brightness > 0.0 {
                mean / c.min_brightness
            } else {
                1.0
            }
        } else if mean > c.max_brightness {
            if c.max_brightness < 255.0 {
                (255.0 - mean) / (255.0 - c.max_brightness)
            } else {
                1.0
            }
        } else {
            1.0
        };

        let clipped = clipped_fraction(luma, c.clip_low, c.clip_high);
        let clip_factor = if c.max_clipped_fraction > 0.0 {
            1.0 - clipped / c.max_clipped_fraction
        } else {
            1.0
        };

        (band.clamp(0.0, 1.0) * clip_factor.clamp(0.0, 1.0)).clamp(0.0, 1.0)
    }
}
