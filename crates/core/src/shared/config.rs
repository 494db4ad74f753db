//! Tunable policy constants, grouped per component.
//!
//! Every field has a default, so a config file only needs to name the
//! values it overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::MIN_MODEL_BYTES;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub store: StoreConfig,
    pub quality: QualityConfig,
    pub aligner: AlignerConfig,
    pub aggregator: AggregatorConfig,
    pub liveness: LivenessConfig,
    pub models: ModelConfig,
}

impl RecognitionConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.match_threshold.is_nan() || self.store.match_threshold <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "store.match_threshold must be positive, got {}",
                self.store.match_threshold
            )));
        }
        if self.store.max_samples == 0 {
            return Err(ConfigError::Invalid(
                "store.max_samples must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.quality.floor) {
            return Err(ConfigError::Invalid(format!(
                "quality.floor must be between 0.0 and 1.0, got {}",
                self.quality.floor
            )));
        }
        if self.aligner.crop_size < 16 {
            return Err(ConfigError::Invalid(format!(
                "aligner.crop_size must be at least 16, got {}",
                self.aligner.crop_size
            )));
        }
        if self.liveness.min_frames < 2 {
            return Err(ConfigError::Invalid(format!(
                "liveness.min_frames must be at least 2, got {}",
                self.liveness.min_frames
            )));
        }
        if !(0.0..=1.0).contains(&self.liveness.threshold) {
            return Err(ConfigError::Invalid(format!(
                "liveness.threshold must be between 0.0 and 1.0, got {}",
                self.liveness.threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// File the identity table is persisted to.
    pub path: PathBuf,
    /// Maximum Euclidean distance at which an embedding matches an identity.
    pub match_threshold: f64,
    /// Samples kept per identity; the oldest is evicted first.
    pub max_samples: usize,
    /// Write the store back to disk after every mutation.
    pub autosave: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("identities.json"),
            match_threshold: 0.6,
            max_samples: 15,
            autosave: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Frames scoring below this are dropped before alignment.
    pub floor: f64,
    /// Laplacian variance at which a frame counts as fully sharp.
    pub sharpness_norm: f64,
    /// Mean luminance band considered well exposed.
    pub min_brightness: f64,
    pub max_brightness: f64,
    /// Luminance at or below/above which a pixel counts as clipped.
    pub clip_low: f32,
    pub clip_high: f32,
    /// Clipped-pixel fraction at which the exposure score reaches zero.
    pub max_clipped_fraction: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            floor: 0.35,
            sharpness_norm: 250.0,
            min_brightness: 60.0,
            max_brightness: 200.0,
            clip_low: 5.0,
            clip_high: 250.0,
            max_clipped_fraction: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Side length of the square aligned crop.
    pub crop_size: u32,
    /// Detections below this confidence are ignored.
    pub min_confidence: f64,
    /// Fewer visible fiducials than this and the face is unusable.
    pub min_visible_landmarks: usize,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            crop_size: 112,
            min_confidence: 0.5,
            min_visible_landmarks: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// L2-normalize the aggregated embedding. Off by default because the
    /// default match threshold is expressed in the encoder's native space.
    pub renormalize: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    pub min_frames: usize,
    /// Combined score at or above which a capture is live.
    pub threshold: f64,
    /// Mean landmark displacement (in inter-ocular distances) that saturates
    /// the motion score.
    pub motion_target: f64,
    /// Coefficient of variation of face texture that saturates the texture score.
    pub texture_target: f64,
    /// Eye-aspect-ratio below which an eye counts as closed.
    pub ear_closed: f64,
    /// Eye-aspect-ratio above which an eye counts as open.
    pub ear_open: f64,
    /// Span of profile ratio required to satisfy a head-turn challenge.
    pub turn_ratio_range: f64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            min_frames: 5,
            threshold: 0.5,
            motion_target: 0.02,
            texture_target: 0.1,
            ear_closed: 0.2,
            ear_open: 0.25,
            turn_ratio_range: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Explicit detector model path; resolved from the cache otherwise.
    pub detector: Option<PathBuf>,
    /// Explicit encoder model path; resolved from the cache otherwise.
    pub encoder: Option<PathBuf>,
    pub min_model_bytes: u64,
    pub detector_confidence: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector: None,
            encoder: None,
            min_model_bytes: MIN_MODEL_BYTES,
            detector_confidence: 0.5,
        }
    }
}
