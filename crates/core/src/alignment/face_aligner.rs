//! Detect the most prominent face in a frame and warp it onto the canonical
//! landmark layout.
//!
//! Face selection policy: detections below `min_confidence` are discarded,
//! then the largest bounding-box area wins; equal areas go to the face the
//! detector reported first.

use std::sync::Arc;

use crate::detection::domain::detected_face::{most_prominent, DetectedFace};
use crate::detection::domain::face_encoder::FaceEncoder;
use crate::shared::config::AlignerConfig;
use crate::shared::frame::Frame;

use super::aligned_face::AlignedFace;
use super::similarity_transform::{reference_points, SimilarityTransform};

pub struct FaceAligner {
    encoder: Arc<dyn FaceEncoder>,
    config: AlignerConfig,
}

impl FaceAligner {
    pub fn new(encoder: Arc<dyn FaceEncoder>, config: AlignerConfig) -> Self {
        Self { encoder, config }
    }

    /// Most prominent sufficiently-confident face, or `None`.
    ///
    /// Detector failures are logged and treated as "no face" so a single
    /// bad frame never aborts a burst.
    pub fn detect_primary(&self, frame: &Frame) -> Option<DetectedFace> {
        if frame.is_degenerate() {
            return None;
        }
        let faces = match self.encoder.detect_landmarks(frame) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("Landmark detection failed on frame {}: {e}", frame.index());
                return None;
            }
        };
        let confident: Vec<DetectedFace> = faces
            .into_iter()
            .filter(|f| f.confidence >= self.config.min_confidence)
            .collect();
        most_prominent(&confident).cloned()
    }

    /// [`detect_primary`](Self::detect_primary) for every frame, in order.
    pub fn detect_all(&self, frames: &[Frame]) -> Vec<Option<DetectedFace>> {
        frames.iter().map(|f| self.detect_primary(f)).collect()
    }

    /// Aligned crop of the most prominent face, or `None` when no usable
    /// face is present.
    pub fn align(&self, frame: &Frame) -> Option<AlignedFace> {
        let face = self.detect_primary(frame)?;
        self.align_detected(frame, &face)
    }

    /// Aligned crop for an already-selected face.
    pub fn align_detected(&self, frame: &Frame, face: &DetectedFace) -> Option<AlignedFace> {
        let reference = reference_points(self.config.crop_size);
        let landmarks = &face.landmarks;

        let (src, dst): (Vec<_>, Vec<_>) = (0..5)
            .filter(|&i| landmarks.is_visible(i))
            .map(|i| (landmarks.points()[i], reference[i]))
            .unzip();
        if src.len() < self.config.min_visible_landmarks.max(2) {
            log::debug!(
                "Frame {}: only {} visible landmarks, skipping",
                frame.index(),
                src.len()
            );
            return None;
        }

        let transform = SimilarityTransform::estimate(&src, &dst)?;
        let inverse = transform.inverse()?;
        Some(warp(frame, &inverse, self.config.crop_size))
    }
}

/// Samples `frame` through `crop_to_frame` into a square RGB crop.
/// Pixels mapping outside the frame are black.
fn warp(frame: &Frame, crop_to_frame: &SimilarityTransform, size: u32) -> AlignedFace {
    let s = size as usize;
    let mut data = Vec::with_capacity(s * s * 3);
    for v in 0..s {
        for u in 0..s {
            let (x, y) = crop_to_frame.apply((u as f64, v as f64));
            data.extend_from_slice(&bilinear_rgb(frame, x, y));
        }
    }
    AlignedFace::new(data, size)
}

fn bilinear_rgb(frame: &Frame, x: f64, y: f64) -> [u8; 3] {
    let w = frame.width() as i64;
    let h = frame.height() as i64;
    if x < 0.0 || y < 0.0 || x > (w - 1) as f64 || y > (h - 1) as f64 {
        return [0, 0, 0];
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let c = frame.channels() as usize;
    let data = frame.data();
    let px = |xx: i64, yy: i64, ch: usize| -> f64 {
        let ch = if c >= 3 { ch } else { 0 };
        data[(yy as usize * w as usize + xx as usize) * c + ch] as f64
    };

    let mut out = [0u8; 3];
    for (ch, slot) in out.iter_mut().enumerate() {
        let top = px(x0, y0, ch) * (1.0 - fx) + px(x1, y0, ch) * fx;
        let bottom = px(x0, y1, ch) * (1.0 - fx) + px(x1, y1, ch) * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}
