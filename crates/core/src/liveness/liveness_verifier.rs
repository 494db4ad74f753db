//! Decides whether a burst of frames comes from a live subject.
//!
//! The primary face is tracked through the burst and three signals are
//! combined into a weighted score over whichever are available:
//!
//! | signal  | weight | saturates at                          |
//! |---------|--------|---------------------------------------|
//! | motion  | 0.5    | `motion_target` inter-ocular distances |
//! | texture | 0.2    | `texture_target` coefficient of variation |
//! | blink   | 0.3    | one open-then-closed eye transition    |
//!
//! A prescribed challenge must additionally be observed.

use std::sync::Arc;

use crate::alignment::face_aligner::FaceAligner;
use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::face_encoder::FaceEncoder;
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::config::{AlignerConfig, LivenessConfig};
use crate::shared::frame::Frame;

use super::liveness_signals::{blink, landmark_motion, texture_variation, turn_span};
use super::liveness_verdict::{Challenge, DebugMap, LivenessVerdict};

const MOTION_WEIGHT: f64 = 0.5;
const TEXTURE_WEIGHT: f64 = 0.2;
const BLINK_WEIGHT: f64 = 0.3;

pub struct LivenessVerifier {
    aligner: FaceAligner,
    config: LivenessConfig,
}

impl LivenessVerifier {
    pub fn new(encoder: Arc<dyn FaceEncoder>, aligner: AlignerConfig, config: LivenessConfig) -> Self {
        Self {
            aligner: FaceAligner::new(encoder, aligner),
            config,
        }
    }

    /// Never fails: unusable input yields `is_live = false` with a reason.
    pub fn verify(&self, frames: &[Frame], challenge: Option<Challenge>) -> LivenessVerdict {
        self.verify_and_detect(frames, challenge).0
    }

    /// Like [`verify`](Self::verify), also returning the primary face found
    /// in each frame so callers can reuse the detections. The detections are
    /// `None` when the burst was rejected before detection ran.
    pub fn verify_and_detect(
        &self,
        frames: &[Frame],
        challenge: Option<Challenge>,
    ) -> (LivenessVerdict, Option<Vec<Option<DetectedFace>>>) {
        let (verdict, detected) = self.evaluate(frames, challenge);
        log::debug!(
            "Liveness verdict: live={} ({})",
            verdict.is_live,
            verdict.reason().unwrap_or("")
        );
        (verdict, detected)
    }

    fn evaluate(
        &self,
        frames: &[Frame],
        challenge: Option<Challenge>,
    ) -> (LivenessVerdict, Option<Vec<Option<DetectedFace>>>) {
        let c = &self.config;
        let mut debug = DebugMap::default();
        debug.set("frame_count", frames.len());
        debug.set("min_frames", c.min_frames);
        debug.set("threshold", c.threshold);
        debug.set(
            "challenge",
            challenge.map_or_else(|| "none".to_string(), |ch| ch.to_string()),
        );

        if frames.len() < c.min_frames {
            let reason = format!("Not enough frames (got {}, need {})", frames.len(), c.min_frames);
            return (debug.finish(false, reason), None);
        }

        let detected = self.aligner.detect_all(frames);
        let verdict = self.score(frames, &detected, challenge, debug);
        (verdict, Some(detected))
    }

    fn score(
        &self,
        frames: &[Frame],
        detected: &[Option<DetectedFace>],
        challenge: Option<Challenge>,
        mut debug: DebugMap,
    ) -> LivenessVerdict {
        let c = &self.config;
        let faces: Vec<(&Frame, &DetectedFace)> = frames
            .iter()
            .zip(detected)
            .filter_map(|(frame, face)| face.as_ref().map(|face| (frame, face)))
            .collect();
        debug.set("face_frames", faces.len());
        if faces.len() < c.min_frames {
            return debug.finish(
                false,
                format!(
                    "Face not found in enough frames (got {}, need {})",
                    faces.len(),
                    c.min_frames
                ),
            );
        }

        let landmarks: Vec<&FaceLandmarks> = faces.iter().map(|(_, f)| &f.landmarks).collect();
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;

        if let Some(motion) = landmark_motion(&landmarks) {
            let score = ratio_score(motion.deformation, c.motion_target);
            debug.set("motion", motion.deformation);
            debug.set("centroid_motion", motion.centroid_shift);
            debug.set("motion_score", score);
            weighted += MOTION_WEIGHT * score;
            weight_sum += MOTION_WEIGHT;
        }

        let regions: Vec<_> = faces.iter().map(|(frame, f)| (*frame, f.region)).collect();
        if let Some(texture) = texture_variation(&regions) {
            let score = ratio_score(texture.variation, c.texture_target);
            debug.set("texture_variation", texture.variation);
            debug.set("face_sharpness", texture.mean_sharpness);
            debug.set("texture_score", score);
            weighted += TEXTURE_WEIGHT * score;
            weight_sum += TEXTURE_WEIGHT;
        }

        let blink_signal = blink(&landmarks, c.ear_closed, c.ear_open);
        if let Some(b) = blink_signal {
            let score = if b.detected { 1.0 } else { 0.0 };
            debug.set("ear_min", b.ear_min);
            debug.set("ear_max", b.ear_max);
            debug.set("blink_detected", b.detected);
            debug.set("blink_score", score);
            weighted += BLINK_WEIGHT * score;
            weight_sum += BLINK_WEIGHT;
        }

        let turn = turn_span(&landmarks);
        if let Some(span) = turn {
            debug.set("turn_span", span);
            debug.set("turn_detected", span >= c.turn_ratio_range);
        }

        let score = if weight_sum > 0.0 { weighted / weight_sum } else { 0.0 };
        debug.set("liveness_score", score);

        let challenge_failure = match challenge {
            Some(Challenge::Blink) if !blink_signal.is_some_and(|b| b.detected) => {
                Some("Blink not detected")
            }
            Some(Challenge::TurnHead) if !turn.is_some_and(|s| s >= c.turn_ratio_range) => {
                Some("Head turn not detected")
            }
            _ => None,
        };
        if let Some(ch) = challenge {
            debug.set("challenge_passed", challenge_failure.is_none());
            log::debug!("Challenge {ch}: passed={}", challenge_failure.is_none());
        }

        if score < c.threshold {
            return debug.finish(
                false,
                format!("Liveness score {score:.3} below threshold {:.3}", c.threshold),
            );
        }
        if let Some(reason) = challenge_failure {
            return debug.finish(false, reason);
        }
        debug.finish(true, "Live")
    }
}

/// `value / target` clamped to `[0, 1]`; any positive value saturates a
/// non-positive target.
fn ratio_score(value: f64, target: f64) -> f64 {
    if target <= 0.0 {
        return if value > 0.0 { 1.0 } else { 0.0 };
    }
    (value / target).clamp(0.0, 1.0)
}
