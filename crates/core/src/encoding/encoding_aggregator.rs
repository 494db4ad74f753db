use std::sync::Arc;

use crate::alignment::face_aligner::FaceAligner;
use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::face_encoder::FaceEncoder;
use crate::quality::frame_quality_scorer::FrameQualityScorer;
use crate::shared::config::{AggregatorConfig, AlignerConfig, QualityConfig};
use crate::shared::constants::EMBEDDING_DIM;
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;

/// Why a frame contributed nothing to the aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameRejection {
    LowQuality,
    NoFace,
    EncoderFailure,
}

/// Per-frame trace of one aggregation run.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameOutcome {
    pub index: usize,
    pub quality: f64,
    pub rejection: Option<FrameRejection>,
}

/// Result of [`EncodingAggregator::aggregate_with_report`].
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationReport {
    /// `None` when no frame survived filtering.
    pub embedding: Option<Embedding>,
    pub frames: Vec<FrameOutcome>,
}

impl AggregationReport {
    pub fn accepted(&self) -> usize {
        self.frames.iter().filter(|f| f.rejection.is_none()).count()
    }
}

/// Collapses a burst of frames into one representative embedding.
///
/// Each frame is quality-scored, aligned and encoded; frames below the
/// quality floor, without a usable face, or failing to encode are skipped.
/// Survivors are averaged with their quality scores as weights.
pub struct EncodingAggregator {
    scorer: FrameQualityScorer,
    aligner: FaceAligner,
    encoder: Arc<dyn FaceEncoder>,
    config: AggregatorConfig,
}

impl EncodingAggregator {
    pub fn new(
        encoder: Arc<dyn FaceEncoder>,
        quality: QualityConfig,
        aligner: AlignerConfig,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            scorer: FrameQualityScorer::new(quality),
            aligner: FaceAligner::new(Arc::clone(&encoder), aligner),
            encoder,
            config,
        }
    }

    /// One embedding for the burst, or `None` when nothing usable survived
    /// (including an empty burst).
    pub fn aggregate(&self, frames: &[Frame]) -> Option<Embedding> {
        self.aggregate_with_report(frames).embedding
    }

    pub fn aggregate_with_report(&self, frames: &[Frame]) -> AggregationReport {
        self.run(frames, None)
    }

    /// Same as [`aggregate_with_report`](Self::aggregate_with_report) but
    /// reuses faces already detected per frame instead of running the
    /// detector again. `detected[i]` belongs to `frames[i]`; a missing
    /// entry counts as no face.
    pub fn aggregate_detected(
        &self,
        frames: &[Frame],
        detected: &[Option<DetectedFace>],
    ) -> AggregationReport {
        self.run(frames, Some(detected))
    }

    fn run(&self, frames: &[Frame], detected: Option<&[Option<DetectedFace>]>) -> AggregationReport {
        let mut outcomes = Vec::with_capacity(frames.len());
        let mut weighted: Vec<(f64, Embedding)> = Vec::new();

        for (i, frame) in frames.iter().enumerate() {
            let quality = self.scorer.score(frame);
            let face = detected.map(|d| d.get(i).and_then(Option::as_ref));
            let rejection = self.process(frame, face, quality, &mut weighted);
            if let Some(reason) = rejection {
                log::debug!(
                    "Frame {} skipped ({reason:?}, quality {quality:.3})",
                    frame.index()
                );
            }
            outcomes.push(FrameOutcome {
                index: frame.index(),
                quality,
                rejection,
            });
        }

        let embedding = weighted_mean(&weighted).map(|e| {
            if self.config.renormalize {
                e.normalized()
            } else {
                e
            }
        });
        log::debug!(
            "Aggregated {}/{} frames into {}",
            weighted.len(),
            frames.len(),
            if embedding.is_some() { "an embedding" } else { "no result" }
        );

        AggregationReport {
            embedding,
            frames: outcomes,
        }
    }

    fn process(
        &self,
        frame: &Frame,
        face: Option<Option<&DetectedFace>>,
        quality: f64,
        weighted: &mut Vec<(f64, Embedding)>,
    ) -> Option<FrameRejection> {
        if !self.scorer.passes(quality) {
            return Some(FrameRejection::LowQuality);
        }
        let aligned = match face {
            Some(known) => known.and_then(|f| self.aligner.align_detected(frame, f)),
            None => self.aligner.align(frame),
        };
        let Some(aligned) = aligned else {
            return Some(FrameRejection::NoFace);
        };
        match self.encoder.compute_embedding(&aligned) {
            Ok(embedding) => {
                weighted.push((quality, embedding));
                None
            }
            Err(e) => {
                log::warn!("Embedding failed on frame {}: {e}", frame.index());
                Some(FrameRejection::EncoderFailure)
            }
        }
    }
}

/// Quality-weighted mean. Falls back to a plain mean if every weight is zero.
fn weighted_mean(samples: &[(f64, Embedding)]) -> Option<Embedding> {
    if samples.is_empty() {
        return None;
    }
    let total: f64 = samples.iter().map(|(w, _)| w.max(0.0)).sum();
    let uniform = total <= 0.0;

    let mut acc = vec![0.0f64; EMBEDDING_DIM];
    for (w, e) in samples {
        let weight = if uniform {
            1.0 / samples.len() as f64
        } else {
            w.max(0.0) / total
        };
        for (a, v) in acc.iter_mut().zip(e.as_slice()) {
            *a += weight * *v as f64;
        }
    }

    Embedding::new(acc.into_iter().map(|v| v as f32).collect()).ok()
}
