use std::sync::Arc;

use serde::Serialize;

use crate::detection::domain::face_encoder::FaceEncoder;
use crate::encoding::encoding_aggregator::EncodingAggregator;
use crate::identity::domain::identity_repository::StoreError;
use crate::identity::domain::person_id::PersonId;
use crate::identity::infrastructure::shared_identity_store::SharedIdentityStore;
use crate::liveness::liveness_verdict::{Challenge, LivenessVerdict};
use crate::liveness::liveness_verifier::LivenessVerifier;
use crate::shared::config::RecognitionConfig;
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;

/// Result of one `learn` or `recognize` call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecognitionOutcome {
    /// `None` for "no result" or "no match".
    pub person_id: Option<PersonId>,
    /// Distance to the closest stored identity, when there is one.
    pub distance: Option<f64>,
    pub frames_total: usize,
    pub frames_used: usize,
    /// Present only when the liveness gate ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<LivenessVerdict>,
}

impl RecognitionOutcome {
    fn empty(frames_total: usize, liveness: Option<LivenessVerdict>) -> Self {
        Self {
            person_id: None,
            distance: None,
            frames_total,
            frames_used: 0,
            liveness,
        }
    }
}

/// Burst → embedding → identity, optionally behind a liveness gate.
///
/// A failed liveness check short-circuits: nothing is encoded or stored.
pub struct FaceRecognitionUseCase {
    aggregator: EncodingAggregator,
    store: SharedIdentityStore,
    liveness: Option<LivenessVerifier>,
}

impl FaceRecognitionUseCase {
    pub fn new(encoder: Arc<dyn FaceEncoder>, store: SharedIdentityStore, config: &RecognitionConfig) -> Self {
        Self {
            aggregator: EncodingAggregator::new(
                encoder,
                config.quality.clone(),
                config.aligner.clone(),
                config.aggregator.clone(),
            ),
            store,
            liveness: None,
        }
    }

    /// Require every burst to pass `verifier` before it is encoded.
    pub fn with_liveness(mut self, verifier: LivenessVerifier) -> Self {
        self.liveness = Some(verifier);
        self
    }

    pub fn store(&self) -> &SharedIdentityStore {
        &self.store
    }

    /// Enroll a new identity or extend the matching one.
    pub fn learn(&self, frames: &[Frame], challenge: Option<Challenge>) -> Result<RecognitionOutcome, StoreError> {
        self.run(frames, challenge, |embedding| {
            self.store.with(|store| -> Result<_, StoreError> {
                let nearest = store.nearest(&embedding).map(|c| c.distance);
                let person_id = store.enroll_or_update(embedding)?;
                Ok((Some(person_id), nearest))
            })?
        })
    }

    /// Look up the burst without touching the store.
    pub fn recognize(&self, frames: &[Frame], challenge: Option<Challenge>) -> Result<RecognitionOutcome, StoreError> {
        self.run(frames, challenge, |embedding| {
            self.store.with(|store| {
                let nearest = store.nearest(&embedding);
                (store.match_embedding(&embedding), nearest.map(|c| c.distance))
            })
        })
    }

    fn run(
        &self,
        frames: &[Frame],
        challenge: Option<Challenge>,
        resolve: impl FnOnce(Embedding) -> Result<(Option<PersonId>, Option<f64>), StoreError>,
    ) -> Result<RecognitionOutcome, StoreError> {
        let (liveness, detected) = match &self.liveness {
            Some(verifier) => {
                let (verdict, detected) = verifier.verify_and_detect(frames, challenge);
                (Some(verdict), detected)
            }
            None => (None, None),
        };
        if let Some(verdict) = &liveness {
            if !verdict.is_live {
                log::info!(
                    "Rejected burst of {} frames: {}",
                    frames.len(),
                    verdict.reason().unwrap_or("not live")
                );
                return Ok(RecognitionOutcome::empty(frames.len(), liveness));
            }
        }

        let report = match &detected {
            Some(faces) => self.aggregator.aggregate_detected(frames, faces),
            None => self.aggregator.aggregate_with_report(frames),
        };
        let frames_used = report.accepted();
        let Some(embedding) = report.embedding else {
            log::info!("No usable face in {} frames", frames.len());
            return Ok(RecognitionOutcome::empty(frames.len(), liveness));
        };

        let (person_id, distance) = resolve(embedding)?;
        Ok(RecognitionOutcome {
            person_id,
            distance,
            frames_total: frames.len(),
            frames_used,
            liveness,
        })
    }
}
