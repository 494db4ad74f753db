use thiserror::Error;

use crate::alignment::aligned_face::AlignedFace;
use crate::shared::embedding::{Embedding, EmbeddingError};
use crate::shared::frame::Frame;

use super::detected_face::DetectedFace;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model unavailable: {0}")]
    Model(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("encoder produced an invalid embedding: {0}")]
    Embedding(#[from] EmbeddingError),
}

/// Face landmark detection and embedding, supplied by whichever
/// recognition model is deployed.
///
/// Takes `&self` and must be `Sync`: one encoder is shared by every
/// request thread. Implementations serialize access to non-reentrant
/// sessions internally.
pub trait FaceEncoder: Send + Sync {
    /// All faces found in `frame`, in detector scan order.
    fn detect_landmarks(&self, frame: &Frame) -> Result<Vec<DetectedFace>, EncoderError>;

    /// Embedding of an aligned face crop.
    fn compute_embedding(&self, face: &AlignedFace) -> Result<Embedding, EncoderError>;
}
