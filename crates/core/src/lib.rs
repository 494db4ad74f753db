//! Face identity core: frame quality scoring, landmark alignment, burst
//! encoding, identity matching with persistent storage, and liveness checks.
//!
//! Every face operation depends only on the [`FaceEncoder`] capability; the
//! ONNX implementation lives in [`detection::infrastructure`].
//!
//! [`FaceEncoder`]: detection::domain::face_encoder::FaceEncoder

pub mod alignment;
pub mod detection;
pub mod encoding;
pub mod identity;
pub mod liveness;
pub mod pipeline;
pub mod quality;
pub mod shared;

#[cfg(test)]
mod test_support;
