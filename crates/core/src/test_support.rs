//! Deterministic encoder double and frame builders shared by unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::alignment::aligned_face::AlignedFace;
use crate::detection::domain::detected_face::DetectedFace;
use crate::detection::domain::face_encoder::{EncoderError, FaceEncoder};
use crate::detection::domain::face_landmarks::FaceLandmarks;
use crate::shared::constants::EMBEDDING_DIM;
use crate::shared::embedding::Embedding;
use crate::shared::frame::Frame;
use crate::shared::region::Region;

/// Replays canned detections by frame index.
///
/// Embeddings are a constant vector equal to the crop's mean intensity /
/// 255, so brighter crops land at a predictable distance from darker ones.
#[derive(Default)]
pub struct StubEncoder {
    faces: HashMap<usize, Vec<DetectedFace>>,
    failing: HashSet<usize>,
    detect_calls: AtomicUsize,
}

impl StubEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_faces(mut self, index: usize, faces: Vec<DetectedFace>) -> Self {
        self.faces.insert(index, faces);
        self
    }

    pub fn with_face(self, index: usize, face: DetectedFace) -> Self {
        self.with_faces(index, vec![face])
    }

    pub fn failing_on(mut self, index: usize) -> Self {
        self.failing.insert(index);
        self
    }

    /// How many times `detect_landmarks` has run.
    pub fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }
}

impl FaceEncoder for StubEncoder {
    fn detect_landmarks(&self, frame: &Frame) -> Result<Vec<DetectedFace>, EncoderError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&frame.index()) {
            return Err(EncoderError::Inference("stub failure".into()));
        }
        Ok(self.faces.get(&frame.index()).cloned().unwrap_or_default())
    }

    fn compute_embedding(&self, face: &AlignedFace) -> Result<Embedding, EncoderError> {
        let data = face.data();
        let mean = data.iter().map(|&v| v as f64).sum::<f64>() / data.len().max(1) as f64;
        Ok(Embedding::new(vec![(mean / 255.0) as f32; EMBEDDING_DIM])?)
    }
}

/// Frontal face landmarks for a face box at `(x, y)` of side `size`.
pub fn frontal_landmarks(x: f64, y: f64, size: f64) -> FaceLandmarks {
    let at = |fx: f64, fy: f64| (x + fx * size, y + fy * size);
    FaceLandmarks::new([
        at(0.34, 0.46),
        at(0.66, 0.46),
        at(0.50, 0.64),
        at(0.37, 0.82),
        at(0.63, 0.82),
    ])
}

pub fn face_at(x: f64, y: f64, size: f64, confidence: f64) -> DetectedFace {
    DetectedFace::new(
        Region::new(x, y, size, size),
        frontal_landmarks(x, y, size),
        confidence,
    )
}

/// RGB frame of a 1-pixel checkerboard around `base`, sharp and well exposed.
pub fn textured_frame(index: usize, width: u32, height: u32, base: u8) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = if (x + y) % 2 == 0 {
                base.saturating_add(40)
            } else {
                base.saturating_sub(40)
            };
            data.extend_from_slice(&[v, v, v]);
        }
    }
    Frame::new(data, width, height, 3, index)
}

pub fn flat_frame(index: usize, width: u32, height: u32, value: u8) -> Frame {
    Frame::new(
        vec![value; (width * height * 3) as usize],
        width,
        height,
        3,
        index,
    )
}
