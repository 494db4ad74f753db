use crate::shared::region::Region;

use super::face_landmarks::FaceLandmarks;

/// One face found by the landmark detector.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedFace {
    pub region: Region,
    pub landmarks: FaceLandmarks,
    pub confidence: f64,
}

impl DetectedFace {
    pub fn new(region: Region, landmarks: FaceLandmarks, confidence: f64) -> Self {
        Self {
            region,
            landmarks,
            confidence,
        }
    }
}

/// Picks the most prominent face: largest bounding-box area, ties going to
/// the earliest entry in detector scan order.
pub fn most_prominent(faces: &[DetectedFace]) -> Option<&DetectedFace> {
    let mut best: Option<&DetectedFace> = None;
    for face in faces {
        match best {
            Some(b) if face.region.area() <= b.region.area() => {}
            _ => best = Some(face),
        }
    }
    best
}
