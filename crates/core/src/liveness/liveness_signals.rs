//! Temporal signals over the primary face of consecutive frames.
//!
//! Each function returns `None` when the input carries too little
//! information to say anything (too few frames, landmarks or contours).

use crate::alignment::similarity_transform::SimilarityTransform;
use crate::detection::domain::face_landmarks::{distance, FaceLandmarks, Point};
use crate::shared::frame::Frame;
use crate::shared::image_ops::{laplacian_variance, Window};
use crate::shared::region::Region;

/// Non-rigid landmark motion between consecutive frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotionSignal {
    /// Mean residual after removing the best in-plane similarity between
    /// each pair, in inter-ocular distances. A photo moved or rotated in
    /// front of the camera stays near 0.
    pub deformation: f64,
    /// Mean shift of the landmark centroid, in inter-ocular distances.
    pub centroid_shift: f64,
    pub pairs: usize,
}

pub fn landmark_motion(sequence: &[&FaceLandmarks]) -> Option<MotionSignal> {
    let mut deformation = 0.0;
    let mut centroid_shift = 0.0;
    let mut pairs = 0usize;

    for pair in sequence.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);
        let Some(scale) = curr.eye_distance().or_else(|| prev.eye_distance()) else {
            continue;
        };
        let (src, dst): (Vec<Point>, Vec<Point>) = (0..5)
            .filter(|&i| prev.is_visible(i) && curr.is_visible(i))
            .map(|i| (prev.points()[i], curr.points()[i]))
            .unzip();
        // two points always fit a similarity exactly
        if src.len() < 3 {
            continue;
        }
        let Some(fit) = SimilarityTransform::estimate(&src, &dst) else {
            continue;
        };
        let residual = src
            .iter()
            .zip(&dst)
            .map(|(s, d)| distance(fit.apply(*s), *d))
            .sum::<f64>()
            / src.len() as f64;
        deformation += residual / scale;

        if let (Some(a), Some(b)) = (prev.center(), curr.center()) {
            centroid_shift += distance(a, b) / scale;
        }
        pairs += 1;
    }

    (pairs > 0).then(|| MotionSignal {
        deformation: deformation / pairs as f64,
        centroid_shift: centroid_shift / pairs as f64,
        pairs,
    })
}

/// Frame-to-frame variability of fine texture inside the face box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextureSignal {
    pub mean_sharpness: f64,
    /// Standard deviation over mean of the per-frame Laplacian variance.
    pub variation: f64,
}

pub fn texture_variation(faces: &[(&Frame, Region)]) -> Option<TextureSignal> {
    let values: Vec<f64> = faces
        .iter()
        .filter_map(|(frame, region)| {
            let (x, y, w, h) = region.clamped_window(frame.width(), frame.height())?;
            let luma = frame.luminance();
            Some(laplacian_variance(&luma, frame.width() as usize, Window { x, y, w, h }))
        })
        .collect();
    if values.len() < 2 {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let variation = if mean > 0.0 { var.sqrt() / mean } else { 0.0 };
    Some(TextureSignal {
        mean_sharpness: mean,
        variation,
    })
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlinkSignal {
    pub ear_min: f64,
    pub ear_max: f64,
    /// An open-eye frame precedes a closed-eye frame.
    pub detected: bool,
}

pub fn blink(sequence: &[&FaceLandmarks], ear_closed: f64, ear_open: f64) -> Option<BlinkSignal> {
    let ears: Vec<f64> = sequence.iter().filter_map(|l| l.eye_aspect_ratio()).collect();
    if ears.len() < 2 {
        return None;
    }
    let ear_min = ears.iter().copied().fold(f64::INFINITY, f64::min);
    let ear_max = ears.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut seen_open = false;
    let mut detected = false;
    for ear in &ears {
        if *ear > ear_open {
            seen_open = true;
        } else if *ear < ear_closed && seen_open {
            detected = true;
            break;
        }
    }

    Some(BlinkSignal {
        ear_min,
        ear_max,
        detected,
    })
}

/// Range covered by the signed profile ratio (nose offset from the eye
/// midpoint). Frames lacking the eyes or nose are ignored.
pub fn turn_span(sequence: &[&FaceLandmarks]) -> Option<f64> {
    let ratios: Vec<f64> = sequence
        .iter()
        .filter(|l| l.eye_distance().is_some() && l.is_visible(2))
        .map(|l| l.signed_profile_ratio())
        .collect();
    if ratios.len() < 2 {
        return None;
    }
    let lo = ratios.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = ratios.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(hi - lo)
}
