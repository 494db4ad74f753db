//! 5-point face landmarks with optional eye contours.
//!
//! The five fiducials drive alignment and motion analysis. Eye contours (six
//! points per eye, corner-to-corner clockwise as in the 68-point layout) are
//! only produced by richer landmark models and enable blink detection.

pub const LEFT_EYE: usize = 0;
pub const RIGHT_EYE: usize = 1;
pub const NOSE: usize = 2;
pub const LEFT_MOUTH: usize = 3;
pub const RIGHT_MOUTH: usize = 4;

/// Landmark weights: [left_eye, right_eye, nose, left_mouth, right_mouth].
const WEIGHTS: [f64; 5] = [2.0, 2.0, 3.0, 1.0, 1.0];

pub type Point = (f64, f64);
pub type EyeContour = [Point; 6];

#[derive(Clone, Debug, PartialEq)]
pub struct FaceLandmarks {
    /// Points with x <= 0 are treated as invisible.
    points: [Point; 5],
    eye_contours: Option<[EyeContour; 2]>,
}

impl FaceLandmarks {
    pub fn new(points: [Point; 5]) -> Self {
        Self {
            points,
            eye_contours: None,
        }
    }

    /// Attaches `[left, right]` eye contours.
    pub fn with_eye_contours(mut self, contours: [EyeContour; 2]) -> Self {
        self.eye_contours = Some(contours);
        self
    }

    pub fn points(&self) -> &[Point; 5] {
        &self.points
    }

    pub fn is_visible(&self, i: usize) -> bool {
        self.points[i].0 > 0.0
    }

    pub fn visible_count(&self) -> usize {
        (0..5).filter(|&i| self.is_visible(i)).count()
    }

    /// Weighted centroid of visible landmarks (x > 0), nose-heavy so it stays
    /// put under small head rotations.
    pub fn center(&self) -> Option<Point> {
        let mut wx_sum = 0.0;
        let mut wy_sum = 0.0;
        let mut w_sum = 0.0;

        for (i, (x, y)) in self.points.iter().enumerate() {
            if *x > 0.0 {
                let w = WEIGHTS[i];
                wx_sum += x * w;
                wy_sum += y * w;
                w_sum += w;
            }
        }

        if w_sum == 0.0 {
            return None;
        }
        Some((wx_sum / w_sum, wy_sum / w_sum))
    }

    /// Distance between the eye centres, the scale reference for motion.
    pub fn eye_distance(&self) -> Option<f64> {
        if !self.is_visible(LEFT_EYE) || !self.is_visible(RIGHT_EYE) {
            return None;
        }
        let d = distance(self.points[LEFT_EYE], self.points[RIGHT_EYE]);
        (d > 0.0).then_some(d)
    }

    /// Nose offset from the eye midpoint relative to eye span: 0.0 when
    /// frontal, negative when the nose sits left of the midpoint. Returns
    /// 0.0 when required landmarks are not visible.
    pub fn signed_profile_ratio(&self) -> f64 {
        let nose = self.points[NOSE];
        let left_eye = self.points[LEFT_EYE];
        let right_eye = self.points[RIGHT_EYE];

        if nose.0 <= 0.0 || left_eye.0 <= 0.0 || right_eye.0 <= 0.0 {
            return 0.0;
        }

        let eye_mid_x = (left_eye.0 + right_eye.0) / 2.0;
        let eye_span = (right_eye.0 - left_eye.0).abs();
        if eye_span <= 0.0 {
            return 0.0;
        }

        ((nose.0 - eye_mid_x) / eye_span).clamp(-1.0, 1.0)
    }

    /// Mean eye-aspect-ratio of both eyes, when contours are present.
    pub fn eye_aspect_ratio(&self) -> Option<f64> {
        let [left, right] = self.eye_contours.as_ref()?;
        Some((eye_aspect_ratio(left)? + eye_aspect_ratio(right)?) / 2.0)
    }
}

/// `(|p2-p6| + |p3-p5|) / (2 |p1-p4|)`; small when the eyelid is closed.
pub fn eye_aspect_ratio(eye: &EyeContour) -> Option<f64> {
    let width = distance(eye[0], eye[3]);
    if width <= 0.0 {
        return None;
    }
    Some((distance(eye[1], eye[5]) + distance(eye[2], eye[4])) / (2.0 * width))
}

pub fn distance(a: Point, b: Point) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
