//! Least-squares 2D similarity transform (rotation, uniform scale,
//! translation) between two point sets.

use crate::detection::domain::face_landmarks::Point;

/// Canonical 5-point layout for a 112×112 crop: eyes, nose tip, mouth corners.
pub const REFERENCE_112: [Point; 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

/// Reference layout scaled to a `crop_size × crop_size` crop.
pub fn reference_points(crop_size: u32) -> [Point; 5] {
    let s = crop_size as f64 / 112.0;
    REFERENCE_112.map(|(x, y)| (x * s, y * s))
}

/// `dst = [[a, -b], [b, a]] · src + (tx, ty)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimilarityTransform {
    pub a: f64,
    pub b: f64,
    pub tx: f64,
    pub ty: f64,
}

impl SimilarityTransform {
    /// Closed-form (Umeyama) fit mapping `src[i]` onto `dst[i]`.
    ///
    /// Returns `None` for fewer than two pairs, mismatched lengths, or
    /// coincident source points.
    pub fn estimate(src: &[Point], dst: &[Point]) -> Option<Self> {
        if src.len() < 2 || src.len() != dst.len() {
            return None;
        }
        let n = src.len() as f64;
        let mean = |pts: &[Point]| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
            (sx / n, sy / n)
        };
        let (msx, msy) = mean(src);
        let (mdx, mdy) = mean(dst);

        let mut dot = 0.0;
        let mut cross = 0.0;
        let mut var = 0.0;
        for (s, d) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (s.0 - msx, s.1 - msy);
            let (dx, dy) = (d.0 - mdx, d.1 - mdy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            var += sx * sx + sy * sy;
        }
        if var <= f64::EPSILON {
            return None;
        }

        let a = dot / var;
        let b = cross / var;
        Some(Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        })
    }

    pub fn apply(&self, p: Point) -> Point {
        (
            self.a * p.0 - self.b * p.1 + self.tx,
            self.b * p.0 + self.a * p.1 + self.ty,
        )
    }

    /// Inverse mapping, `None` when the transform collapses to a point.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det <= f64::EPSILON {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}
