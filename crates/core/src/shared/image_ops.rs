//! Plain-buffer image statistics shared by quality scoring and liveness.
//!
//! All functions take a row-major luminance plane (`width × height` floats)
//! as produced by [`Frame::luminance`](crate::shared::frame::Frame::luminance).

/// Pixel window inside a luminance plane, used to pass coordinates without many arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub x: usize,
    pub y: usize,
    pub w: usize,
    pub h: usize,
}

impl Window {
    pub fn full(width: usize, height: usize) -> Self {
        Self {
            x: 0,
            y: 0,
            w: width,
            h: height,
        }
    }
}

/// Variance of the 4-neighbour Laplacian response inside `window`.
///
/// Border pixels of the window are skipped so the kernel never reads
/// outside it. Windows smaller than 3×3 have no interior and yield 0.
pub fn laplacian_variance(luma: &[f32], width: usize, window: Window) -> f64 {
    if window.w < 3 || window.h < 3 {
        return 0.0;
    }
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut n = 0usize;

    for y in (window.y + 1)..(window.y + window.h - 1) {
        for x in (window.x + 1)..(window.x + window.w - 1) {
            let at = |xx: usize, yy: usize| luma[yy * width + xx] as f64;
            let response =
                at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
            n += 1;
        }
    }

    let mean = sum / n as f64;
    (sum_sq / n as f64 - mean * mean).max(0.0)
}

/// Mean luminance over the whole plane, 0 for an empty plane.
pub fn mean_brightness(luma: &[f32]) -> f64 {
    if luma.is_empty() {
        return 0.0;
    }
    luma.iter().map(|&v| v as f64).sum::<f64>() / luma.len() as f64
}

/// Fraction of pixels at or beyond the under/over-exposure limits.
pub fn clipped_fraction(luma: &[f32], low: f32, high: f32) -> f64 {
    if luma.is_empty() {
        return 0.0;
    }
    let clipped = luma.iter().filter(|&&v| v <= low || v >= high).count();
    clipped as f64 / luma.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn checkerboard(size: usize) -> Vec<f32> {
        (0..size * size)
            .map(|i| if (i / size + i % size) % 2 == 0 { 0.0 } else { 255.0 })
            .collect()
    }

    #[test]
    fn test_flat_plane_has_zero_laplacian_variance() {
        let luma = vec![128.0; 16 * 16];
        assert_relative_eq!(laplacian_variance(&luma, 16, Window::full(16, 16)), 0.0);
    }

    #[test]
    fn test_checkerboard_is_sharper_than_gradient() {
        let size = 16;
        let gradient: Vec<f32> = (0..size * size).map(|i| (i % size) as f32 * 10.0).collect();
        let sharp = laplacian_variance(&checkerboard(size), size, Window::full(size, size));
        let smooth = laplacian_variance(&gradient, size, Window::full(size, size));
        assert!(sharp > smooth);
        // a linear ramp has zero second derivative
        assert_relative_eq!(smooth, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_tiny_window_yields_zero() {
        let luma = checkerboard(8);
        let w = Window { x: 0, y: 0, w: 2, h: 8 };
        assert_relative_eq!(laplacian_variance(&luma, 8, w), 0.0);
    }

    #[test]
    fn test_sub_window_only_reads_inside() {
        // Left half flat, right half checkerboard.
        let size = 8;
        let mut luma = checkerboard(size);
        for y in 0..size {
            for x in 0..size / 2 {
                luma[y * size + x] = 50.0;
            }
        }
        let left = Window { x: 0, y: 0, w: 4, h: 8 };
        assert_relative_eq!(laplacian_variance(&luma, size, left), 0.0);
    }

    #[test]
    fn test_mean_brightness() {
        assert_relative_eq!(mean_brightness(&[0.0, 100.0, 200.0]), 100.0);
        assert_relative_eq!(mean_brightness(&[]), 0.0);
    }

    #[test]
    fn test_clipped_fraction() {
        let luma = [0.0, 3.0, 128.0, 254.0];
        assert_relative_eq!(clipped_fraction(&luma, 5.0, 250.0), 0.75);
    }
}
