use std::path::Path;

use ndarray::ArrayView3;

/// One captured camera frame: contiguous 8-bit pixels in row-major order.
///
/// `channels` is 3 (RGB) or 4 (RGBA); 1 is accepted for pre-converted
/// grayscale input. `index` is the frame's position within its burst and is
/// what test doubles key their canned detections on.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    /// Accepts any buffer; one whose length disagrees with the dimensions
    /// is [degenerate](Self::is_degenerate) and yields no face or score.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Wraps a decoded `image` buffer, converting to RGB8.
    pub fn from_image(image: &image::DynamicImage, index: usize) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// True when the buffer cannot hold a single pixel or its length
    /// disagrees with the declared dimensions.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0
            || self.height == 0
            || self.channels == 0
            || self.data.len()
                != (self.width as usize) * (self.height as usize) * (self.channels as usize)
    }

    /// `(height, width, channels)` view, or `None` for a degenerate buffer.
    pub fn as_ndarray(&self) -> Option<ArrayView3<'_, u8>> {
        if self.is_degenerate() {
            return None;
        }
        ArrayView3::from_shape(self.shape(), &self.data).ok()
    }

    /// Rec. 601 luma of every pixel, row-major. Empty for degenerate frames.
    pub fn luminance(&self) -> Vec<f32> {
        if self.is_degenerate() {
            return Vec::new();
        }
        let c = self.channels as usize;
        self.data
            .chunks_exact(c)
            .map(|px| {
                if c < 3 {
                    px[0] as f32
                } else {
                    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
                }
            })
            .collect()
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

/// Decodes an image file into a frame at burst position `index`.
pub fn load_frame(path: &Path, index: usize) -> Result<Frame, image::ImageError> {
    let image = image::open(path)?;
    Ok(Frame::from_image(&image, index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_accessors() {
        let frame = Frame::new(vec![7u8; 12], 2, 2, 3, 4);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 4);
        assert!(!frame.is_degenerate());
    }

    #[test]
    fn test_zero_sized_frame_is_degenerate() {
        let frame = Frame::new(Vec::new(), 0, 0, 3, 0);
        assert!(frame.is_degenerate());
        assert!(frame.luminance().is_empty());
    }

    #[rstest]
    #[case::short(vec![0u8; 10], 2, 2)]
    #[case::long(vec![0u8; 40], 2, 2)]
    fn test_mismatched_buffer_is_degenerate(#[case] data: Vec<u8>, #[case] w: u32, #[case] h: u32) {
        let frame = Frame::new(data, w, h, 3, 0);
        assert!(frame.is_degenerate());
        assert!(frame.as_ndarray().is_none());
        assert!(frame.luminance().is_empty());
    }

    #[test]
    fn test_as_ndarray_is_height_width_channels() {
        let mut data = vec![0u8; 24]; // 2 rows x 4 cols x 3
        data[(4 + 1) * 3 + 2] = 9; // row=1, col=1, B
        let frame = Frame::new(data, 4, 2, 3, 0);
        let view = frame.as_ndarray().unwrap();
        assert_eq!(view.shape(), &[2, 4, 3]);
        assert_eq!(view[[1, 1, 2]], 9);
    }

    #[test]
    fn test_luminance_of_white_and_black() {
        let frame = Frame::new(vec![255, 255, 255, 0, 0, 0], 2, 1, 3, 0);
        let luma = frame.luminance();
        assert_relative_eq!(luma[0], 255.0, epsilon = 0.01);
        assert_relative_eq!(luma[1], 0.0);
    }

    #[test]
    fn test_luminance_ignores_alpha() {
        let frame = Frame::new(vec![100, 100, 100, 0], 1, 1, 4, 0);
        assert_relative_eq!(frame.luminance()[0], 100.0, epsilon = 0.01);
    }

    #[test]
    fn test_from_image_converts_to_rgb() {
        let img = image::DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
            3,
            2,
            image::Luma([50]),
        ));
        let frame = Frame::from_image(&img, 1);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.data().len(), 3 * 2 * 3);
        assert!(frame.data().iter().all(|&v| v == 50));
    }

    #[test]
    fn test_load_frame_reads_png() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("frame.png");
        image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();
        let frame = load_frame(&path, 2).unwrap();
        assert_eq!((frame.width(), frame.height(), frame.index()), (4, 4, 2));
        assert_eq!(&frame.data()[..3], &[10, 20, 30]);
    }
}
