/// Square, pose-normalized RGB face crop ready for the embedding network.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedFace {
    data: Vec<u8>,
    size: u32,
}

impl AlignedFace {
    pub fn new(data: Vec<u8>, size: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            (size as usize) * (size as usize) * 3,
            "aligned crop must be size * size RGB"
        );
        Self { data, size }
    }

    /// Row-major RGB bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}
