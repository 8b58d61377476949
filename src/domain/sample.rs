// ============================================================
// Layer 3: Image Sample
// ============================================================
// A single decoded example, already resized and normalised.
// Pixels are stored channel-first (CHW) because that is the
// layout the convolution layers expect.

use serde::{Deserialize, Serialize};

/// Spatial layout every sample is resized to before batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
}

impl ImageShape {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self { channels, height, width }
    }

    /// Number of f32 values in one sample.
    pub fn len(&self) -> usize {
        self.channels * self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One preprocessed example ready for the batcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageSample {
    /// Normalised pixel values in CHW order
    pub pixels: Vec<f32>,

    /// Ground-truth class index in `0..num_classes`
    pub label: usize,
}

impl ImageSample {
    pub fn new(pixels: Vec<f32>, label: usize) -> Self {
        Self { pixels, label }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_len() {
        assert_eq!(ImageShape::new(3, 32, 32).len(), 3072);
        assert!(ImageShape::new(1, 0, 28).is_empty());
    }
}
