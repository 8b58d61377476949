// ============================================================
// Layer 4: Image Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<ImageSample>
// into one image tensor.
//
// How batching works here:
//   Input:  N samples, each C*H*W pixels (already CHW)
//   Output: ImageBatch with images of shape [N, C, H, W]
//
// All samples were resized by the decoder, so the flat
// concatenation reshapes cleanly without any padding.
//
// Labels stay on the host: the metrics rank class scores on
// the CPU anyway, so there is no point uploading them.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
    tensor::TensorData,
};

use crate::domain::sample::{ImageSample, ImageShape};

/// A batch of images ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Pixel tensor: [batch_size, channels, height, width]
    pub images: Tensor<B, 4>,

    /// Ground-truth class per row of `images`
    pub labels: Vec<usize>,
}

impl<B: Backend> ImageBatch<B> {
    pub fn len(&self) -> usize {
        self.labels.len()
    }
}

/// Holds the target device so tensors land on the right GPU/CPU.
#[derive(Clone, Debug)]
pub struct ImageBatcher<B: Backend> {
    pub device: B::Device,
    pub shape:  ImageShape,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(device: B::Device, shape: ImageShape) -> Self {
        Self { device, shape }
    }
}

impl<B: Backend> Batcher<ImageSample, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageSample>) -> ImageBatch<B> {
        let ImageShape { channels, height, width } = self.shape;
        let batch_size = items.len();

        let labels: Vec<usize> = items.iter().map(|s| s.label).collect();
        let pixels: Vec<f32> = items
            .into_iter()
            .flat_map(|s| s.pixels)
            .collect();
        debug_assert_eq!(pixels.len(), batch_size * self.shape.len());

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, channels, height, width]),
            &self.device,
        );

        ImageBatch { images, labels }
    }
}
